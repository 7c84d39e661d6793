//! Query state machine
//!
//! A [`Query`] owns a select clause, a WHERE predicate and an optional list
//! of row identifiers over one [`Dataset`]. It moves through the
//! [`QueryState`] lifecycle:
//!
//! ```text
//! UNINITIALIZED -> SET_COMPONENTS | SET_RIDS | SET_PREDICATE
//!               -> SPECIFIED            (select and predicate or RIDs present)
//!               -> QUICK_ESTIMATE       (estimate)
//!               -> FULL_EVALUATE        (evaluate)
//!               -> HITS_TRUNCATED | BUNDLES_TRUNCATED
//! ```
//!
//! Changing any component drops cached bounds and returns to the matching
//! set-state. Each query takes its own reader/writer lock; operations that
//! read column data additionally hold the dataset's read lock for their
//! duration. A change of the dataset timestamp invalidates cached results.

mod bundle;
mod estimate;
mod evaluate;
mod observer;
mod persist;
mod scan;
mod state;

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::bitvector::{Bitvector, Bitvector64};
use crate::dataset::{Catalog, Dataset, DatasetData, Value};
use crate::expr::{parse_select, parse_where, JoinTerm, QExpr, SelectClause};
use crate::join::{JoinAlgorithm, JoinEvaluator};
use crate::{QueryConfig, QueryError, Result};

pub use bundle::Bundle;
pub use observer::{NoopObserver, QueryObserver};
pub use state::{Bounds, QueryState};

use bundle::{build_bundles, bundle_rows};
use estimate::BoundEstimator;
use evaluate::Evaluator;
use persist::QueryRecord;
use scan::Scanner;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Unique query token: creation time plus a process-wide sequence number
fn new_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    format!("{:012x}{:04x}", nanos & 0xffff_ffff_ffff, seq & 0xffff)
}

/// Mutable part of a query, guarded by the query lock
#[derive(Default)]
struct QueryInner {
    dataset: Option<Arc<Dataset>>,
    select: Option<SelectClause>,
    select_text: Option<String>,
    where_text: Option<String>,
    predicate: Option<QExpr>,
    rids: Option<Vec<u64>>,
    state: QueryState,
    bounds: Bounds,
    /// Dataset timestamp the bounds were computed at (0 = none)
    timestamp: u64,
    last_error: Option<String>,
    hit_rids: Option<Vec<u64>>,
    bundles: Option<Vec<Bundle>>,
}

impl QueryInner {
    /// State implied by the components present, `last` naming the most
    /// recently set one
    fn settled_state(&self, last: Option<QueryState>) -> QueryState {
        let has_condition = self.predicate.is_some() || self.rids.is_some();
        if self.select.is_some() && has_condition {
            return QueryState::Specified;
        }
        if let Some(last) = last {
            return last;
        }
        match (self.select.is_some(), self.predicate.is_some(), self.rids.is_some()) {
            (_, true, _) => QueryState::SetPredicate,
            (_, false, true) => QueryState::SetRids,
            (true, false, false) => QueryState::SetComponents,
            (false, false, false) => QueryState::Uninitialized,
        }
    }

    fn is_stale(&self, data: &DatasetData) -> bool {
        self.timestamp != 0 && self.timestamp != data.timestamp()
    }

    /// Rows eligible for hits: the RID list (if any) and non-null selected
    /// values
    fn row_mask(&self, data: &DatasetData) -> Result<Bitvector> {
        let mut mask = match &self.rids {
            Some(rids) => data.resolve_rids(rids),
            None => Bitvector::ones(data.nrows()),
        };
        if let Some(select) = &self.select {
            mask = mask.and(&select.validity_mask(data)?);
        }
        Ok(mask)
    }
}

// ============================================================================
// Query
// ============================================================================

/// A bitmap-indexed query over one dataset
pub struct Query {
    token: String,
    user: String,
    config: QueryConfig,
    observer: Arc<dyn QueryObserver>,
    inner: RwLock<QueryInner>,
}

impl Query {
    pub fn new(user: &str, config: QueryConfig) -> Self {
        Self {
            token: new_token(),
            user: user.to_string(),
            config,
            observer: Arc::new(NoopObserver),
            inner: RwLock::new(QueryInner::default()),
        }
    }

    /// Report lifecycle events to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn QueryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    // ========================================================================
    // Read accessors
    // ========================================================================

    pub fn state(&self) -> QueryState {
        self.inner.read().state
    }

    pub fn dataset_name(&self) -> Option<String> {
        self.inner.read().dataset.as_ref().map(|d| d.name().to_string())
    }

    pub fn select_clause(&self) -> Option<String> {
        self.inner.read().select_text.clone()
    }

    pub fn where_clause(&self) -> Option<String> {
        self.inner.read().where_text.clone()
    }

    pub fn predicate(&self) -> Option<QExpr> {
        self.inner.read().predicate.clone()
    }

    pub fn rids(&self) -> Option<Vec<u64>> {
        self.inner.read().rids.clone()
    }

    /// Cached bounds, `Unknown` before the first estimate
    pub fn bounds(&self) -> Bounds {
        self.inner.read().bounds.clone()
    }

    /// `(min, max)` number of hits after an estimate or evaluate
    pub fn hit_count_bounds(&self) -> Option<(u64, u64)> {
        self.inner.read().bounds.counts()
    }

    /// Exact hits, once known
    pub fn hits(&self) -> Option<Bitvector> {
        self.inner.read().bounds.exact().cloned()
    }

    /// Message of the most recent estimate/evaluate failure
    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    // ========================================================================
    // Components
    // ========================================================================

    /// Attach the dataset; drops every component set for a previous one
    pub fn set_dataset(&self, dataset: Arc<Dataset>) {
        let mut inner = self.inner.write();
        if inner.dataset.as_ref().map_or(false, |d| Arc::ptr_eq(d, &dataset)) {
            return;
        }
        self.invalidate(&mut inner);
        inner.select = None;
        inner.select_text = None;
        inner.where_text = None;
        inner.predicate = None;
        inner.rids = None;
        inner.dataset = Some(dataset);
        self.transition(&mut inner, QueryState::Uninitialized);
    }

    pub fn set_select_clause(&self, text: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let dataset = inner.dataset.clone().ok_or(QueryError::NoDataset)?;
        let select = parse_select(text)?;
        select.validate(&dataset.read())?;
        if inner.select.as_ref() == Some(&select) {
            return Ok(());
        }
        inner.select_text = Some(select.to_string());
        inner.select = Some(select);
        self.changed(&mut inner, QueryState::SetComponents);
        Ok(())
    }

    pub fn set_where_clause(&self, text: &str) -> Result<()> {
        let expr = parse_where(text)?;
        self.set_predicate(expr)
    }

    /// Set an already built predicate
    pub fn set_predicate(&self, expr: QExpr) -> Result<()> {
        let mut inner = self.inner.write();
        let dataset = inner.dataset.clone().ok_or(QueryError::NoDataset)?;
        let expr = expr.simplify();
        expr.validate(&dataset.read())?;
        if inner.predicate.as_ref() == Some(&expr) {
            return Ok(());
        }
        inner.where_text = Some(expr.to_string());
        inner.predicate = Some(expr);
        self.changed(&mut inner, QueryState::SetPredicate);
        Ok(())
    }

    /// Restrict the query to rows with these identifiers
    pub fn set_rids(&self, rids: Vec<u64>) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.dataset.is_none() {
            return Err(QueryError::NoDataset);
        }
        if inner.rids.as_ref() == Some(&rids) {
            return Ok(());
        }
        inner.rids = Some(rids);
        self.changed(&mut inner, QueryState::SetRids);
        Ok(())
    }

    /// Drop cached results and persisted files, keeping the components
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        self.invalidate(&mut inner);
        let next = inner.settled_state(None);
        self.transition(&mut inner, next);
        self.persist(&inner);
    }

    fn changed(&self, inner: &mut QueryInner, last: QueryState) {
        self.invalidate(inner);
        let next = inner.settled_state(Some(last));
        self.transition(inner, next);
        self.persist(inner);
    }

    /// Drop bounds, hit identifiers and bundles with their files
    fn invalidate(&self, inner: &mut QueryInner) {
        inner.bounds = Bounds::Unknown;
        inner.hit_rids = None;
        inner.bundles = None;
        inner.timestamp = 0;
        if let Some(dir) = self.dir() {
            if let Err(e) = persist::remove_results(&dir) {
                log::warn!("Query {}: cannot remove result files in {:?}: {}", self.token, dir, e);
            }
        }
    }

    fn transition(&self, inner: &mut QueryInner, to: QueryState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        log::debug!("Query {}: {} -> {}", self.token, from, to);
        self.observer.state_changed(&self.token, from, to);
    }

    // ========================================================================
    // Estimate and evaluate
    // ========================================================================

    /// Bracket the hits between sure and possible rows using indexes only
    pub fn estimate(&self) -> Result<()> {
        let mut inner = self.inner.write();
        let dataset = match inner.dataset.clone() {
            Some(d) => d,
            None => return Err(self.fail(&mut inner, "estimate", QueryError::NoDataset)),
        };
        let result = self.retry_once(&dataset, || self.estimate_locked(&mut inner, &dataset));
        result.map_err(|e| self.fail(&mut inner, "estimate", e))
    }

    /// Compute the exact hits; `materialize` also builds the bundles.
    /// Returns the number of hits.
    pub fn evaluate(&self, materialize: bool) -> Result<u64> {
        let mut inner = self.inner.write();
        self.ensure_evaluated(&mut inner, materialize)?;
        Ok(inner.bounds.exact().map_or(0, Bitvector::cnt))
    }

    /// Exact number of hits, evaluating first when needed
    pub fn num_hits(&self) -> Result<u64> {
        {
            let inner = self.inner.read();
            if let (true, Some(hits), Some(dataset)) = (inner.state.is_evaluated(), inner.bounds.exact(), &inner.dataset) {
                if inner.timestamp == dataset.timestamp() {
                    return Ok(hits.cnt());
                }
            }
        }
        self.evaluate(false)
    }

    fn ensure_evaluated(&self, inner: &mut QueryInner, materialize: bool) -> Result<()> {
        let dataset = match inner.dataset.clone() {
            Some(d) => d,
            None => return Err(self.fail(inner, "evaluate", QueryError::NoDataset)),
        };
        let result = self.retry_once(&dataset, || self.evaluate_locked(inner, &dataset, materialize));
        result.map_err(|e| self.fail(inner, "evaluate", e))
    }

    /// Run `op`, and once more after releasing dataset caches if it ran out
    /// of memory
    fn retry_once<T>(&self, dataset: &Dataset, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        match op() {
            Err(QueryError::OutOfMemory { requested, budget }) => {
                log::warn!(
                    "Query {}: out of memory ({} > {} bytes), releasing caches and retrying",
                    self.token,
                    requested,
                    budget
                );
                dataset.release_caches();
                op()
            }
            other => other,
        }
    }

    fn fail(&self, inner: &mut QueryInner, op: &str, err: QueryError) -> QueryError {
        if err.is_configuration() {
            log::warn!("Query {}: {} failed: {}", self.token, op, err);
        } else {
            log::error!("Query {}: {} failed: {}", self.token, op, err);
        }
        inner.last_error = Some(err.to_string());
        self.observer.failed(&self.token, &err);
        err
    }

    /// Invalidate results computed against an older dataset version
    fn refresh(&self, inner: &mut QueryInner, data: &DatasetData) {
        if inner.is_stale(data) {
            log::info!(
                "Query {}: dataset changed (timestamp {} -> {}), dropping cached results",
                self.token,
                inner.timestamp,
                data.timestamp()
            );
            self.invalidate(inner);
            let next = inner.settled_state(None);
            self.transition(inner, next);
        }
    }

    fn estimate_locked(&self, inner: &mut QueryInner, dataset: &Dataset) -> Result<()> {
        if inner.predicate.is_none() && inner.rids.is_none() {
            return Err(QueryError::NoPredicate);
        }
        let data = dataset.read();
        self.refresh(inner, &data);
        if inner.state >= QueryState::QuickEstimate && inner.bounds.is_known() {
            return Ok(());
        }

        let mask = inner.row_mask(&data)?;
        let (low, high) = BoundEstimator::new(&data).estimate(inner.predicate.as_ref()).into_pair();
        let bounds = Bounds::from_pair(low.and(&mask), high.and(&mask));
        let (low_cnt, high_cnt) = bounds.counts().unwrap_or_default();
        inner.bounds = bounds;
        inner.timestamp = data.timestamp();
        drop(data);

        log::debug!("Query {}: estimate {}..{} hits", self.token, low_cnt, high_cnt);
        self.transition(inner, QueryState::QuickEstimate);
        self.observer.estimated(&self.token, low_cnt, high_cnt);
        self.persist(inner);
        Ok(())
    }

    fn evaluate_locked(&self, inner: &mut QueryInner, dataset: &Dataset, materialize: bool) -> Result<()> {
        if inner.predicate.is_none() && inner.rids.is_none() {
            return Err(QueryError::NoPredicate);
        }
        let data = dataset.read();
        self.refresh(inner, &data);

        if inner.state.is_evaluated() {
            if let Some(hits) = inner.bounds.exact() {
                if materialize && inner.bundles.is_none() {
                    let bundles = self.make_bundles(inner, &data, hits)?;
                    inner.bundles = Some(bundles);
                    self.persist(inner);
                }
                return Ok(());
            }
        }

        let start = Instant::now();
        let mask = inner.row_mask(&data)?;
        let hits = match (&inner.bounds, &inner.predicate) {
            (Bounds::Exact(bits), _) => bits.clone(),
            (_, None) => mask,
            (bounds, Some(predicate)) => {
                let mut expr = predicate.clone();
                if self.config.reorder_predicates && !expr.is_directly_evaluable() {
                    expr.reorder(data.nrows() as f64, &mut |leaf: &QExpr| data.estimate_cost(leaf));
                    log::trace!("Query {}: reordered predicate to {}", self.token, expr);
                }
                let result = Evaluator::new(&data, self.config.or_mask_factor).evaluate(&expr, &mask)?;
                if !result.authoritative {
                    log::debug!("Query {}: join terms counted as matching every row", self.token);
                }
                let mut hits = result.hits;
                // rows the estimate allowed but the evaluation did not return
                if let Bounds::Approximate { high, .. } = bounds {
                    let missed = &high.and(&mask) - &hits;
                    if missed.cnt() > 0 {
                        let extra = Scanner::new(&data, self.config.or_mask_factor).scan(&expr, &missed)?;
                        if extra.count() > 0 {
                            log::warn!("Query {}: recovered {} hits from the undecided rows", self.token, extra.count());
                            hits = &hits | &extra.hits;
                        }
                    }
                }
                hits
            }
        };
        let bundles = if materialize { Some(self.make_bundles(inner, &data, &hits)?) } else { None };

        let count = hits.cnt();
        inner.bounds = Bounds::Exact(hits);
        inner.timestamp = data.timestamp();
        inner.hit_rids = None;
        inner.bundles = bundles;
        drop(data);

        let elapsed = start.elapsed();
        log::debug!("Query {}: {} hits in {:?}", self.token, count, elapsed);
        self.transition(inner, QueryState::FullEvaluate);
        self.observer.evaluated(&self.token, count, elapsed);
        self.persist(inner);
        Ok(())
    }

    fn make_bundles(&self, inner: &QueryInner, data: &DatasetData, hits: &Bitvector) -> Result<Vec<Bundle>> {
        let select = inner
            .select
            .as_ref()
            .ok_or_else(|| QueryError::InvalidSelect("no select clause to materialize".to_string()))?;
        build_bundles(select, data, hits, &self.config)
    }

    // ========================================================================
    // Results
    // ========================================================================

    /// External identifiers of the hit rows
    pub fn hit_rids(&self) -> Result<Vec<u64>> {
        let mut inner = self.inner.write();
        self.ensure_evaluated(&mut inner, false)?;
        if let Some(rids) = &inner.hit_rids {
            return Ok(rids.clone());
        }
        let dataset = inner.dataset.clone().ok_or(QueryError::NoDataset)?;
        let rids = match inner.bounds.exact() {
            Some(hits) => dataset.read().rids_of(hits),
            None => return Err(QueryError::InvalidState("no exact hits".to_string())),
        };
        if let Some(dir) = self.dir() {
            if let Err(e) = persist::write_rids(&dir, &rids) {
                log::warn!("Query {}: cannot persist hit identifiers: {}", self.token, e);
            }
        }
        inner.hit_rids = Some(rids.clone());
        Ok(rids)
    }

    /// Values of the select term named `term` over the hit rows
    pub fn selected_values(&self, term: &str) -> Result<Vec<Value>> {
        let mut inner = self.inner.write();
        self.ensure_evaluated(&mut inner, false)?;
        let select = inner
            .select
            .as_ref()
            .ok_or_else(|| QueryError::InvalidSelect("no select clause".to_string()))?;
        let idx = select
            .find(term)
            .ok_or_else(|| QueryError::InvalidSelect(format!("{} is not selected", term)))?;
        let single = SelectClause::new(vec![select.terms[idx].clone()]);
        let dataset = inner.dataset.clone().ok_or(QueryError::NoDataset)?;
        let hits = inner
            .bounds
            .exact()
            .ok_or_else(|| QueryError::InvalidState("no exact hits".to_string()))?;
        let rows = single.values(&dataset.read(), hits)?;
        Ok(rows.into_iter().filter_map(|mut r| r.pop()).collect())
    }

    /// Hit rows grouped by selected values, building them when needed
    pub fn bundles(&self) -> Result<Vec<Bundle>> {
        let mut inner = self.inner.write();
        self.ensure_evaluated(&mut inner, true)?;
        Ok(inner.bundles.clone().unwrap_or_default())
    }

    /// Keep the first `k` hits; returns the new hit count
    pub fn limit_hits(&self, k: u64) -> Result<u64> {
        let mut inner = self.inner.write();
        self.ensure_evaluated(&mut inner, false)?;
        let count = match &mut inner.bounds {
            Bounds::Exact(hits) => {
                hits.keep_first(k);
                hits.cnt()
            }
            _ => return Err(QueryError::InvalidState("no exact hits".to_string())),
        };
        inner.hit_rids = None;
        inner.bundles = None;
        if let Some(dir) = self.dir() {
            if let Err(e) = persist::remove_results(&dir) {
                log::warn!("Query {}: cannot remove result files: {}", self.token, e);
            }
        }
        self.transition(&mut inner, QueryState::HitsTruncated);
        self.persist(&inner);
        Ok(count)
    }

    /// Keep the first `k` bundles and only their rows as hits; returns the
    /// number of bundles kept
    pub fn limit_bundles(&self, k: usize) -> Result<usize> {
        let mut inner = self.inner.write();
        self.ensure_evaluated(&mut inner, true)?;
        let nrows = inner.bounds.exact().map_or(0, Bitvector::size);
        let mut bundles = inner.bundles.take().unwrap_or_default();
        bundles.truncate(k);
        inner.bounds = Bounds::Exact(bundle_rows(&bundles, nrows));
        inner.hit_rids = None;
        let kept = bundles.len();
        inner.bundles = Some(bundles);
        self.transition(&mut inner, QueryState::BundlesTruncated);
        self.persist(&inner);
        Ok(kept)
    }

    // ========================================================================
    // Joins
    // ========================================================================

    /// Number of hit row pairs satisfying the WHERE clause's join terms.
    /// A row may pair with itself.
    pub fn join_count(&self, algorithm: JoinAlgorithm) -> Result<u64> {
        self.with_join(|eval, terms, hits| eval.count(terms, hits, algorithm))
    }

    /// Hit row pairs satisfying the join terms, at `i * nrows + j`
    pub fn join_pairs(&self, algorithm: JoinAlgorithm) -> Result<Bitvector64> {
        self.with_join(|eval, terms, hits| eval.pairs(terms, hits, algorithm))
    }

    /// Count with every join algorithm; fails when they disagree
    pub fn cross_check_joins(&self) -> Result<u64> {
        self.with_join(|eval, terms, hits| eval.cross_check(terms, hits))
    }

    fn with_join<T>(&self, op: impl FnOnce(&JoinEvaluator<'_>, &[JoinTerm], &Bitvector) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.write();
        self.ensure_evaluated(&mut inner, false)?;
        let dataset = inner.dataset.clone().ok_or(QueryError::NoDataset)?;
        let result = {
            let predicate = inner.predicate.as_ref().ok_or(QueryError::NoPredicate)?;
            let terms = predicate.join_terms();
            if terms.is_empty() {
                return Err(QueryError::InvalidState("WHERE clause has no join terms".to_string()));
            }
            let hits = inner
                .bounds
                .exact()
                .ok_or_else(|| QueryError::InvalidState("no exact hits".to_string()))?;
            let data = dataset.read();
            let eval = JoinEvaluator::new(&data, &self.config).with_ranges(predicate);
            op(&eval, &terms, hits)
        };
        result.map_err(|e| self.fail(&mut inner, "join", e))
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Directory holding this query's files, when persistence is enabled
    pub fn persist_path(&self) -> Option<PathBuf> {
        self.dir()
    }

    fn dir(&self) -> Option<PathBuf> {
        self.config.persist_dir.as_ref().map(|root| root.join(&self.token))
    }

    /// Write the query description and any exact results
    fn persist(&self, inner: &QueryInner) {
        let (Some(dir), Some(dataset)) = (self.dir(), inner.dataset.as_ref()) else {
            return;
        };
        let record = QueryRecord {
            user: self.user.clone(),
            dataset: dataset.name().to_string(),
            select: inner.select_text.clone(),
            state: inner.state,
            timestamp: inner.timestamp,
            where_text: inner.where_text.clone(),
            predicate: inner.predicate.clone(),
            rids: inner.rids.clone(),
        };
        let result = persist::write_query(&dir, &record).and_then(|_| {
            if let (true, Some(hits)) = (inner.state.is_evaluated(), inner.bounds.exact()) {
                persist::write_hits(&dir, hits)?;
            }
            if let Some(bundles) = &inner.bundles {
                persist::write_bundles(&dir, bundles)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            log::warn!("Query {}: cannot persist state to {:?}: {}", self.token, dir, e);
        }
    }

    /// Delete this query's persisted directory
    pub fn remove_files(&self) -> Result<()> {
        if let Some(dir) = self.dir() {
            match fs::remove_dir_all(&dir) {
                Ok(()) => log::debug!("Query {}: removed {:?}", self.token, dir),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Restore a query from its persisted directory. Results computed against
    /// an older version of the dataset are discarded.
    pub fn recover(dir: &Path, catalog: &Catalog, config: QueryConfig) -> Result<Self> {
        let record = persist::read_query(dir)?;
        let token = dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or(QueryError::InvalidFileFormat)?;
        let config = match dir.parent() {
            Some(root) => config.with_persist_dir(root),
            None => config,
        };
        let dataset = catalog.find(&record.dataset)?;

        let mut inner = QueryInner { dataset: Some(Arc::clone(&dataset)), ..QueryInner::default() };
        {
            let data = dataset.read();
            if let Some(text) = &record.select {
                let select = parse_select(text)?;
                select.validate(&data)?;
                inner.select_text = Some(select.to_string());
                inner.select = Some(select);
            }
            let predicate = match (record.predicate, &record.where_text) {
                (Some(p), _) => Some(p),
                (None, Some(text)) => Some(parse_where(text)?.simplify()),
                (None, None) => None,
            };
            if let Some(p) = &predicate {
                p.validate(&data)?;
            }
            inner.where_text = predicate.as_ref().map(QExpr::to_string);
            inner.predicate = predicate;
            inner.rids = record.rids;
        }
        inner.state = inner.settled_state(None);

        if record.state.is_evaluated() {
            if record.timestamp == dataset.timestamp() {
                match persist::read_hits(dir) {
                    Ok(hits) => {
                        inner.bounds = Bounds::Exact(hits);
                        inner.timestamp = record.timestamp;
                        inner.state = record.state;
                        inner.hit_rids = optional(persist::read_rids(dir), &token);
                        inner.bundles = optional(persist::read_bundles(dir), &token);
                    }
                    Err(e) => log::warn!("Query {}: cannot restore hits: {}", token, e),
                }
            } else {
                log::info!(
                    "Query {}: dataset {} changed since {}, dropping restored hits",
                    token,
                    record.dataset,
                    record.timestamp
                );
                if let Err(e) = persist::remove_results(dir) {
                    log::warn!("Query {}: cannot remove stale results: {}", token, e);
                }
            }
        }
        log::info!("Recovered query {} in state {}", token, inner.state);

        Ok(Self {
            token,
            user: record.user,
            config,
            observer: Arc::new(NoopObserver),
            inner: RwLock::new(inner),
        })
    }
}

/// Value of an optional result file; a missing file is not an error
fn optional<T>(result: Result<T>, token: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(QueryError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            log::warn!("Query {}: ignoring unreadable result file: {}", token, e);
            None
        }
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Query")
            .field("token", &self.token)
            .field("user", &self.user)
            .field("state", &inner.state)
            .field("where", &inner.where_text)
            .field("select", &inner.select_text)
            .finish()
    }
}
