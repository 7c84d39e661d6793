//! Two-column join evaluation
//!
//! A join term relates a left and a right column of the same dataset. A
//! conjunction of terms over a row mask selects the ordered row pairs
//! `(i, j)` whose rows are both in the mask and whose left value of row `i`
//! and right value of row `j` satisfy every term. Pairs are addressed in a
//! [`Bitvector64`] at position `i * nrows + j`.
//!
//! Three algorithms produce the same pairs:
//! - [`JoinAlgorithm::Loop`]: compares every candidate pair directly
//! - [`JoinAlgorithm::SortMerge`]: sorts both sides and merges equal runs or
//!   tolerance windows
//! - [`JoinAlgorithm::Index`]: classifies pairs of index buckets as sure,
//!   impossible or undecided and only compares the undecided pairs

mod index_join;
mod loop_join;
mod merge_join;

use std::fmt;
use std::str::FromStr;

use crate::bitvector::{Bitvector, Bitvector64};
use crate::dataset::{Column, DatasetData, MathEvaluator, Numeric};
use crate::expr::{ContinuousRange, JoinKind, JoinTerm, MathTerm, QExpr};
use crate::{QueryConfig, QueryError, Result};

// ============================================================================
// Algorithms
// ============================================================================

/// Join algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinAlgorithm {
    Loop,
    SortMerge,
    Index,
}

impl JoinAlgorithm {
    pub const ALL: [JoinAlgorithm; 3] = [JoinAlgorithm::Loop, JoinAlgorithm::SortMerge, JoinAlgorithm::Index];

    pub fn name(self) -> &'static str {
        match self {
            JoinAlgorithm::Loop => "loop",
            JoinAlgorithm::SortMerge => "merge",
            JoinAlgorithm::Index => "index",
        }
    }
}

impl fmt::Display for JoinAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JoinAlgorithm {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "loop" | "nested-loop" => Ok(JoinAlgorithm::Loop),
            "merge" | "sort-merge" | "sortmerge" => Ok(JoinAlgorithm::SortMerge),
            "index" => Ok(JoinAlgorithm::Index),
            other => Err(QueryError::UnsupportedJoin(format!("unknown join algorithm '{}'", other))),
        }
    }
}

// ============================================================================
// Bound terms
// ============================================================================

/// A join term resolved against the dataset
pub(crate) struct BoundTerm<'a> {
    pub term: &'a JoinTerm,
    pub left: &'a Column,
    pub right: &'a Column,
    tolerance: Option<(&'a MathTerm, MathEvaluator)>,
}

impl<'a> BoundTerm<'a> {
    fn bind(data: &'a DatasetData, term: &'a JoinTerm) -> Result<Self> {
        let numeric = |name: &str| -> Result<&'a Column> {
            let col = data.column(name)?;
            if !col.column_type().is_numeric() {
                return Err(QueryError::UnsupportedJoin(format!(
                    "{} joins {} column {}",
                    term,
                    col.column_type(),
                    name
                )));
            }
            Ok(col)
        };
        let left = numeric(&term.left)?;
        let right = numeric(&term.right)?;
        let tolerance = match term.kind() {
            JoinKind::Computed(t) => {
                let mut cols = Vec::new();
                t.collect_columns(&mut cols);
                Some((t, data.math_evaluator(&cols)?))
            }
            _ => None,
        };
        Ok(Self { term, left, right, tolerance })
    }

    pub fn kind(&self) -> JoinKind<'a> {
        self.term.kind()
    }

    /// Tolerance for left row `i`; `None` when it cannot be computed
    #[inline]
    pub fn delta(&self, i: u64) -> Option<f64> {
        match self.kind() {
            JoinKind::Equality => Some(0.0),
            JoinKind::Band(d) => Some(d),
            JoinKind::Computed(_) => {
                let (t, eval) = self.tolerance.as_ref()?;
                eval.eval(t, i as usize).map(f64::abs)
            }
        }
    }

    /// Whether left row `i` and right row `j` satisfy the term
    #[inline]
    pub fn matches(&self, i: u64, j: u64) -> bool {
        let (Some(a), Some(b)) = (self.left.data.numeric(i as usize), self.right.data.numeric(j as usize)) else {
            return false;
        };
        match self.delta(i) {
            Some(d) => values_match(a, b, d),
            None => false,
        }
    }
}

#[inline]
pub(crate) fn values_match(a: Numeric, b: Numeric, delta: f64) -> bool {
    if delta == 0.0 {
        a.equals(b)
    } else {
        a.within(b, delta)
    }
}

// ============================================================================
// Pair sink
// ============================================================================

/// Receives matching pairs, either counting them or recording positions
pub(crate) struct PairSink {
    nrows: u64,
    exclude_self: bool,
    count: u64,
    positions: Option<Vec<u64>>,
}

impl PairSink {
    fn counting(nrows: u64, exclude_self: bool) -> Self {
        Self { nrows, exclude_self, count: 0, positions: None }
    }

    fn collecting(nrows: u64, exclude_self: bool) -> Self {
        Self { nrows, exclude_self, count: 0, positions: Some(Vec::new()) }
    }

    pub fn nrows(&self) -> u64 {
        self.nrows
    }

    pub fn excludes_self(&self) -> bool {
        self.exclude_self
    }

    /// Only the count is kept
    pub fn is_counting(&self) -> bool {
        self.positions.is_none()
    }

    #[inline]
    pub fn push(&mut self, i: u64, j: u64) {
        if self.exclude_self && i == j {
            return;
        }
        self.count += 1;
        if let Some(p) = self.positions.as_mut() {
            p.push(i * self.nrows + j);
        }
    }

    /// Add pairs already counted elsewhere; only valid while counting
    pub fn add_count(&mut self, n: u64) {
        debug_assert!(self.is_counting());
        self.count += n;
    }

    /// Add every pair set in `pairs`
    pub fn add_wide(&mut self, pairs: &Bitvector64) {
        match self.positions.as_mut() {
            None => self.count += pairs.cnt(),
            Some(p) => {
                let before = p.len();
                p.extend(pairs.positions());
                self.count += (p.len() - before) as u64;
            }
        }
    }

    fn into_count(self) -> u64 {
        self.count
    }

    fn into_pairs(self) -> Bitvector64 {
        let size = self.nrows * self.nrows;
        let mut positions = self.positions.unwrap_or_default();
        positions.sort_unstable();
        positions.dedup();
        Bitvector64::from_positions(positions, size)
    }
}

// ============================================================================
// Join Evaluator
// ============================================================================

/// Evaluates conjunctions of join terms over one dataset snapshot
pub struct JoinEvaluator<'a> {
    data: &'a DatasetData,
    config: &'a QueryConfig,
    exclude_self: bool,
    ranges: Vec<ContinuousRange>,
}

impl<'a> JoinEvaluator<'a> {
    pub fn new(data: &'a DatasetData, config: &'a QueryConfig) -> Self {
        Self { data, config, exclude_self: false, ranges: Vec::new() }
    }

    /// Drop pairs that pair a row with itself
    pub fn exclude_self(mut self, exclude: bool) -> Self {
        self.exclude_self = exclude;
        self
    }

    /// Use the single-column ranges of `predicate`'s top-level conjunction to
    /// prune the index join
    pub fn with_ranges(mut self, predicate: &QExpr) -> Self {
        self.ranges = predicate.conjunctive_ranges();
        self
    }

    /// Number of row pairs among `mask` satisfying every term
    pub fn count(&self, terms: &[JoinTerm], mask: &Bitvector, algorithm: JoinAlgorithm) -> Result<u64> {
        let mut sink = PairSink::counting(self.data.nrows(), self.exclude_self);
        self.run(terms, mask, algorithm, &mut sink)?;
        log::debug!("{} join over {} rows: {} pairs", algorithm, mask.cnt(), sink.count);
        Ok(sink.into_count())
    }

    /// Row pairs among `mask` satisfying every term
    pub fn pairs(&self, terms: &[JoinTerm], mask: &Bitvector, algorithm: JoinAlgorithm) -> Result<Bitvector64> {
        let (left_rows, right_rows) = self.row_masks(&self.bind(terms)?, mask)?;
        self.guard_pairs(&left_rows, &right_rows)?;
        let mut sink = PairSink::collecting(self.data.nrows(), self.exclude_self);
        self.run(terms, mask, algorithm, &mut sink)?;
        Ok(sink.into_pairs())
    }

    /// Count with every algorithm and fail when they disagree
    pub fn cross_check(&self, terms: &[JoinTerm], mask: &Bitvector) -> Result<u64> {
        let (by_loop, by_merge) = rayon::join(
            || self.count(terms, mask, JoinAlgorithm::Loop),
            || self.count(terms, mask, JoinAlgorithm::SortMerge),
        );
        let by_index = self.count(terms, mask, JoinAlgorithm::Index)?;
        let (by_loop, by_merge) = (by_loop?, by_merge?);
        if by_loop != by_merge || by_loop != by_index {
            log::error!(
                "Join algorithms disagree: loop={} merge={} index={}",
                by_loop,
                by_merge,
                by_index
            );
            return Err(QueryError::InvalidState(format!(
                "join algorithms disagree: loop={} merge={} index={}",
                by_loop, by_merge, by_index
            )));
        }
        Ok(by_loop)
    }

    fn bind<'t>(&self, terms: &'t [JoinTerm]) -> Result<Vec<BoundTerm<'t>>>
    where
        'a: 't,
    {
        if terms.is_empty() {
            return Err(QueryError::InvalidState("no join terms to evaluate".to_string()));
        }
        terms.iter().map(|t| BoundTerm::bind(self.data, t)).collect()
    }

    /// Rows usable on the left and right side: in the mask and non-null in
    /// every column the side reads
    fn row_masks(&self, terms: &[BoundTerm<'_>], mask: &Bitvector) -> Result<(Bitvector, Bitvector)> {
        let mut left_cols = Vec::new();
        let mut right_cols = Vec::new();
        for t in terms {
            left_cols.push(t.term.left.clone());
            right_cols.push(t.term.right.clone());
            if let Some(tol) = &t.term.tolerance {
                tol.collect_columns(&mut left_cols);
            }
        }
        let left = mask.and(&self.data.valid_mask(&left_cols)?);
        let right = mask.and(&self.data.valid_mask(&right_cols)?);
        Ok((left, right))
    }

    fn available_memory(&self) -> u64 {
        self.config.available_memory(self.data.cache_bytes())
    }

    /// Fail before building a pair bitvector too large for the budget
    fn guard_pairs(&self, left_rows: &Bitvector, right_rows: &Bitvector) -> Result<()> {
        let n = self.data.nrows();
        let too_big = || QueryError::OutOfMemory { requested: u64::MAX, budget: self.config.memory_budget };
        let nbits = n.checked_mul(n).ok_or_else(too_big)?;
        let cnt = left_rows.cnt().checked_mul(right_rows.cnt()).ok_or_else(too_big)?;
        let clustering = left_rows.clustering_factor().max(right_rows.clustering_factor());
        let bytes = Bitvector64::estimate_bytes(nbits, cnt, clustering);
        log::debug!("Pair bitvector estimate: {} bits, {} set, ~{} bytes", nbits, cnt, bytes);
        self.config.check_memory(bytes, self.data.cache_bytes())
    }

    fn run(&self, terms: &[JoinTerm], mask: &Bitvector, algorithm: JoinAlgorithm, sink: &mut PairSink) -> Result<()> {
        let bound = self.bind(terms)?;
        let (left_rows, right_rows) = self.row_masks(&bound, mask)?;
        match algorithm {
            JoinAlgorithm::Loop => loop_join::run(&bound, &left_rows, &right_rows, self.available_memory(), sink),
            JoinAlgorithm::SortMerge => {
                // merge on the first term with a constant tolerance, filter by the rest
                match bound.iter().position(|t| !matches!(t.kind(), JoinKind::Computed(_))) {
                    Some(p) => {
                        let rest: Vec<&BoundTerm<'_>> =
                            bound.iter().enumerate().filter(|(i, _)| *i != p).map(|(_, t)| t).collect();
                        merge_join::run(&bound[p], &rest, &left_rows, &right_rows, sink)
                    }
                    None => {
                        log::debug!("No term with a constant tolerance, merge join falls back to loop");
                        loop_join::run(&bound, &left_rows, &right_rows, self.available_memory(), sink)
                    }
                }
            }
            JoinAlgorithm::Index => {
                self.guard_pairs(&left_rows, &right_rows)?;
                index_join::run(&bound, &self.ranges, &left_rows, &right_rows, sink)
            }
        }
    }
}
