//! In-memory columnar datasets
//!
//! A [`Dataset`] is a named set of equally long columns guarded by a
//! reader/writer lock. Every mutation bumps a monotonically increasing
//! timestamp so queries can detect that cached results went stale. The
//! query engine only ever takes the read side.

mod column;
mod index;

use std::io::BufRead;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::bitvector::Bitvector;
use crate::expr::{tokenize_keywords, MathTerm, QExpr};
use crate::{QueryError, Result};

pub use column::{Column, ColumnData, ColumnType, NumKind, Numeric, Value};
pub use index::{BitmapIndex, Bucket, IndexSpec, DEFAULT_BINS};

/// Token marking a null cell in text table files
const NULL_TOKEN: &str = "NULL";

// ============================================================================
// Dataset
// ============================================================================

/// A named, lock-protected dataset
#[derive(Debug)]
pub struct Dataset {
    name: String,
    data: RwLock<DatasetData>,
}

impl Dataset {
    /// Empty dataset; the first column fixes the row count
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: RwLock::new(DatasetData {
                nrows: 0,
                timestamp: 1,
                columns: Vec::new(),
                rids: None,
                cache: Mutex::new(AHashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared read access for the duration of the guard
    pub fn read(&self) -> RwLockReadGuard<'_, DatasetData> {
        self.data.read()
    }

    /// Current modification timestamp
    pub fn timestamp(&self) -> u64 {
        self.data.read().timestamp
    }

    pub fn nrows(&self) -> u64 {
        self.data.read().nrows
    }

    /// Add a column with no nulls
    pub fn add_column(&self, name: &str, data: ColumnData) -> Result<()> {
        let valid = Bitvector::ones(data.len() as u64);
        self.add_column_with_nulls(name, data, valid)
    }

    /// Add a column; set bits of `valid` mark non-null rows
    pub fn add_column_with_nulls(&self, name: &str, data: ColumnData, mut valid: Bitvector) -> Result<()> {
        let mut guard = self.data.write();
        let len = data.len() as u64;
        if !guard.columns.is_empty() && len != guard.nrows {
            return Err(QueryError::LengthMismatch { column: name.to_string(), expected: guard.nrows, actual: len });
        }
        if guard.columns.iter().any(|c| c.name == name) {
            return Err(QueryError::InvalidState(format!("column {} already exists", name)));
        }
        valid.truncate(len);
        valid.pad_to(len, false);
        guard.nrows = len;
        guard.columns.push(Column::new(name, data, valid));
        guard.touch();
        log::debug!("Dataset {}: added column {} ({} rows)", self.name, name, len);
        Ok(())
    }

    /// Build (or rebuild) a bitmap index on `column`
    pub fn build_index(&self, column: &str, spec: IndexSpec) -> Result<()> {
        let mut guard = self.data.write();
        let col = guard
            .columns
            .iter_mut()
            .find(|c| c.name == column)
            .ok_or_else(|| QueryError::ColumnNotFound(column.to_string()))?;
        if spec == IndexSpec::Keywords && col.column_type() != ColumnType::Text {
            return Err(QueryError::InvalidState(format!("keyword index needs a text column, {} is {}", column, col.column_type())));
        }
        col.index = Some(BitmapIndex::build(column, spec, &col.data, &col.valid)?);
        guard.touch();
        Ok(())
    }

    /// Append rows; every column must receive the same number of new values
    pub fn append_rows(&self, values: Vec<(String, ColumnData)>) -> Result<u64> {
        let mut guard = self.data.write();
        let added = values.first().map(|(_, d)| d.len() as u64).unwrap_or(0);
        if values.len() != guard.columns.len() {
            return Err(QueryError::InvalidState(format!(
                "append supplies {} columns, dataset has {}",
                values.len(),
                guard.columns.len()
            )));
        }
        for (name, data) in &values {
            let col = guard
                .columns
                .iter()
                .find(|c| &c.name == name)
                .ok_or_else(|| QueryError::ColumnNotFound(name.clone()))?;
            if data.len() as u64 != added {
                return Err(QueryError::LengthMismatch { column: name.clone(), expected: added, actual: data.len() as u64 });
            }
            if data.column_type() != col.column_type() {
                return Err(QueryError::InvalidState(format!("column {} is {}, got {}", name, col.column_type(), data.column_type())));
            }
        }
        for (name, data) in &values {
            if let Some(col) = guard.columns.iter_mut().find(|c| &c.name == name) {
                col.data.extend_from(data)?;
                col.valid.append_run(true, added);
            }
        }
        let start = guard.nrows;
        guard.nrows += added;
        if let Some(rids) = guard.rids.as_mut() {
            let next = rids.iter().max().map_or(start, |m| m + 1);
            rids.extend(next..next + added);
        }
        guard.rebuild_indexes()?;
        guard.touch();
        log::debug!("Dataset {}: appended {} rows", self.name, added);
        Ok(added)
    }

    /// Remove the rows set in `rows`; returns how many were removed
    pub fn delete_rows(&self, rows: &Bitvector) -> Result<u64> {
        let mut guard = self.data.write();
        let n = guard.nrows as usize;
        let mut keep = vec![true; n];
        let mut removed = 0u64;
        for p in rows.positions() {
            if (p as usize) < n {
                keep[p as usize] = false;
                removed += 1;
            }
        }
        if removed == 0 {
            return Ok(0);
        }
        for col in guard.columns.iter_mut() {
            col.data.retain_rows(&keep);
            let mut valid = vec![false; n];
            for p in col.valid.positions() {
                valid[p as usize] = true;
            }
            let kept: Vec<bool> = valid.into_iter().zip(keep.iter()).filter(|(_, k)| **k).map(|(v, _)| v).collect();
            col.valid = Bitvector::from_bools(&kept);
        }
        if let Some(rids) = guard.rids.as_mut() {
            let mut flags = keep.iter();
            rids.retain(|_| flags.next().copied().unwrap_or(true));
        }
        guard.nrows -= removed;
        guard.rebuild_indexes()?;
        guard.touch();
        log::debug!("Dataset {}: deleted {} rows", self.name, removed);
        Ok(removed)
    }

    /// Assign external row identifiers, one per row
    pub fn set_rids(&self, rids: Vec<u64>) -> Result<()> {
        let mut guard = self.data.write();
        if rids.len() as u64 != guard.nrows {
            return Err(QueryError::LengthMismatch { column: "rids".to_string(), expected: guard.nrows, actual: rids.len() as u64 });
        }
        guard.rids = Some(rids);
        guard.touch();
        Ok(())
    }

    /// Drop materialized column caches
    pub fn release_caches(&self) {
        let guard = self.data.read();
        let mut cache = guard.cache.lock();
        if !cache.is_empty() {
            log::info!("Dataset {}: releasing {} cached columns", self.name, cache.len());
            cache.clear();
        }
    }

    /// Load a whitespace separated table. The first line holds `name:type`
    /// headers; `NULL` marks a null cell; `#` starts a comment line.
    pub fn load_text<R: BufRead>(name: &str, reader: R) -> Result<Self> {
        let mut lines = reader.lines();
        let mut header: Option<Vec<(String, ColumnData)>> = None;
        let mut nulls: Vec<Vec<bool>> = Vec::new();
        let mut lineno = 0usize;
        for line in lines.by_ref() {
            let line = line?;
            lineno += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if header.is_none() {
                let mut cols = Vec::new();
                for spec in line.split_whitespace() {
                    let (col, ty) = spec.split_once(':').unwrap_or((spec, "double"));
                    let ty = ColumnType::from_name(ty)
                        .ok_or_else(|| QueryError::Parse(format!("line {}: unknown column type '{}'", lineno, ty)))?;
                    cols.push((col.to_string(), ColumnData::new(ty)));
                    nulls.push(Vec::new());
                }
                header = Some(cols);
                continue;
            }
            let cols = match header.as_mut() {
                Some(cols) => cols,
                None => continue,
            };
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != cols.len() {
                return Err(QueryError::Parse(format!(
                    "line {}: expected {} values, found {}",
                    lineno,
                    cols.len(),
                    tokens.len()
                )));
            }
            for (i, tok) in tokens.iter().enumerate() {
                if *tok == NULL_TOKEN {
                    cols[i].1.push_default();
                    nulls[i].push(false);
                } else {
                    cols[i].1.push_parsed(tok).map_err(|e| QueryError::Parse(format!("line {}: {}", lineno, e)))?;
                    nulls[i].push(true);
                }
            }
        }
        let dataset = Dataset::new(name);
        for ((col, data), valid) in header.unwrap_or_default().into_iter().zip(nulls) {
            dataset.add_column_with_nulls(&col, data, Bitvector::from_bools(&valid))?;
        }
        log::info!("Loaded dataset {} with {} rows", name, dataset.nrows());
        Ok(dataset)
    }
}

// ============================================================================
// Read view
// ============================================================================

/// Dataset contents as seen under the read lock
#[derive(Debug)]
pub struct DatasetData {
    nrows: u64,
    timestamp: u64,
    columns: Vec<Column>,
    rids: Option<Vec<u64>>,
    /// Columns widened to `f64` for arithmetic terms
    cache: Mutex<AHashMap<String, Arc<Vec<f64>>>>,
}

impl DatasetData {
    fn touch(&mut self) {
        self.timestamp += 1;
        self.cache.get_mut().clear();
    }

    fn rebuild_indexes(&mut self) -> Result<()> {
        for col in self.columns.iter_mut() {
            if let Some(spec) = col.index.as_ref().map(BitmapIndex::spec) {
                col.index = Some(BitmapIndex::build(&col.name, spec, &col.data, &col.valid)?);
            }
        }
        Ok(())
    }

    pub fn nrows(&self) -> u64 {
        self.nrows
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| QueryError::ColumnNotFound(name.to_string()))
    }

    /// Column that must hold numbers
    pub fn numeric_column(&self, name: &str) -> Result<&Column> {
        let col = self.column(name)?;
        if !col.column_type().is_numeric() {
            return Err(QueryError::Parse(format!("column {} is {}, expected a number", name, col.column_type())));
        }
        Ok(col)
    }

    /// Column that must hold text
    pub fn text_column(&self, name: &str) -> Result<&Column> {
        let col = self.column(name)?;
        if col.column_type() != ColumnType::Text {
            return Err(QueryError::Parse(format!("column {} is {}, expected text", name, col.column_type())));
        }
        Ok(col)
    }

    /// Rows where every listed column is non-null
    pub fn valid_mask(&self, columns: &[String]) -> Result<Bitvector> {
        let mut mask = Bitvector::ones(self.nrows);
        for name in columns {
            mask = mask.and(&self.column(name)?.valid);
        }
        Ok(mask)
    }

    // ========================================================================
    // Index estimates
    // ========================================================================

    /// Sure and possible hits of a leaf predicate from indexes alone; `None`
    /// when no index can answer
    pub fn estimate(&self, leaf: &QExpr) -> Option<(Bitvector, Bitvector)> {
        let pair = |bv: Bitvector| (bv.clone(), bv);
        match leaf {
            QExpr::Range(r) => {
                if r.is_void() {
                    return Some(pair(Bitvector::zeros(self.nrows)));
                }
                self.index_of(&r.column).map(|idx| idx.estimate_range(r))
            }
            QExpr::DiscreteRange(d) => self.index_of(&d.column).map(|idx| idx.estimate_discrete(d)),
            QExpr::String(s) => self.index_of(&s.column)?.text_equal(&s.value).map(pair),
            QExpr::Like(l) => {
                let re = l.regex().ok()?;
                self.index_of(&l.column)?.text_matching(&re).map(pair)
            }
            QExpr::Keyword(k) => self.index_of(&k.column)?.keyword(&k.keyword).map(pair),
            QExpr::Exists(c) => Some(pair(match self.column(c) {
                Ok(col) => col.valid.clone(),
                Err(_) => Bitvector::zeros(self.nrows),
            })),
            _ => None,
        }
    }

    fn index_of(&self, column: &str) -> Option<&BitmapIndex> {
        self.columns.iter().find(|c| c.name == column)?.index.as_ref()
    }

    /// Exact hits of a leaf from indexes alone, when the index resolves it
    pub fn evaluate_exact(&self, leaf: &QExpr) -> Result<Option<Bitvector>> {
        Ok(match self.estimate(leaf) {
            Some((low, high)) if low == high => Some(low),
            _ => None,
        })
    }

    /// Expected number of hits of a leaf, used to order evaluation
    pub fn estimate_cost(&self, leaf: &QExpr) -> f64 {
        match leaf {
            QExpr::Constant(true) | QExpr::Join(_) => self.nrows as f64,
            QExpr::Constant(false) => 0.0,
            _ => match self.estimate(leaf) {
                Some((low, high)) => (low.cnt() + high.cnt()) as f64 / 2.0,
                None => self.nrows as f64 / 2.0,
            },
        }
    }

    // ========================================================================
    // Sequential scans
    // ========================================================================

    /// Exact hits of a leaf among the rows set in `mask`, reading values
    pub fn scan(&self, leaf: &QExpr, mask: &Bitvector) -> Result<Bitvector> {
        match leaf {
            QExpr::Range(r) => {
                let col = self.numeric_column(&r.column)?;
                Ok(self.scan_column(col, mask, |row| col.data.numeric(row).map_or(false, |v| r.contains(v))))
            }
            QExpr::DiscreteRange(d) => {
                let col = self.numeric_column(&d.column)?;
                Ok(self.scan_column(col, mask, |row| col.data.numeric(row).map_or(false, |v| d.contains(v))))
            }
            QExpr::String(s) => {
                let col = self.text_column(&s.column)?;
                Ok(self.scan_column(col, mask, |row| col.data.text(row) == Some(s.value.as_str())))
            }
            QExpr::Like(l) => {
                let col = self.text_column(&l.column)?;
                let re = l.regex()?;
                Ok(self.scan_column(col, mask, |row| col.data.text(row).map_or(false, |t| re.is_match(t))))
            }
            QExpr::Keyword(k) => {
                let col = self.text_column(&k.column)?;
                Ok(self.scan_column(col, mask, |row| {
                    col.data.text(row).map_or(false, |t| tokenize_keywords(t).any(|w| w == k.keyword))
                }))
            }
            QExpr::Exists(c) => Ok(match self.column(c) {
                Ok(col) => mask.and(&col.valid),
                Err(_) => Bitvector::zeros(self.nrows),
            }),
            QExpr::Compare(cmp) => {
                let mut cols = Vec::new();
                cmp.left.collect_columns(&mut cols);
                cmp.right.collect_columns(&mut cols);
                let eval = self.math_evaluator(&cols)?;
                let rows = mask.and(&self.valid_mask(&cols)?);
                let hits = rows.positions().filter(|&row| {
                    match (eval.eval(&cmp.left, row as usize), eval.eval(&cmp.right, row as usize)) {
                        (Some(a), Some(b)) => cmp.op.apply(a, b),
                        _ => false,
                    }
                });
                Ok(Bitvector::from_positions(hits, self.nrows))
            }
            QExpr::Constant(true) => Ok(mask.clone()),
            QExpr::Constant(false) => Ok(Bitvector::zeros(self.nrows)),
            other => Err(QueryError::InvalidState(format!("cannot scan non-leaf predicate {}", other))),
        }
    }

    fn scan_column(&self, col: &Column, mask: &Bitvector, pred: impl Fn(usize) -> bool) -> Bitvector {
        let rows = mask.and(&col.valid);
        Bitvector::from_positions(rows.positions().filter(|&row| pred(row as usize)), self.nrows)
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Column values widened to `f64`, cached until the dataset changes
    pub fn column_f64(&self, name: &str) -> Result<Arc<Vec<f64>>> {
        if let Some(v) = self.cache.lock().get(name) {
            return Ok(Arc::clone(v));
        }
        let col = self.numeric_column(name)?;
        let values: Vec<f64> = (0..col.data.len()).map(|row| col.data.as_f64(row).unwrap_or(f64::NAN)).collect();
        let values = Arc::new(values);
        self.cache.lock().insert(name.to_string(), Arc::clone(&values));
        Ok(values)
    }

    /// Bytes held by cached `f64` columns
    pub fn cache_bytes(&self) -> u64 {
        self.cache.lock().values().map(|v| v.len() as u64 * 8).sum()
    }

    /// Evaluator of arithmetic terms over `columns`
    pub fn math_evaluator(&self, columns: &[String]) -> Result<MathEvaluator> {
        let cols = columns
            .iter()
            .map(|c| Ok((c.clone(), self.column_f64(c)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(MathEvaluator { cols })
    }

    /// Cell value of `column` at `row`
    pub fn value(&self, column: &str, row: usize) -> Result<Value> {
        let col = self.column(column)?;
        if !col.valid.get(row as u64) {
            return Ok(Value::Null);
        }
        Ok(col.data.value(row))
    }

    // ========================================================================
    // Row identifiers
    // ========================================================================

    /// External identifier of `row` (the row position when none were set)
    pub fn rid(&self, row: u64) -> u64 {
        match &self.rids {
            Some(rids) => rids.get(row as usize).copied().unwrap_or(row),
            None => row,
        }
    }

    /// Rows whose identifiers appear in `rids`
    pub fn resolve_rids(&self, rids: &[u64]) -> Bitvector {
        match &self.rids {
            None => Bitvector::from_positions(
                {
                    let mut rows: Vec<u64> = rids.iter().copied().filter(|r| *r < self.nrows).collect();
                    rows.sort_unstable();
                    rows.dedup();
                    rows
                },
                self.nrows,
            ),
            Some(ids) => {
                let wanted: AHashSet<u64> = rids.iter().copied().collect();
                let rows = ids.iter().enumerate().filter(|(_, id)| wanted.contains(id)).map(|(i, _)| i as u64);
                Bitvector::from_positions(rows, self.nrows)
            }
        }
    }

    /// Identifiers of the rows set in `hits`
    pub fn rids_of(&self, hits: &Bitvector) -> Vec<u64> {
        hits.positions().map(|row| self.rid(row)).collect()
    }
}

/// Evaluates [`MathTerm`]s row by row against cached `f64` columns
pub struct MathEvaluator {
    cols: Vec<(String, Arc<Vec<f64>>)>,
}

impl MathEvaluator {
    #[inline]
    pub fn eval(&self, term: &MathTerm, row: usize) -> Option<f64> {
        term.eval(&mut |name: &str| {
            self.cols
                .iter()
                .find(|(c, _)| c == name)
                .and_then(|(_, v)| v.get(row).copied())
                .filter(|v| !v.is_nan())
        })
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Registry of datasets by name
#[derive(Debug, Default)]
pub struct Catalog {
    datasets: RwLock<AHashMap<String, Arc<Dataset>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset, replacing any previous one of the same name
    pub fn register(&self, dataset: Dataset) -> Arc<Dataset> {
        let dataset = Arc::new(dataset);
        self.datasets.write().insert(dataset.name().to_string(), Arc::clone(&dataset));
        dataset
    }

    pub fn find(&self, name: &str) -> Result<Arc<Dataset>> {
        self.datasets
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::DatasetNotFound(name.to_string()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Dataset>> {
        self.datasets.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.datasets.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse_where, ContinuousRange};

    fn sample() -> Dataset {
        let ds = Dataset::new("t");
        ds.add_column("a", ColumnData::Int(vec![1, 2, 2, 3, 4, 5, 5, 5, 6, 7])).unwrap();
        ds.add_column("b", ColumnData::Double(vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 5.0, 5.0])).unwrap();
        ds
    }

    #[test]
    fn test_length_mismatch() {
        let ds = sample();
        let err = ds.add_column("c", ColumnData::Int(vec![1])).unwrap_err();
        assert!(matches!(err, QueryError::LengthMismatch { expected: 10, actual: 1, .. }));
    }

    #[test]
    fn test_timestamp_advances_on_mutation() {
        let ds = sample();
        let t0 = ds.timestamp();
        ds.build_index("a", IndexSpec::Equality).unwrap();
        assert!(ds.timestamp() > t0);
        let t1 = ds.timestamp();
        ds.append_rows(vec![("a".into(), ColumnData::Int(vec![9])), ("b".into(), ColumnData::Double(vec![9.0]))]).unwrap();
        assert!(ds.timestamp() > t1);
        assert_eq!(ds.nrows(), 11);
    }

    #[test]
    fn test_scan_and_estimate_agree() {
        let ds = sample();
        ds.build_index("a", IndexSpec::Equality).unwrap();
        let data = ds.read();
        let leaf = QExpr::Range(ContinuousRange::between("a", 2.0, 5.0));
        let scanned = data.scan(&leaf, &Bitvector::ones(10)).unwrap();
        assert_eq!(scanned.positions().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6, 7]);
        let exact = data.evaluate_exact(&leaf).unwrap().unwrap();
        assert_eq!(exact, scanned);
        let unindexed = QExpr::Range(ContinuousRange::equals("b", 2.0));
        assert!(data.estimate(&unindexed).is_none());
    }

    #[test]
    fn test_compare_scan() {
        let ds = sample();
        let data = ds.read();
        let leaf = parse_where("a - b > 1").unwrap();
        let hits = data.scan(&leaf, &Bitvector::ones(10)).unwrap();
        assert_eq!(hits.positions().collect::<Vec<_>>(), vec![5, 9]);
    }

    #[test]
    fn test_nulls_excluded_from_scan() {
        let ds = Dataset::new("n");
        ds.add_column_with_nulls("x", ColumnData::Int(vec![5, 5, 5]), Bitvector::from_positions([0, 2], 3)).unwrap();
        let data = ds.read();
        let hits = data.scan(&parse_where("x = 5").unwrap(), &Bitvector::ones(3)).unwrap();
        assert_eq!(hits.positions().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(data.value("x", 1).unwrap(), Value::Null);
    }

    #[test]
    fn test_delete_and_rids() {
        let ds = sample();
        ds.set_rids((100..110).collect()).unwrap();
        let removed = ds.delete_rows(&Bitvector::from_positions([0, 9], 10)).unwrap();
        assert_eq!(removed, 2);
        let data = ds.read();
        assert_eq!(data.nrows(), 8);
        assert_eq!(data.rid(0), 101);
        let mask = data.resolve_rids(&[102, 103, 500]);
        assert_eq!(mask.positions().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(data.rids_of(&mask), vec![102, 103]);
    }

    #[test]
    fn test_load_text() {
        let text = "# demo\na:int s:text\n1 red\nNULL blue\n3 red\n";
        let ds = Dataset::load_text("demo", text.as_bytes()).unwrap();
        assert_eq!(ds.nrows(), 3);
        let data = ds.read();
        assert_eq!(data.column("a").unwrap().valid.cnt(), 2);
        assert_eq!(data.value("s", 2).unwrap(), Value::Text("red".into()));
    }

    #[test]
    fn test_catalog() {
        let catalog = Catalog::new();
        catalog.register(sample());
        assert!(catalog.find("t").is_ok());
        assert!(matches!(catalog.find("zz"), Err(QueryError::DatasetNotFound(_))));
        assert_eq!(catalog.names(), vec!["t".to_string()]);
    }
}
