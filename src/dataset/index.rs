//! Bitmap indexes over a single column
//!
//! An index partitions the non-null rows of a column into buckets, each with
//! a bitvector of member rows. Equality indexes hold one bucket per distinct
//! value and answer ranges exactly; binned indexes hold value-range buckets
//! and answer with a sure/possible pair. Text columns index either whole
//! values or the keywords inside them.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bitvector::Bitvector;
use crate::expr::{tokenize_keywords, ContinuousRange, DiscreteRange};
use crate::{QueryError, Result};

use super::column::{ColumnData, Numeric};

/// Default bin count of a binned index
pub const DEFAULT_BINS: usize = 64;

/// Kind of bitmap index to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexSpec {
    /// One bitvector per distinct value
    Equality,
    /// Equal-width value bins
    Binned { bins: usize },
    /// One bitvector per keyword of a text column
    Keywords,
}

impl IndexSpec {
    pub fn binned() -> Self {
        IndexSpec::Binned { bins: DEFAULT_BINS }
    }
}

/// `equality`, `keywords`, `binned` or `binned=<bins>`
impl FromStr for IndexSpec {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.split_once('=') {
            None if lower == "equality" => Ok(IndexSpec::Equality),
            None if lower == "keywords" => Ok(IndexSpec::Keywords),
            None if lower == "binned" => Ok(IndexSpec::binned()),
            Some(("binned", n)) => match n.parse::<usize>() {
                Ok(bins) if bins > 0 => Ok(IndexSpec::Binned { bins }),
                _ => Err(QueryError::Parse(format!("invalid bin count '{}'", n))),
            },
            _ => Err(QueryError::Parse(format!("unknown index kind '{}'", s))),
        }
    }
}

// ============================================================================
// Index Keys
// ============================================================================

/// Totally ordered key used while grouping rows by value
#[derive(Debug, Clone, Copy)]
struct IndexKey(Numeric);

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(other.0)
    }
}

// ============================================================================
// Bitmap Index
// ============================================================================

/// Rows whose values fall in `[lo, hi]`; bounds keep the column's family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub lo: Numeric,
    pub hi: Numeric,
    pub rows: Bitvector,
}

impl Bucket {
    /// Single-value bucket
    pub fn is_point(&self) -> bool {
        self.lo.equals(self.hi)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitmapIndex {
    column: String,
    spec: IndexSpec,
    nrows: u64,
    /// Numeric buckets in ascending value order
    buckets: Vec<Bucket>,
    /// Text values or keywords
    terms: BTreeMap<String, Bitvector>,
}

impl BitmapIndex {
    /// Build an index over `data`, skipping rows not set in `valid`
    pub fn build(column: &str, spec: IndexSpec, data: &ColumnData, valid: &Bitvector) -> Result<Self> {
        let nrows = data.len() as u64;
        let mut index = Self {
            column: column.to_string(),
            spec,
            nrows,
            buckets: Vec::new(),
            terms: BTreeMap::new(),
        };

        if let ColumnData::Text(values) = data {
            let mut groups: BTreeMap<String, Vec<u64>> = BTreeMap::new();
            for row in valid.positions() {
                let text = &values[row as usize];
                match spec {
                    IndexSpec::Keywords => {
                        for kw in tokenize_keywords(text) {
                            let rows = groups.entry(kw.to_string()).or_insert_with(Vec::new);
                            if rows.last() != Some(&row) {
                                rows.push(row);
                            }
                        }
                    }
                    _ => groups.entry(text.clone()).or_insert_with(Vec::new).push(row),
                }
            }
            index.terms = groups
                .into_iter()
                .map(|(k, rows)| (k, Bitvector::from_positions(rows, nrows)))
                .collect();
            return Ok(index);
        }

        let mut groups: BTreeMap<IndexKey, Vec<u64>> = BTreeMap::new();
        for row in valid.positions() {
            if let Some(n) = data.numeric(row as usize) {
                if !n.is_nan() {
                    groups.entry(IndexKey(n)).or_insert_with(Vec::new).push(row);
                }
            }
        }

        match spec {
            IndexSpec::Binned { bins } if bins > 0 && groups.len() > bins => {
                let (min, max) = match (groups.keys().next(), groups.keys().next_back()) {
                    (Some(a), Some(b)) => (a.0.as_f64(), b.0.as_f64()),
                    _ => return Ok(index),
                };
                let width = (max - min) / bins as f64;
                let mut current: Option<(usize, Numeric, Numeric, Vec<u64>)> = None;
                for (IndexKey(v), rows) in groups {
                    let bin = if width > 0.0 { (((v.as_f64() - min) / width) as usize).min(bins - 1) } else { 0 };
                    match current.as_mut() {
                        Some((b, _, hi, acc)) if *b == bin => {
                            *hi = v;
                            acc.extend(rows);
                        }
                        _ => {
                            if let Some((_, lo, hi, acc)) = current.take() {
                                index.buckets.push(Self::bucket(lo, hi, acc, nrows));
                            }
                            current = Some((bin, v, v, rows));
                        }
                    }
                }
                if let Some((_, lo, hi, acc)) = current {
                    index.buckets.push(Self::bucket(lo, hi, acc, nrows));
                }
            }
            _ => {
                index.buckets = groups
                    .into_iter()
                    .map(|(IndexKey(v), rows)| Self::bucket(v, v, rows, nrows))
                    .collect();
            }
        }
        Ok(index)
    }

    fn bucket(lo: Numeric, hi: Numeric, mut rows: Vec<u64>, nrows: u64) -> Bucket {
        rows.sort_unstable();
        Bucket { lo, hi, rows: Bitvector::from_positions(rows, nrows) }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn spec(&self) -> IndexSpec {
        self.spec
    }

    pub fn nrows(&self) -> u64 {
        self.nrows
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Every bucket holds a single value
    pub fn is_exact(&self) -> bool {
        self.buckets.iter().all(Bucket::is_point)
    }

    /// Approximate in-memory size in bytes
    pub fn bytes(&self) -> u64 {
        self.buckets.iter().map(|b| b.rows.bytes() + 16).sum::<u64>()
            + self.terms.iter().map(|(k, v)| k.len() as u64 + v.bytes()).sum::<u64>()
    }

    // ========================================================================
    // Numeric estimates
    // ========================================================================

    /// `(sure, possible)` rows for a continuous range
    pub fn estimate_range(&self, range: &ContinuousRange) -> (Bitvector, Bitvector) {
        self.estimate_with(|b| range.covers(b.lo, b.hi), |b| range.overlaps(b.lo, b.hi))
    }

    /// `(sure, possible)` rows for a discrete value set
    pub fn estimate_discrete(&self, range: &DiscreteRange) -> (Bitvector, Bitvector) {
        self.estimate_with(|b| b.is_point() && range.contains(b.lo), |b| range.overlaps(b.lo, b.hi))
    }

    fn estimate_with(
        &self,
        sure: impl Fn(&Bucket) -> bool,
        possible: impl Fn(&Bucket) -> bool,
    ) -> (Bitvector, Bitvector) {
        let mut low = Bitvector::zeros(self.nrows);
        let mut high = Bitvector::zeros(self.nrows);
        for b in &self.buckets {
            if possible(b) {
                high |= &b.rows;
                if sure(b) {
                    low |= &b.rows;
                }
            }
        }
        (low, high)
    }

    // ========================================================================
    // Text lookups
    // ========================================================================

    /// Rows equal to `value`; `None` when this is a keyword index
    pub fn text_equal(&self, value: &str) -> Option<Bitvector> {
        if self.spec == IndexSpec::Keywords {
            return None;
        }
        Some(self.terms.get(value).cloned().unwrap_or_else(|| Bitvector::zeros(self.nrows)))
    }

    /// Rows whose value matches `re`; `None` when this is a keyword index
    pub fn text_matching(&self, re: &regex::Regex) -> Option<Bitvector> {
        if self.spec == IndexSpec::Keywords {
            return None;
        }
        let mut out = Bitvector::zeros(self.nrows);
        for (term, rows) in &self.terms {
            if re.is_match(term) {
                out |= rows;
            }
        }
        Some(out)
    }

    /// Rows containing `keyword`; `None` unless this is a keyword index
    pub fn keyword(&self, keyword: &str) -> Option<Bitvector> {
        if self.spec != IndexSpec::Keywords {
            return None;
        }
        Some(self.terms.get(keyword).cloned().unwrap_or_else(|| Bitvector::zeros(self.nrows)))
    }
}
