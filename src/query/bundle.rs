//! Bundles: hit rows grouped by their selected values

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bitvector::Bitvector;
use crate::dataset::{DatasetData, Value};
use crate::expr::SelectClause;
use crate::{QueryConfig, Result};

/// Rows sharing one tuple of selected values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub values: Vec<Value>,
    /// Row positions, ascending
    pub rows: Vec<u64>,
}

impl Bundle {
    pub fn count(&self) -> u64 {
        self.rows.len() as u64
    }
}

/// Group the hit rows by selected values, in ascending value order
pub(crate) fn build_bundles(
    select: &SelectClause,
    data: &DatasetData,
    hits: &Bitvector,
    config: &QueryConfig,
) -> Result<Vec<Bundle>> {
    // one value per term and row, plus the row id
    let per_row = (select.len() as u64 + 1) * 16;
    config.check_memory(hits.cnt().saturating_mul(per_row), data.cache_bytes())?;

    let values = select.values(data, hits)?;
    let mut groups: BTreeMap<Vec<Value>, Vec<u64>> = BTreeMap::new();
    for (tuple, row) in values.into_iter().zip(hits.positions()) {
        groups.entry(tuple).or_default().push(row);
    }
    Ok(groups.into_iter().map(|(values, rows)| Bundle { values, rows }).collect())
}

/// Rows of every bundle as one bitvector
pub(crate) fn bundle_rows(bundles: &[Bundle], nrows: u64) -> Bitvector {
    let mut rows: Vec<u64> = bundles.iter().flat_map(|b| b.rows.iter().copied()).collect();
    rows.sort_unstable();
    Bitvector::from_positions(rows, nrows)
}
