//! Sequential scanning of predicate trees
//!
//! Computes exact hits by reading column values for the rows of a mask.
//! Results carry an `authoritative` flag that is cleared when a join term
//! was stood in for by "every row matches".

use crate::bitvector::Bitvector;
use crate::dataset::DatasetData;
use crate::expr::QExpr;
use crate::Result;

/// Hits of a subtree and whether they can be trusted as exact
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScanResult {
    pub hits: Bitvector,
    pub authoritative: bool,
}

impl ScanResult {
    pub fn exact(hits: Bitvector) -> Self {
        Self { hits, authoritative: true }
    }

    /// Placeholder for a subtree this pass cannot resolve
    pub fn placeholder(mask: &Bitvector) -> Self {
        Self { hits: mask.clone(), authoritative: false }
    }

    pub fn count(&self) -> u64 {
        self.hits.cnt()
    }
}

/// Mask for the second operand of an OR. The rows already found are removed
/// only when there are enough of them to pay for building the reduced mask.
pub(crate) fn or_second_mask(mask: &Bitvector, found: &Bitvector, factor: f64) -> Option<Bitvector> {
    let threshold = factor * (mask.bytes() + found.bytes()) as f64;
    if found.cnt() as f64 > threshold {
        Some(mask - found)
    } else {
        None
    }
}

/// Scanner over one dataset snapshot
pub(crate) struct Scanner<'a> {
    data: &'a DatasetData,
    or_mask_factor: f64,
}

impl<'a> Scanner<'a> {
    pub fn new(data: &'a DatasetData, or_mask_factor: f64) -> Self {
        Self { data, or_mask_factor }
    }

    pub fn or_mask_factor(&self) -> f64 {
        self.or_mask_factor
    }

    /// Exact hits of `expr` among the rows set in `mask`
    pub fn scan(&self, expr: &QExpr, mask: &Bitvector) -> Result<ScanResult> {
        match expr {
            QExpr::And(l, r) => {
                let left = self.scan(l, mask)?;
                if left.count() == 0 {
                    return Ok(left);
                }
                let right = self.scan(r, &left.hits)?;
                Ok(ScanResult { hits: right.hits, authoritative: left.authoritative && right.authoritative })
            }
            QExpr::Or(l, r) => {
                let left = self.scan(l, mask)?;
                let right = match or_second_mask(mask, &left.hits, self.or_mask_factor) {
                    Some(reduced) => self.scan(r, &reduced)?,
                    None => self.scan(r, mask)?,
                };
                Ok(ScanResult {
                    hits: &left.hits | &right.hits,
                    authoritative: left.authoritative && right.authoritative,
                })
            }
            QExpr::Xor(l, r) => {
                let left = self.scan(l, mask)?;
                let right = self.scan(r, mask)?;
                Ok(ScanResult {
                    hits: &left.hits ^ &right.hits,
                    authoritative: left.authoritative && right.authoritative,
                })
            }
            QExpr::Minus(l, r) => {
                let left = self.scan(l, mask)?;
                if left.count() == 0 {
                    return Ok(left);
                }
                let right = self.scan(r, &left.hits)?;
                Ok(ScanResult {
                    hits: &left.hits - &right.hits,
                    authoritative: left.authoritative && right.authoritative,
                })
            }
            QExpr::Not(inner) => {
                let res = self.scan(inner, mask)?;
                Ok(ScanResult { hits: mask - &res.hits, authoritative: res.authoritative })
            }
            QExpr::Join(j) => {
                log::debug!("Scan treats {} as matching every row", j);
                Ok(ScanResult::placeholder(mask))
            }
            leaf => Ok(ScanResult::exact(self.data.scan(leaf, mask)?.and(mask))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ColumnData, Dataset};
    use crate::expr::parse_where;

    fn dataset() -> Dataset {
        let ds = Dataset::new("t");
        ds.add_column("a", ColumnData::Int(vec![1, 2, 2, 3, 4, 5, 5, 5, 6, 7])).unwrap();
        ds.add_column("s", ColumnData::Text("ab ac b ab c abc b a ab x".split(' ').map(String::from).collect())).unwrap();
        ds
    }

    fn scan(ds: &Dataset, text: &str, factor: f64) -> ScanResult {
        let data = ds.read();
        Scanner::new(&data, factor).scan(&parse_where(text).unwrap(), &Bitvector::ones(10)).unwrap()
    }

    fn rows(r: &ScanResult) -> Vec<u64> {
        r.hits.positions().collect()
    }

    #[test]
    fn test_scan_connectives() {
        let ds = dataset();
        assert_eq!(rows(&scan(&ds, "a = 5", 1.0)), vec![5, 6, 7]);
        assert_eq!(rows(&scan(&ds, "a between 2 and 5 AND s LIKE 'a%'", 1.0)), vec![1, 3, 5, 7]);
        assert_eq!(rows(&scan(&ds, "a < 2 OR a > 6", 1.0)), vec![0, 9]);
        assert_eq!(rows(&scan(&ds, "a < 4 XOR s = 'ab'", 1.0)), vec![1, 2, 8]);
        assert_eq!(rows(&scan(&ds, "a < 4 MINUS s = 'b'", 1.0)), vec![0, 1, 3]);
        assert_eq!(rows(&scan(&ds, "NOT a = 5", 1.0)), vec![0, 1, 2, 3, 4, 8, 9]);
    }

    #[test]
    fn test_or_mask_factor_does_not_change_hits() {
        let ds = dataset();
        let eager = scan(&ds, "a >= 2 OR s = 'ab'", 0.0);
        let lazy = scan(&ds, "a >= 2 OR s = 'ab'", 1e9);
        assert_eq!(eager, lazy);
    }

    #[test]
    fn test_join_placeholder_is_not_authoritative() {
        let ds = dataset();
        let r = scan(&ds, "a > 3 AND JOIN(a, a)", 1.0);
        assert_eq!(rows(&r), vec![4, 5, 6, 7, 8, 9]);
        assert!(!r.authoritative);
    }

    #[test]
    fn test_or_second_mask_threshold() {
        let mask = Bitvector::ones(10_000);
        let found = Bitvector::from_positions(0..9_000, 10_000);
        assert!(or_second_mask(&mask, &found, 1.0).is_some());
        let sparse = Bitvector::from_positions([3, 900, 7000], 10_000);
        assert!(or_second_mask(&mask, &sparse, 1.0).is_none());
    }
}
