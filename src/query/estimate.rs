//! Index-only bound estimation
//!
//! Walks a predicate tree and brackets its hits between a sure-hit and a
//! possible-hit bitvector without reading column values. A node whose
//! bounds coincide is carried as [`Estimate::Exact`] so the combinators can
//! take cheaper paths.

use crate::bitvector::Bitvector;
use crate::dataset::DatasetData;
use crate::expr::QExpr;

/// Bounds of one tree node
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Estimate {
    Exact(Bitvector),
    Range { low: Bitvector, high: Bitvector },
}

impl Estimate {
    fn new(low: Bitvector, high: Bitvector) -> Self {
        if low == high {
            Estimate::Exact(low)
        } else {
            Estimate::Range { low, high }
        }
    }

    pub fn low(&self) -> &Bitvector {
        match self {
            Estimate::Exact(bits) => bits,
            Estimate::Range { low, .. } => low,
        }
    }

    pub fn high(&self) -> &Bitvector {
        match self {
            Estimate::Exact(bits) => bits,
            Estimate::Range { high, .. } => high,
        }
    }

    pub fn into_pair(self) -> (Bitvector, Bitvector) {
        match self {
            Estimate::Exact(bits) => (bits.clone(), bits),
            Estimate::Range { low, high } => (low, high),
        }
    }
}

/// Bound estimator over one dataset snapshot
pub(crate) struct BoundEstimator<'a> {
    data: &'a DatasetData,
    nrows: u64,
}

impl<'a> BoundEstimator<'a> {
    pub fn new(data: &'a DatasetData) -> Self {
        Self { data, nrows: data.nrows() }
    }

    fn all(&self) -> Bitvector {
        Bitvector::ones(self.nrows)
    }

    fn none(&self) -> Bitvector {
        Bitvector::zeros(self.nrows)
    }

    /// Bounds of `expr`; a missing predicate matches every row
    pub fn estimate(&self, expr: Option<&QExpr>) -> Estimate {
        match expr {
            Some(e) => self.node(e),
            None => Estimate::Exact(self.all()),
        }
    }

    fn node(&self, expr: &QExpr) -> Estimate {
        match expr {
            QExpr::Not(inner) => match self.node(inner) {
                Estimate::Exact(bits) => Estimate::Exact(bits.complement()),
                Estimate::Range { low, high } => Estimate::Range { low: high.complement(), high: low.complement() },
            },
            QExpr::And(l, r) => {
                let left = self.node(l);
                // no sure hits on the left: its bounds already bracket the conjunction
                if left.low().cnt() == 0 {
                    return left;
                }
                let right = self.node(r);
                match (left, right) {
                    (Estimate::Exact(a), Estimate::Exact(b)) => Estimate::Exact(&a & &b),
                    (left, right) => Estimate::new(left.low() & right.low(), left.high() & right.high()),
                }
            }
            QExpr::Or(l, r) => {
                let left = self.node(l);
                let right = self.node(r);
                match (left, right) {
                    (Estimate::Exact(a), Estimate::Exact(b)) => Estimate::Exact(&a | &b),
                    (left, right) => Estimate::new(left.low() | right.low(), left.high() | right.high()),
                }
            }
            QExpr::Xor(l, r) => {
                let left = self.node(l);
                let right = self.node(r);
                match (left, right) {
                    // both sides exact: the result is exact as well
                    (Estimate::Exact(a), Estimate::Exact(b)) => Estimate::Exact(&a ^ &b),
                    (left, right) => {
                        let low = {
                            let sure_l = left.low() - right.high();
                            let sure_r = right.low() - left.high();
                            &sure_l | &sure_r
                        };
                        let high = {
                            let maybe_l = left.high() - right.low();
                            let maybe_r = right.high() - left.low();
                            &maybe_l | &maybe_r
                        };
                        Estimate::new(low, high)
                    }
                }
            }
            QExpr::Minus(l, r) => {
                let left = self.node(l);
                if left.high().cnt() == 0 {
                    return left;
                }
                let right = self.node(r);
                match (left, right) {
                    (Estimate::Exact(a), Estimate::Exact(b)) => Estimate::Exact(&a - &b),
                    (left, right) => Estimate::new(left.low() - right.high(), left.high() - right.low()),
                }
            }
            QExpr::Constant(b) => Estimate::Exact(if *b { self.all() } else { self.none() }),
            QExpr::Compare(c) => match c.constant_truth() {
                Some(b) => Estimate::Exact(if b { self.all() } else { self.none() }),
                None => Estimate::Range { low: self.none(), high: self.all() },
            },
            // join terms are resolved by the join evaluator
            QExpr::Join(_) => Estimate::Exact(self.all()),
            leaf => match self.data.estimate(leaf) {
                Some((low, high)) => Estimate::new(low, high),
                None => Estimate::Range { low: self.none(), high: self.all() },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ColumnData, Dataset, IndexSpec};
    use crate::expr::parse_where;

    fn dataset() -> Dataset {
        let ds = Dataset::new("t");
        ds.add_column("a", ColumnData::Int(vec![1, 2, 2, 3, 4, 5, 5, 5, 6, 7])).unwrap();
        ds.add_column("x", ColumnData::Double((0..10).map(|i| i as f64 * 10.0).collect())).unwrap();
        ds.build_index("a", IndexSpec::Equality).unwrap();
        ds.build_index("x", IndexSpec::Binned { bins: 3 }).unwrap();
        ds
    }

    fn est(ds: &Dataset, text: &str) -> Estimate {
        let data = ds.read();
        BoundEstimator::new(&data).estimate(Some(&parse_where(text).unwrap()))
    }

    #[test]
    fn test_equality_index_gives_exact() {
        let ds = dataset();
        match est(&ds, "a = 5") {
            Estimate::Exact(bits) => assert_eq!(bits.positions().collect::<Vec<_>>(), vec![5, 6, 7]),
            other => panic!("expected exact, got {:?}", other),
        }
    }

    #[test]
    fn test_not_swaps_bounds() {
        let ds = dataset();
        let plain = est(&ds, "x < 45");
        let negated = est(&ds, "NOT x < 45");
        assert_eq!(negated.low(), &plain.high().complement());
        assert_eq!(negated.high(), &plain.low().complement());
    }

    #[test]
    fn test_and_short_circuits_on_empty_left() {
        let ds = dataset();
        let e = est(&ds, "a = 100 AND x > 0");
        assert_eq!(e, Estimate::Exact(Bitvector::zeros(10)));
    }

    #[test]
    fn test_unindexed_leaf_is_undecided() {
        let ds = Dataset::new("u");
        ds.add_column("y", ColumnData::Int(vec![1, 2, 3])).unwrap();
        let e = est(&ds, "y = 2");
        assert_eq!(e.low().cnt(), 0);
        assert_eq!(e.high().cnt(), 3);
    }

    #[test]
    fn test_xor_bounds_bracket_exact() {
        let ds = dataset();
        let e = est(&ds, "a >= 3 XOR x < 45");
        let exact = Bitvector::from_positions([0, 1, 2, 5, 6, 7, 8, 9], 10);
        assert!(e.low().is_subset_of(&exact));
        assert!(exact.is_subset_of(e.high()));
    }

    #[test]
    fn test_xor_of_exact_sides_is_exact() {
        let ds = dataset();
        let e = est(&ds, "a >= 3 XOR a < 6");
        assert_eq!(e, Estimate::Exact(Bitvector::from_positions([0, 1, 2, 8, 9], 10)));
    }

    #[test]
    fn test_xor_of_binned_sides_brackets_exact() {
        let ds = dataset();
        ds.add_column("y", ColumnData::Double((0..10).map(|i| i as f64 * 5.0).collect())).unwrap();
        ds.build_index("y", IndexSpec::Binned { bins: 3 }).unwrap();
        let left = est(&ds, "x < 35");
        let right = est(&ds, "y > 20");
        assert!(matches!(left, Estimate::Range { .. }));
        assert!(matches!(right, Estimate::Range { .. }));

        let e = est(&ds, "x < 35 XOR y > 20");
        let exact = Bitvector::from_positions([0, 1, 2, 3, 5, 6, 7, 8, 9], 10);
        assert!(matches!(e, Estimate::Range { .. }));
        assert!(e.low().is_subset_of(&exact));
        assert!(exact.is_subset_of(e.high()));
        assert_eq!(e.low().positions().collect::<Vec<_>>(), vec![0, 1, 2, 6, 7, 8, 9]);
    }

    #[test]
    fn test_minus_short_circuits_on_empty_left() {
        let ds = dataset();
        let e = est(&ds, "x > 1000 MINUS x < 45");
        assert_eq!(e, Estimate::Exact(Bitvector::zeros(10)));
        let e = est(&ds, "a = 100 MINUS a + x > 3");
        assert_eq!(e, Estimate::Exact(Bitvector::zeros(10)));
    }

    #[test]
    fn test_join_and_missing_predicate_match_all() {
        let ds = dataset();
        assert_eq!(est(&ds, "JOIN(a, x)"), Estimate::Exact(Bitvector::ones(10)));
        let data = ds.read();
        assert_eq!(BoundEstimator::new(&data).estimate(None), Estimate::Exact(Bitvector::ones(10)));
    }
}
