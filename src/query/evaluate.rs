//! Combined index and scan evaluation
//!
//! Each leaf is answered from its index when the index resolves it exactly.
//! Otherwise the leaf is estimated and only the undecided band between its
//! bounds is scanned.

use crate::bitvector::Bitvector;
use crate::dataset::DatasetData;
use crate::expr::QExpr;
use crate::Result;

use super::estimate::BoundEstimator;
use super::scan::{or_second_mask, ScanResult, Scanner};

pub(crate) struct Evaluator<'a> {
    data: &'a DatasetData,
    estimator: BoundEstimator<'a>,
    scanner: Scanner<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(data: &'a DatasetData, or_mask_factor: f64) -> Self {
        Self {
            data,
            estimator: BoundEstimator::new(data),
            scanner: Scanner::new(data, or_mask_factor),
        }
    }

    /// Exact hits of `expr` among the rows set in `mask`
    pub fn evaluate(&self, expr: &QExpr, mask: &Bitvector) -> Result<ScanResult> {
        match expr {
            QExpr::And(l, r) => {
                let left = self.evaluate(l, mask)?;
                if left.count() == 0 {
                    return Ok(left);
                }
                let right = self.evaluate(r, &left.hits)?;
                Ok(ScanResult { hits: right.hits, authoritative: left.authoritative && right.authoritative })
            }
            QExpr::Or(l, r) => {
                let left = self.evaluate(l, mask)?;
                let right = match or_second_mask(mask, &left.hits, self.scanner_factor()) {
                    Some(reduced) => self.evaluate(r, &reduced)?,
                    None => self.evaluate(r, mask)?,
                };
                Ok(ScanResult {
                    hits: &left.hits | &right.hits,
                    authoritative: left.authoritative && right.authoritative,
                })
            }
            QExpr::Xor(l, r) => {
                let left = self.evaluate(l, mask)?;
                let right = self.evaluate(r, mask)?;
                Ok(ScanResult {
                    hits: &left.hits ^ &right.hits,
                    authoritative: left.authoritative && right.authoritative,
                })
            }
            QExpr::Minus(l, r) => {
                let left = self.evaluate(l, mask)?;
                if left.count() == 0 {
                    return Ok(left);
                }
                let right = self.evaluate(r, &left.hits)?;
                Ok(ScanResult {
                    hits: &left.hits - &right.hits,
                    authoritative: left.authoritative && right.authoritative,
                })
            }
            QExpr::Not(inner) => {
                let res = self.evaluate(inner, mask)?;
                Ok(ScanResult { hits: mask - &res.hits, authoritative: res.authoritative })
            }
            QExpr::Join(_) => Ok(ScanResult::placeholder(mask)),
            leaf => self.leaf(leaf, mask),
        }
    }

    fn scanner_factor(&self) -> f64 {
        self.scanner.or_mask_factor()
    }

    fn leaf(&self, leaf: &QExpr, mask: &Bitvector) -> Result<ScanResult> {
        if let Some(exact) = self.data.evaluate_exact(leaf)? {
            return Ok(ScanResult::exact(exact.and(mask)));
        }
        let est = self.estimator.estimate(Some(leaf));
        let sure = est.low().and(mask);
        let band = est.high().minus(est.low()).and(mask);
        if band.cnt() == 0 {
            return Ok(ScanResult::exact(sure));
        }
        log::trace!("Scanning {} undecided rows for {}", band.cnt(), leaf);
        let scanned = self.scanner.scan(leaf, &band)?;
        Ok(ScanResult { hits: &sure | &scanned.hits, authoritative: scanned.authoritative })
    }
}
