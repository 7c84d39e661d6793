//! Query lifecycle and cached bounds

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bitvector::Bitvector;

/// Lifecycle of a query, in order of progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QueryState {
    #[default]
    Uninitialized,
    SetComponents,
    SetRids,
    SetPredicate,
    Specified,
    QuickEstimate,
    FullEvaluate,
    BundlesTruncated,
    HitsTruncated,
}

impl QueryState {
    /// Whether exact hits are available
    pub fn is_evaluated(self) -> bool {
        self >= QueryState::FullEvaluate
    }

    pub fn name(self) -> &'static str {
        match self {
            QueryState::Uninitialized => "UNINITIALIZED",
            QueryState::SetComponents => "SET_COMPONENTS",
            QueryState::SetRids => "SET_RIDS",
            QueryState::SetPredicate => "SET_PREDICATE",
            QueryState::Specified => "SPECIFIED",
            QueryState::QuickEstimate => "QUICK_ESTIMATE",
            QueryState::FullEvaluate => "FULL_EVALUATE",
            QueryState::BundlesTruncated => "BUNDLES_TRUNCATED",
            QueryState::HitsTruncated => "HITS_TRUNCATED",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cached hit bounds of a query
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Bounds {
    /// Nothing computed yet, or invalidated
    #[default]
    Unknown,
    /// `low` holds sure hits, `high` every possible hit
    Approximate { low: Bitvector, high: Bitvector },
    /// Bounds coincide
    Exact(Bitvector),
}

impl Bounds {
    /// Collapse to `Exact` when the two bitvectors are equal
    pub fn from_pair(low: Bitvector, high: Bitvector) -> Self {
        if low == high {
            Bounds::Exact(low)
        } else {
            Bounds::Approximate { low, high }
        }
    }

    pub fn low(&self) -> Option<&Bitvector> {
        match self {
            Bounds::Unknown => None,
            Bounds::Approximate { low, .. } => Some(low),
            Bounds::Exact(bits) => Some(bits),
        }
    }

    pub fn high(&self) -> Option<&Bitvector> {
        match self {
            Bounds::Unknown => None,
            Bounds::Approximate { high, .. } => Some(high),
            Bounds::Exact(bits) => Some(bits),
        }
    }

    pub fn exact(&self) -> Option<&Bitvector> {
        match self {
            Bounds::Exact(bits) => Some(bits),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Bounds::Unknown)
    }

    /// `(low.cnt(), high.cnt())`
    pub fn counts(&self) -> Option<(u64, u64)> {
        match self {
            Bounds::Unknown => None,
            Bounds::Approximate { low, high } => Some((low.cnt(), high.cnt())),
            Bounds::Exact(bits) => {
                let n = bits.cnt();
                Some((n, n))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        assert!(QueryState::Specified < QueryState::QuickEstimate);
        assert!(QueryState::HitsTruncated.is_evaluated());
        assert!(!QueryState::QuickEstimate.is_evaluated());
        assert_eq!(QueryState::FullEvaluate.to_string(), "FULL_EVALUATE");
    }

    #[test]
    fn test_bounds_collapse() {
        let a = Bitvector::from_positions([1, 3], 8);
        let b = Bounds::from_pair(a.clone(), a.clone());
        assert_eq!(b.exact(), Some(&a));
        let b = Bounds::from_pair(Bitvector::zeros(8), a);
        assert_eq!(b.counts(), Some((0, 2)));
        assert!(b.exact().is_none());
        assert!(!Bounds::Unknown.is_known());
    }
}
