//! Nested-loop join
//!
//! Every left row is compared with every right row. Values are gathered into
//! vectors first when the memory budget allows it and read from the columns
//! pair by pair otherwise.

use rayon::prelude::*;

use crate::bitvector::{Bitvector, Bitvector64};
use crate::dataset::{ColumnData, Numeric};
use crate::expr::JoinKind;
use crate::Result;

use super::{values_match, BoundTerm, PairSink};

/// Pair count above which left rows are processed in parallel
const PARALLEL_PAIRS: u64 = 1 << 20;

pub(super) fn run(
    terms: &[BoundTerm<'_>],
    left_rows: &Bitvector,
    right_rows: &Bitvector,
    memory: u64,
    sink: &mut PairSink,
) -> Result<()> {
    let lrows: Vec<u64> = left_rows.positions().collect();
    let rrows: Vec<u64> = right_rows.positions().collect();
    if lrows.is_empty() || rrows.is_empty() {
        return Ok(());
    }

    if let [term] = terms {
        if term.term.is_self_join() && term.kind() == JoinKind::Equality && left_rows == right_rows {
            symmetric_equal(term, &lrows, sink);
            return Ok(());
        }
        if term.left.column_type().is_small_integer() && term.right.column_type().is_small_integer() {
            if let Some(delta) = constant_delta(term) {
                small_int(term, delta, &lrows, &rrows, sink);
                return Ok(());
            }
        }
    }

    let gather: u64 = terms
        .iter()
        .map(|t| t.left.data.gather_bytes(lrows.len() as u64) + t.right.data.gather_bytes(rrows.len() as u64) + lrows.len() as u64 * 8)
        .sum();
    if gather <= memory {
        gathered(terms, &lrows, &rrows, sink);
    } else {
        log::debug!("Loop join streams values, gathering needs {} bytes", gather);
        streamed(terms, &lrows, &rrows, sink);
    }
    Ok(())
}

/// Test every candidate pair of `candidates` against all terms
pub(super) fn resolve(terms: &[BoundTerm<'_>], candidates: &Bitvector64, sink: &mut PairSink) {
    let n = sink.nrows();
    if n == 0 {
        return;
    }
    for p in candidates.positions() {
        let (i, j) = (p / n, p % n);
        if terms.iter().all(|t| t.matches(i, j)) {
            sink.push(i, j);
        }
    }
}

fn constant_delta(term: &BoundTerm<'_>) -> Option<f64> {
    match term.kind() {
        JoinKind::Equality => Some(0.0),
        JoinKind::Band(d) => Some(d),
        JoinKind::Computed(_) => None,
    }
}

/// `a = a` over one row set: test each unordered pair once
fn symmetric_equal(term: &BoundTerm<'_>, rows: &[u64], sink: &mut PairSink) {
    let values: Vec<Option<Numeric>> = rows.iter().map(|&r| term.left.data.numeric(r as usize)).collect();
    for (a, &i) in rows.iter().enumerate() {
        let Some(va) = values[a] else { continue };
        if va.equals(va) {
            sink.push(i, i);
        }
        for (b, &j) in rows.iter().enumerate().skip(a + 1) {
            if values[b].map_or(false, |vb| va.equals(vb)) {
                sink.push(i, j);
                sink.push(j, i);
            }
        }
    }
}

/// Both columns hold integers of at most 32 bits: compare as `i64`
fn small_int(term: &BoundTerm<'_>, delta: f64, lrows: &[u64], rrows: &[u64], sink: &mut PairSink) {
    let fetch = |col: &ColumnData, rows: &[u64]| -> Vec<i64> {
        rows.iter().map(|&r| col.small_int(r as usize).unwrap_or_default()).collect()
    };
    let left = fetch(&term.left.data, lrows);
    let right = fetch(&term.right.data, rrows);
    let test = |a: i64, b: i64| (a - b).unsigned_abs() as f64 <= delta;
    emit(lrows, rrows, sink, |a, b| test(left[a], right[b]));
}

fn gathered(terms: &[BoundTerm<'_>], lrows: &[u64], rrows: &[u64], sink: &mut PairSink) {
    struct Side {
        left: Vec<Option<Numeric>>,
        right: Vec<Option<Numeric>>,
        delta: Vec<Option<f64>>,
    }
    let sides: Vec<Side> = terms
        .iter()
        .map(|t| Side {
            left: lrows.iter().map(|&r| t.left.data.numeric(r as usize)).collect(),
            right: rrows.iter().map(|&r| t.right.data.numeric(r as usize)).collect(),
            delta: lrows.iter().map(|&r| t.delta(r)).collect(),
        })
        .collect();
    emit(lrows, rrows, sink, |a, b| {
        sides.iter().all(|s| match (s.left[a], s.right[b], s.delta[a]) {
            (Some(x), Some(y), Some(d)) => values_match(x, y, d),
            _ => false,
        })
    });
}

fn streamed(terms: &[BoundTerm<'_>], lrows: &[u64], rrows: &[u64], sink: &mut PairSink) {
    for &i in lrows {
        for &j in rrows {
            if terms.iter().all(|t| t.matches(i, j)) {
                sink.push(i, j);
            }
        }
    }
}

/// Drive `test(a, b)` over every index pair, in parallel for large inputs
fn emit(lrows: &[u64], rrows: &[u64], sink: &mut PairSink, test: impl Fn(usize, usize) -> bool + Sync) {
    let pairs = lrows.len() as u64 * rrows.len() as u64;
    if pairs < PARALLEL_PAIRS {
        for (a, &i) in lrows.iter().enumerate() {
            for (b, &j) in rrows.iter().enumerate() {
                if test(a, b) {
                    sink.push(i, j);
                }
            }
        }
        return;
    }

    let matched: Vec<Vec<usize>> = (0..lrows.len())
        .into_par_iter()
        .map(|a| (0..rrows.len()).filter(|&b| test(a, b)).collect())
        .collect();
    for (a, row) in matched.into_iter().enumerate() {
        for b in row {
            sink.push(lrows[a], rrows[b]);
        }
    }
}
