//! Sort-merge join
//!
//! Both sides are stably sorted by value, carrying their row positions.
//! Equality terms pair up runs of equal values; tolerance terms slide a
//! window `[v - delta, v + delta]` over the sorted right side. Both pointers
//! only move forward. Values of different numeric families are ordered with
//! [`Numeric::compare`], so signed and unsigned columns merge correctly.

use std::cmp::Ordering;

use ahash::AHashMap;

use crate::bitvector::Bitvector;
use crate::dataset::Numeric;
use crate::expr::JoinKind;
use crate::{QueryError, Result};

use super::{BoundTerm, PairSink};

type Entry = (Numeric, u64);

/// Join on `primary`, keeping only pairs that also satisfy every term in `rest`
pub(super) fn run(
    primary: &BoundTerm<'_>,
    rest: &[&BoundTerm<'_>],
    left_rows: &Bitvector,
    right_rows: &Bitvector,
    sink: &mut PairSink,
) -> Result<()> {
    let left = sorted(left_rows, |r| primary.left.data.numeric(r));
    let right = sorted(right_rows, |r| primary.right.data.numeric(r));
    if left.is_empty() || right.is_empty() {
        return Ok(());
    }
    match primary.kind() {
        JoinKind::Equality => merge_equal(&left, &right, rest, sink),
        JoinKind::Band(delta) => merge_band(&left, &right, delta, rest, sink),
        JoinKind::Computed(_) => {
            return Err(QueryError::UnsupportedJoin(format!(
                "{} has a computed tolerance and cannot be merged",
                primary.term
            )))
        }
    }
    Ok(())
}

/// Non-NaN values of `rows`, stably sorted ascending
fn sorted(rows: &Bitvector, value: impl Fn(usize) -> Option<Numeric>) -> Vec<Entry> {
    let mut out: Vec<Entry> = rows
        .positions()
        .filter_map(|r| value(r as usize).filter(|v| !v.is_nan()).map(|v| (v, r)))
        .collect();
    out.sort_by(|a, b| order(a.0, b.0));
    out
}

#[inline]
fn order(a: Numeric, b: Numeric) -> Ordering {
    a.compare(b).unwrap_or(Ordering::Equal)
}

fn merge_equal(left: &[Entry], right: &[Entry], rest: &[&BoundTerm<'_>], sink: &mut PairSink) {
    let (mut a, mut b) = (0, 0);
    while a < left.len() && b < right.len() {
        match order(left[a].0, right[b].0) {
            Ordering::Less => a += 1,
            Ordering::Greater => b += 1,
            Ordering::Equal => {
                let a_end = run_end(left, a);
                let b_end = run_end(right, b);
                emit_block(&left[a..a_end], &right[b..b_end], rest, sink);
                a = a_end;
                b = b_end;
            }
        }
    }
}

/// End of the run of values equal to `side[start]`
fn run_end(side: &[Entry], start: usize) -> usize {
    let v = side[start].0;
    start + side[start..].iter().take_while(|e| e.0.equals(v)).count()
}

/// Cross product of two runs of equal values
fn emit_block(ls: &[Entry], rs: &[Entry], rest: &[&BoundTerm<'_>], sink: &mut PairSink) {
    if rest.is_empty() && sink.is_counting() {
        let mut n = ls.len() as u64 * rs.len() as u64;
        if sink.excludes_self() {
            n -= common_rows(ls, rs);
        }
        sink.add_count(n);
        return;
    }
    for &(_, i) in ls {
        for &(_, j) in rs {
            if rest.iter().all(|t| t.matches(i, j)) {
                sink.push(i, j);
            }
        }
    }
}

/// Rows present in both runs; within a run rows ascend (stable sort)
fn common_rows(ls: &[Entry], rs: &[Entry]) -> u64 {
    let (mut a, mut b, mut n) = (0, 0, 0);
    while a < ls.len() && b < rs.len() {
        match ls[a].1.cmp(&rs[b].1) {
            Ordering::Less => a += 1,
            Ordering::Greater => b += 1,
            Ordering::Equal => {
                n += 1;
                a += 1;
                b += 1;
            }
        }
    }
    n
}

fn merge_band(left: &[Entry], right: &[Entry], delta: f64, rest: &[&BoundTerm<'_>], sink: &mut PairSink) {
    let fast_count = rest.is_empty() && sink.is_counting();
    // sorted slot of each right row, to find a row's own pair inside a window
    let slot: Option<AHashMap<u64, usize>> = if fast_count && sink.excludes_self() {
        Some(right.iter().enumerate().map(|(k, e)| (e.1, k)).collect())
    } else {
        None
    };

    let (mut lo, mut hi) = (0, 0);
    for &(v, i) in left {
        while lo < right.len() && order(right[lo].0, v) == Ordering::Less && !v.within(right[lo].0, delta) {
            lo += 1;
        }
        hi = hi.max(lo);
        while hi < right.len() && (order(right[hi].0, v) != Ordering::Greater || v.within(right[hi].0, delta)) {
            hi += 1;
        }
        if fast_count {
            let mut n = (hi - lo) as u64;
            if let Some(k) = slot.as_ref().and_then(|s| s.get(&i)) {
                if (lo..hi).contains(k) {
                    n -= 1;
                }
            }
            sink.add_count(n);
            continue;
        }
        for &(_, j) in &right[lo..hi] {
            if rest.iter().all(|t| t.matches(i, j)) {
                sink.push(i, j);
            }
        }
    }
}
