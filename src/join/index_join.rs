//! Index-assisted join
//!
//! When both columns of a term carry a bitmap index, each pair of buckets is
//! classified by comparing the buckets' value ranges: every row pair of the
//! two buckets matches (sure), none does (impossible), or it has to be
//! checked (undecided). Buckets outside the single-column ranges of the
//! predicate are dropped before any pair is formed. The per-term sure and
//! undecided pair sets are intersected across terms and only the remaining
//! undecided pairs are compared row by row.

use crate::bitvector::{Bitvector, Bitvector64};
use std::cmp::Ordering;

use crate::dataset::{BitmapIndex, Bucket, Numeric};
use crate::expr::{ContinuousRange, JoinKind};
use crate::Result;

use super::{loop_join, values_match, BoundTerm, PairSink};

/// Relation of a bucket pair to a join condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Sure,
    Impossible,
    Undecided,
}

/// Right-side rows paired with one left bucket
struct Plan {
    sure: Bitvector,
    undecided: Bitvector,
}

/// Sure and undecided pairs of one term
struct TermPairs {
    sure: Bitvector64,
    undecided: Bitvector64,
}

pub(super) fn run(
    terms: &[BoundTerm<'_>],
    ranges: &[ContinuousRange],
    left_rows: &Bitvector,
    right_rows: &Bitvector,
    sink: &mut PairSink,
) -> Result<()> {
    let n = sink.nrows();
    let size = n * n;
    let mut sure: Option<Bitvector64> = None;
    let mut possible: Option<Bitvector64> = None;
    for term in terms {
        let pairs = match classify(term, ranges, left_rows, right_rows, n) {
            Some(p) => p,
            None => {
                log::debug!("{} has no usable indexes, every pair is undecided", term.term);
                TermPairs {
                    sure: Bitvector64::zeros(size),
                    undecided: cross(left_rows, right_rows, n, |_| Some(right_rows)),
                }
            }
        };
        let maybe = &pairs.sure | &pairs.undecided;
        sure = Some(match sure {
            Some(s) => &s & &pairs.sure,
            None => pairs.sure,
        });
        possible = Some(match possible {
            Some(p) => &p & &maybe,
            None => maybe,
        });
    }
    let (Some(mut sure), Some(possible)) = (sure, possible) else {
        return Ok(());
    };
    let mut undecided = &possible - &sure;
    if sink.excludes_self() {
        let both = left_rows.and(right_rows);
        let diagonal = Bitvector64::from_positions(both.positions().map(|i| i * n + i), size);
        sure = &sure - &diagonal;
        undecided = &undecided - &diagonal;
    }
    log::debug!("Index join: {} sure pairs, {} undecided", sure.cnt(), undecided.cnt());
    sink.add_wide(&sure);
    loop_join::resolve(terms, &undecided, sink);
    Ok(())
}

/// Pairs of one term from the bucket classification; `None` when the term
/// cannot use indexes
fn classify(
    term: &BoundTerm<'_>,
    ranges: &[ContinuousRange],
    left_rows: &Bitvector,
    right_rows: &Bitvector,
    n: u64,
) -> Option<TermPairs> {
    let delta = match term.kind() {
        JoinKind::Equality => 0.0,
        JoinKind::Band(d) => d,
        JoinKind::Computed(_) => return None,
    };
    let left_index = term.left.index.as_ref()?;
    let right_index = term.right.index.as_ref()?;

    let left_buckets = live_buckets(left_index, &term.term.left, ranges, left_rows);
    let right_buckets = live_buckets(right_index, &term.term.right, ranges, right_rows);

    let mut plans = Vec::with_capacity(left_buckets.len());
    let mut bucket_of = vec![usize::MAX; n as usize];
    for (k, (bl, rows_l)) in left_buckets.iter().enumerate() {
        let mut plan = Plan { sure: Bitvector::zeros(n), undecided: Bitvector::zeros(n) };
        for (br, rows_r) in &right_buckets {
            match verdict(bl, br, delta) {
                Verdict::Sure => plan.sure |= rows_r,
                Verdict::Undecided => plan.undecided |= rows_r,
                Verdict::Impossible => {}
            }
        }
        for row in rows_l.positions() {
            bucket_of[row as usize] = k;
        }
        plans.push(plan);
    }

    let plans = &plans;
    let bucket_of = &bucket_of;
    let plan_of = |i: u64| plans.get(bucket_of[i as usize]);
    Some(TermPairs {
        sure: cross(left_rows, right_rows, n, |i| plan_of(i).map(|p| &p.sure)),
        undecided: cross(left_rows, right_rows, n, |i| plan_of(i).map(|p| &p.undecided)),
    })
}

/// Buckets with rows in `rows` whose values can satisfy the ranges on `column`
fn live_buckets<'i>(
    index: &'i BitmapIndex,
    column: &str,
    ranges: &[ContinuousRange],
    rows: &Bitvector,
) -> Vec<(&'i Bucket, Bitvector)> {
    index
        .buckets()
        .iter()
        .filter(|b| ranges.iter().filter(|r| r.column == column).all(|r| r.overlaps(b.lo, b.hi)))
        .map(|b| (b, b.rows.and(rows)))
        .filter(|(_, r)| r.cnt() > 0)
        .collect()
}

/// Bucket bounds are compared with the same arithmetic as row values, so a
/// sure or impossible verdict holds for every row pair of the two buckets
fn verdict(l: &Bucket, r: &Bucket, delta: f64) -> Verdict {
    let beyond = |a: Numeric, b: Numeric| a.compare(b) == Some(Ordering::Greater) && !values_match(a, b, delta);
    if beyond(l.lo, r.hi) || beyond(r.lo, l.hi) {
        return Verdict::Impossible;
    }
    if values_match(l.hi, r.lo, delta) && values_match(r.hi, l.lo, delta) {
        Verdict::Sure
    } else {
        Verdict::Undecided
    }
}

/// Wide bitvector of pairs `(i, j)` for left rows `i` and the right rows
/// `right_of(i)` restricted to `right_rows`, built in position order
fn cross<'p>(
    left_rows: &Bitvector,
    right_rows: &Bitvector,
    n: u64,
    right_of: impl Fn(u64) -> Option<&'p Bitvector>,
) -> Bitvector64 {
    let mut out = Bitvector64::new();
    for i in left_rows.positions() {
        let Some(partners) = right_of(i) else { continue };
        let partners = partners.and(right_rows);
        for j in partners.positions() {
            let p = i * n + j;
            out.append_run(false, p - out.size());
            out.append_bit(true);
        }
    }
    out.pad_to(n * n, false);
    out
}
