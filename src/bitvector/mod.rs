//! Word-aligned compressed bitvectors
//!
//! Bits are packed into groups of `W::BITS - 1`. A group whose bits are all
//! equal is folded into a fill word together with its equal neighbours; any
//! other group is stored verbatim as a literal word. The trailing partial
//! group stays uncompressed in `active` until it fills up.
//!
//! ```text
//! fill word:    1 | v | count (groups of value v)
//! literal word: 0 | payload (GROUP bits, LSB = lowest position)
//! ```
//!
//! Two flavours share the implementation:
//! - [`Bitvector`]: `u32` words, addresses rows of a dataset
//! - [`Bitvector64`]: `u64` words, addresses the N×N cross product of a join
//!
//! Binary operations on vectors of different sizes treat the shorter one as
//! padded with zeros; the result has the larger size.

mod iter;
mod word;

use std::fmt;
use std::mem::size_of;
use std::ops::{BitAnd, BitOr, BitOrAssign, BitXor, Not, Sub};

use serde::{Deserialize, Serialize};

pub use iter::{IndexSet, IndexSetIter, Ones};
pub use word::Word;

/// Row-addressed bitvector
pub type Bitvector = GenericBitvector<u32>;

/// Pair-addressed bitvector for join results (position = left * nrows + right)
pub type Bitvector64 = GenericBitvector<u64>;

// ============================================================================
// Word helpers
// ============================================================================

#[inline]
fn low_mask(n: u64) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

#[inline]
fn is_fill<W: Word>(w: u64) -> bool {
    w & W::FILL_FLAG != 0
}

#[inline]
fn fill_bit<W: Word>(w: u64) -> bool {
    w & W::FILL_BIT != 0
}

#[inline]
fn fill_count<W: Word>(w: u64) -> u64 {
    w & W::MAX_FILL
}

#[inline]
fn make_fill<W: Word>(bit: bool, count: u64) -> u64 {
    W::FILL_FLAG | if bit { W::FILL_BIT } else { 0 } | count
}

// ============================================================================
// Group cursor
// ============================================================================

/// A run of groups as seen by a cursor
#[derive(Debug, Clone, Copy)]
enum Chunk {
    /// `count` remaining groups of the same value
    Fill(bool, u64),
    /// A single group
    Literal(u64),
}

impl Chunk {
    #[inline]
    fn literal<W: Word>(self) -> u64 {
        match self {
            Chunk::Fill(true, _) => W::LITERAL_MASK,
            Chunk::Fill(false, _) => 0,
            Chunk::Literal(v) => v,
        }
    }

    #[inline]
    fn fill(self) -> Option<(bool, u64)> {
        match self {
            Chunk::Fill(bit, n) => Some((bit, n)),
            Chunk::Literal(_) => None,
        }
    }
}

/// Walks the groups of a bitvector. Past the end it yields the active group
/// once and then an endless zero fill.
struct Cursor<'a, W> {
    words: &'a [W],
    idx: usize,
    used: u64,
    active: u64,
    active_pending: bool,
}

impl<'a, W: Word> Cursor<'a, W> {
    fn new(bv: &'a GenericBitvector<W>) -> Self {
        Self {
            words: &bv.words,
            idx: 0,
            used: 0,
            active: bv.active,
            active_pending: bv.nactive > 0,
        }
    }

    #[inline]
    fn current(&self) -> Chunk {
        if self.idx < self.words.len() {
            let w = self.words[self.idx].to_u64();
            if is_fill::<W>(w) {
                Chunk::Fill(fill_bit::<W>(w), fill_count::<W>(w) - self.used)
            } else {
                Chunk::Literal(w)
            }
        } else if self.active_pending {
            Chunk::Literal(self.active)
        } else {
            Chunk::Fill(false, u64::MAX)
        }
    }

    /// Consume `n` groups of the current chunk (`n == 1` for literals).
    #[inline]
    fn advance(&mut self, n: u64) {
        if self.idx < self.words.len() {
            let w = self.words[self.idx].to_u64();
            if is_fill::<W>(w) {
                self.used += n;
                if self.used >= fill_count::<W>(w) {
                    self.idx += 1;
                    self.used = 0;
                }
            } else {
                self.idx += 1;
            }
        } else {
            self.active_pending = false;
        }
    }

    /// Consume `n` groups, crossing chunk boundaries.
    fn skip(&mut self, mut n: u64) {
        while n > 0 {
            match self.current() {
                Chunk::Fill(_, count) => {
                    let k = count.min(n);
                    self.advance(k);
                    n -= k;
                }
                Chunk::Literal(_) => {
                    self.advance(1);
                    n -= 1;
                }
            }
        }
    }
}

// ============================================================================
// Binary operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BitOp {
    And,
    Or,
    Xor,
    Minus,
}

impl BitOp {
    #[inline]
    fn apply(self, a: u64, b: u64) -> u64 {
        match self {
            BitOp::And => a & b,
            BitOp::Or => a | b,
            BitOp::Xor => a ^ b,
            BitOp::Minus => a & !b,
        }
    }

    #[inline]
    fn apply_bit(self, a: bool, b: bool) -> bool {
        match self {
            BitOp::And => a && b,
            BitOp::Or => a || b,
            BitOp::Xor => a ^ b,
            BitOp::Minus => a && !b,
        }
    }

    /// A fill that fixes the result regardless of the other operand, as
    /// (result value, groups covered).
    fn absorbing(self, a: Option<(bool, u64)>, b: Option<(bool, u64)>) -> Option<(bool, u64)> {
        let pick = |side: Option<(bool, u64)>, value: bool| side.filter(|(bit, _)| *bit == value).map(|(_, n)| n);
        let (result, left, right) = match self {
            BitOp::And => (false, pick(a, false), pick(b, false)),
            BitOp::Or => (true, pick(a, true), pick(b, true)),
            BitOp::Minus => (false, pick(a, false), pick(b, true)),
            BitOp::Xor => return None,
        };
        match (left, right) {
            (Some(x), Some(y)) => Some((result, x.max(y))),
            (Some(x), None) | (None, Some(x)) => Some((result, x)),
            (None, None) => None,
        }
    }
}

// ============================================================================
// Bitvector
// ============================================================================

/// Compressed bitvector over positions `0..size()`
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenericBitvector<W> {
    /// Compressed full groups
    words: Vec<W>,
    /// Number of bits held in `words` (multiple of the group size)
    nbits: u64,
    /// Trailing partial group, bits above `nactive` are zero
    active: u64,
    /// Number of valid bits in `active`
    nactive: u64,
}

impl<W: Word> GenericBitvector<W> {
    /// Empty bitvector of size 0
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            nbits: 0,
            active: 0,
            nactive: 0,
        }
    }

    /// `n` zero bits
    pub fn zeros(n: u64) -> Self {
        let mut bv = Self::new();
        bv.append_run(false, n);
        bv
    }

    /// `n` one bits
    pub fn ones(n: u64) -> Self {
        let mut bv = Self::new();
        bv.append_run(true, n);
        bv
    }

    /// Build from ascending positions; the result is at least `size` bits.
    /// Out-of-order positions are still honoured, at a rebuild cost.
    pub fn from_positions<I: IntoIterator<Item = u64>>(positions: I, size: u64) -> Self {
        let mut bv = Self::new();
        for p in positions {
            let cur = bv.size();
            if p < cur {
                bv.set_bit(p, true);
                continue;
            }
            bv.append_run(false, p - cur);
            bv.append_bit(true);
        }
        bv.pad_to(size, false);
        bv
    }

    /// Build from a slice of booleans
    pub fn from_bools(bits: &[bool]) -> Self {
        let mut bv = Self::new();
        for &b in bits {
            bv.append_bit(b);
        }
        bv
    }

    /// Number of bits represented
    #[inline]
    pub fn size(&self) -> u64 {
        self.nbits + self.nactive
    }

    /// Whether no bit is set
    pub fn is_empty(&self) -> bool {
        self.cnt() == 0
    }

    /// Number of set bits
    pub fn cnt(&self) -> u64 {
        let mut c = self.active.count_ones() as u64;
        for &w in &self.words {
            let v = w.to_u64();
            if is_fill::<W>(v) {
                if fill_bit::<W>(v) {
                    c += fill_count::<W>(v) * W::GROUP;
                }
            } else {
                c += v.count_ones() as u64;
            }
        }
        c
    }

    /// In-memory footprint in bytes
    pub fn bytes(&self) -> u64 {
        (self.words.len() * size_of::<W>() + size_of::<Self>()) as u64
    }

    /// Number of compressed words
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Value of bit `pos`; positions past the end read as zero
    pub fn get(&self, pos: u64) -> bool {
        if pos >= self.size() {
            return false;
        }
        if pos >= self.nbits {
            return (self.active >> (pos - self.nbits)) & 1 == 1;
        }
        let mut group = pos / W::GROUP;
        let offset = pos % W::GROUP;
        for &w in &self.words {
            let v = w.to_u64();
            if is_fill::<W>(v) {
                let n = fill_count::<W>(v);
                if group < n {
                    return fill_bit::<W>(v);
                }
                group -= n;
            } else {
                if group == 0 {
                    return (v >> offset) & 1 == 1;
                }
                group -= 1;
            }
        }
        false
    }

    // ========================================================================
    // Building
    // ========================================================================

    /// Append one bit at position `size()`
    #[inline]
    pub fn append_bit(&mut self, bit: bool) {
        if bit {
            self.active |= 1u64 << self.nactive;
        }
        self.nactive += 1;
        if self.nactive == W::GROUP {
            let group = self.active;
            self.active = 0;
            self.nactive = 0;
            self.append_group(group);
        }
    }

    /// Append `n` copies of `bit`
    pub fn append_run(&mut self, bit: bool, mut n: u64) {
        if n == 0 {
            return;
        }
        if self.nactive > 0 {
            let k = n.min(W::GROUP - self.nactive);
            if bit {
                self.active |= low_mask(k) << self.nactive;
            }
            self.nactive += k;
            n -= k;
            if self.nactive == W::GROUP {
                let group = self.active;
                self.active = 0;
                self.nactive = 0;
                self.append_group(group);
            }
        }
        if n >= W::GROUP {
            let groups = n / W::GROUP;
            self.append_fill(bit, groups);
            n -= groups * W::GROUP;
        }
        if n > 0 {
            if bit {
                self.active = low_mask(n);
            }
            self.nactive = n;
        }
    }

    /// Set bit `pos`, growing the vector with zeros when `pos >= size()`
    pub fn set_bit(&mut self, pos: u64, value: bool) {
        let size = self.size();
        if pos >= size {
            self.append_run(false, pos - size);
            self.append_bit(value);
            return;
        }
        if pos >= self.nbits {
            let offset = pos - self.nbits;
            if value {
                self.active |= 1u64 << offset;
            } else {
                self.active &= !(1u64 << offset);
            }
            return;
        }
        if self.get(pos) == value {
            return;
        }

        // rebuild the compressed part with the target group toggled
        let target = pos / W::GROUP;
        let flip = 1u64 << (pos % W::GROUP);
        let ngroups = self.nbits / W::GROUP;
        let mut out = Self::new();
        let mut cur = Cursor::new(self);
        let mut g = 0u64;
        while g < ngroups {
            match cur.current() {
                Chunk::Fill(bit, n) if g + n <= target || g > target => {
                    out.append_fill(bit, n);
                    cur.advance(n);
                    g += n;
                }
                Chunk::Fill(bit, n) => {
                    let before = target - g;
                    out.append_fill(bit, before);
                    let group = if bit { W::LITERAL_MASK } else { 0 };
                    out.append_group(group ^ flip);
                    out.append_fill(bit, n - before - 1);
                    cur.advance(n);
                    g += n;
                }
                Chunk::Literal(v) => {
                    out.append_group(if g == target { v ^ flip } else { v });
                    cur.advance(1);
                    g += 1;
                }
            }
        }
        out.active = self.active;
        out.nactive = self.nactive;
        *self = out;
    }

    /// Grow to `n` bits by appending `bit`; no-op when already that large
    pub fn pad_to(&mut self, n: u64, bit: bool) {
        let size = self.size();
        if n > size {
            self.append_run(bit, n - size);
        }
    }

    /// Drop every bit at or past position `n`
    pub fn truncate(&mut self, n: u64) {
        if n >= self.size() {
            return;
        }
        let full = n / W::GROUP;
        let tail = n % W::GROUP;
        let mut out = Self::new();
        let mut cur = Cursor::new(self);
        let mut done = 0u64;
        while done < full {
            match cur.current() {
                Chunk::Fill(bit, count) => {
                    let k = count.min(full - done);
                    out.append_fill(bit, k);
                    cur.advance(k);
                    done += k;
                }
                Chunk::Literal(v) => {
                    out.append_group(v);
                    cur.advance(1);
                    done += 1;
                }
            }
        }
        if tail > 0 {
            out.active = cur.current().literal::<W>() & low_mask(tail);
            out.nactive = tail;
        }
        *self = out;
    }

    /// Keep only the first `k` set bits
    pub fn keep_first(&mut self, k: u64) {
        if self.cnt() <= k {
            return;
        }
        let size = self.size();
        let kept = Self::from_positions(self.positions().take(k as usize), size);
        *self = kept;
    }

    fn append_group(&mut self, group: u64) {
        debug_assert_eq!(self.nactive, 0);
        if group == 0 {
            self.append_fill(false, 1);
        } else if group == W::LITERAL_MASK {
            self.append_fill(true, 1);
        } else {
            self.words.push(W::from_u64(group));
            self.nbits += W::GROUP;
        }
    }

    fn append_fill(&mut self, bit: bool, n: u64) {
        debug_assert_eq!(self.nactive, 0);
        if n == 0 {
            return;
        }
        self.nbits += n * W::GROUP;
        let mut n = n;
        if let Some(last) = self.words.last_mut() {
            let v = last.to_u64();
            if is_fill::<W>(v) && fill_bit::<W>(v) == bit {
                let have = fill_count::<W>(v);
                let k = (W::MAX_FILL - have).min(n);
                *last = W::from_u64(make_fill::<W>(bit, have + k));
                n -= k;
            }
        }
        while n > 0 {
            let k = n.min(W::MAX_FILL);
            self.words.push(W::from_u64(make_fill::<W>(bit, k)));
            n -= k;
        }
    }

    // ========================================================================
    // Algebra
    // ========================================================================

    fn combine(&self, other: &Self, op: BitOp) -> Self {
        let total = self.size().max(other.size());
        let full = total / W::GROUP;
        let tail = total % W::GROUP;
        let mut out = Self::new();
        let mut a = Cursor::new(self);
        let mut b = Cursor::new(other);
        let mut done = 0u64;

        while done < full {
            let left = full - done;
            let (ca, cb) = (a.current(), b.current());
            if let Some((bit, n)) = op.absorbing(ca.fill(), cb.fill()) {
                let k = n.min(left);
                out.append_fill(bit, k);
                a.skip(k);
                b.skip(k);
                done += k;
            } else if let (Chunk::Fill(x, na), Chunk::Fill(y, nb)) = (ca, cb) {
                let k = na.min(nb).min(left);
                out.append_fill(op.apply_bit(x, y), k);
                a.advance(k);
                b.advance(k);
                done += k;
            } else {
                let group = op.apply(ca.literal::<W>(), cb.literal::<W>()) & W::LITERAL_MASK;
                out.append_group(group);
                a.advance(1);
                b.advance(1);
                done += 1;
            }
        }
        if tail > 0 {
            let la = a.current().literal::<W>();
            let lb = b.current().literal::<W>();
            out.active = op.apply(la, lb) & low_mask(tail);
            out.nactive = tail;
        }
        out
    }

    /// Bitwise AND
    pub fn and(&self, other: &Self) -> Self {
        self.combine(other, BitOp::And)
    }

    /// Bitwise OR
    pub fn or(&self, other: &Self) -> Self {
        self.combine(other, BitOp::Or)
    }

    /// Bitwise XOR
    pub fn xor(&self, other: &Self) -> Self {
        self.combine(other, BitOp::Xor)
    }

    /// Bits set in `self` but not in `other`
    pub fn minus(&self, other: &Self) -> Self {
        self.combine(other, BitOp::Minus)
    }

    /// Flip every bit within `0..size()`
    pub fn complement(&self) -> Self {
        let mut out = Self {
            words: Vec::with_capacity(self.words.len()),
            nbits: self.nbits,
            active: !self.active & low_mask(self.nactive),
            nactive: self.nactive,
        };
        for &w in &self.words {
            let v = w.to_u64();
            let flipped = if is_fill::<W>(v) { v ^ W::FILL_BIT } else { v ^ W::LITERAL_MASK };
            out.words.push(W::from_u64(flipped));
        }
        out
    }

    /// Whether every set bit of `self` is also set in `other`
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.minus(other).cnt() == 0
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Set bits grouped as ranges (from fills) or position lists (from literals)
    pub fn index_sets(&self) -> IndexSetIter<'_, W> {
        IndexSetIter::new(self)
    }

    /// Positions of set bits in ascending order
    pub fn positions(&self) -> Ones<'_, W> {
        Ones::new(self)
    }

    /// Number of maximal runs of consecutive set bits
    pub fn count_runs(&self) -> u64 {
        let mut runs = 0u64;
        let mut last_end: Option<u64> = None;
        for set in self.index_sets() {
            match set {
                IndexSet::Range { start, end } => {
                    if last_end != Some(start) {
                        runs += 1;
                    }
                    last_end = Some(end);
                }
                IndexSet::Positions(list) => {
                    for p in list {
                        if last_end != Some(p) {
                            runs += 1;
                        }
                        last_end = Some(p + 1);
                    }
                }
            }
        }
        runs
    }

    /// Average length of a run of set bits (1.0 for scattered or empty vectors)
    pub fn clustering_factor(&self) -> f64 {
        let runs = self.count_runs();
        if runs == 0 {
            return 1.0;
        }
        (self.cnt() as f64 / runs as f64).max(1.0)
    }

    /// Expected compressed size in bytes of a vector with `nbits` bits of which
    /// `cnt` are set, using a two-state Markov model whose mean run length of
    /// ones is `clustering`.
    pub fn estimate_bytes(nbits: u64, cnt: u64, clustering: f64) -> u64 {
        let overhead = size_of::<Self>() as u64;
        if nbits == 0 {
            return overhead;
        }
        let g = W::GROUP as f64;
        let groups = (nbits as f64 / g).ceil();
        let den = (cnt as f64 / nbits as f64).clamp(0.0, 1.0);
        let (zero_group, one_group) = if den <= 0.0 {
            (1.0, 0.0)
        } else if den >= 1.0 {
            (0.0, 1.0)
        } else {
            let q = (1.0 / clustering.max(1.0)).min(1.0);
            let p = (den * q / (1.0 - den)).min(1.0);
            (
                (1.0 - den) * (1.0 - p).powf(g - 1.0),
                den * (1.0 - q).powf(g - 1.0),
            )
        };
        let words = (groups * (1.0 - zero_group * zero_group - one_group * one_group)).max(1.0);
        words.ceil() as u64 * size_of::<W>() as u64 + overhead
    }
}

impl<W: Word> fmt::Debug for GenericBitvector<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitvector")
            .field("size", &self.size())
            .field("cnt", &self.cnt())
            .field("words", &self.words.len())
            .finish()
    }
}

impl<W: Word> BitAnd for &GenericBitvector<W> {
    type Output = GenericBitvector<W>;

    fn bitand(self, rhs: Self) -> GenericBitvector<W> {
        self.and(rhs)
    }
}

impl<W: Word> BitOr for &GenericBitvector<W> {
    type Output = GenericBitvector<W>;

    fn bitor(self, rhs: Self) -> GenericBitvector<W> {
        self.or(rhs)
    }
}

impl<W: Word> BitXor for &GenericBitvector<W> {
    type Output = GenericBitvector<W>;

    fn bitxor(self, rhs: Self) -> GenericBitvector<W> {
        self.xor(rhs)
    }
}

impl<W: Word> Sub for &GenericBitvector<W> {
    type Output = GenericBitvector<W>;

    fn sub(self, rhs: Self) -> GenericBitvector<W> {
        self.minus(rhs)
    }
}

impl<W: Word> Not for &GenericBitvector<W> {
    type Output = GenericBitvector<W>;

    fn not(self) -> GenericBitvector<W> {
        self.complement()
    }
}

impl<W: Word> BitOrAssign<&GenericBitvector<W>> for GenericBitvector<W> {
    fn bitor_assign(&mut self, rhs: &GenericBitvector<W>) {
        *self = self.or(rhs);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random bit pattern with long runs mixed in
    fn pattern(n: usize, seed: u64) -> Vec<bool> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let r = state >> 33;
            match r % 4 {
                0 => out.extend(std::iter::repeat(true).take((r % 97) as usize)),
                1 => out.extend(std::iter::repeat(false).take((r % 211) as usize)),
                _ => out.push(r & 1 == 1),
            }
        }
        out.truncate(n);
        out
    }

    fn to_bools<W: Word>(bv: &GenericBitvector<W>) -> Vec<bool> {
        (0..bv.size()).map(|i| bv.get(i)).collect()
    }

    #[test]
    fn test_append_and_get() {
        let bits = pattern(1000, 7);
        let bv = Bitvector::from_bools(&bits);
        assert_eq!(bv.size(), 1000);
        assert_eq!(to_bools(&bv), bits);
        assert_eq!(bv.cnt(), bits.iter().filter(|&&b| b).count() as u64);
    }

    #[test]
    fn test_runs_compress() {
        let bv = Bitvector::ones(31 * 1000 + 5);
        assert_eq!(bv.cnt(), 31 * 1000 + 5);
        assert_eq!(bv.word_count(), 1);
        let z = Bitvector64::zeros(1 << 40);
        assert_eq!(z.cnt(), 0);
        assert_eq!(z.size(), 1 << 40);
        assert!(z.word_count() <= 1);
    }

    #[test]
    fn test_binary_ops_match_reference() {
        for (na, nb) in [(1000usize, 1000usize), (700, 1300), (31, 62), (5, 0), (4000, 33)] {
            let a = pattern(na, na as u64);
            let b = pattern(nb, nb as u64 + 3);
            let va = Bitvector::from_bools(&a);
            let vb = Bitvector::from_bools(&b);
            let n = na.max(nb);
            let at = |i: usize| i < na && a[i];
            let bt = |i: usize| i < nb && b[i];

            let and: Vec<bool> = (0..n).map(|i| at(i) && bt(i)).collect();
            let or: Vec<bool> = (0..n).map(|i| at(i) || bt(i)).collect();
            let xor: Vec<bool> = (0..n).map(|i| at(i) ^ bt(i)).collect();
            let minus: Vec<bool> = (0..n).map(|i| at(i) && !bt(i)).collect();

            assert_eq!(to_bools(&(&va & &vb)), and);
            assert_eq!(to_bools(&(&va | &vb)), or);
            assert_eq!(to_bools(&(&va ^ &vb)), xor);
            assert_eq!(to_bools(&(&va - &vb)), minus);
            assert_eq!(&va & &vb, Bitvector::from_bools(&and));
        }
    }

    #[test]
    fn test_complement_involution() {
        let bits = pattern(2049, 11);
        let bv = Bitvector::from_bools(&bits);
        let flipped = !&bv;
        assert_eq!(flipped.cnt(), 2049 - bv.cnt());
        assert_eq!(!&flipped, bv);
    }

    #[test]
    fn test_set_bit_inside_fill() {
        let mut bv = Bitvector::zeros(500);
        bv.set_bit(100, true);
        bv.set_bit(499, true);
        bv.set_bit(700, true);
        assert_eq!(bv.size(), 701);
        assert_eq!(bv.positions().collect::<Vec<_>>(), vec![100, 499, 700]);
        bv.set_bit(100, false);
        assert_eq!(bv.positions().collect::<Vec<_>>(), vec![499, 700]);
        assert_eq!(bv, Bitvector::from_positions([499, 700], 701));
    }

    #[test]
    fn test_index_sets_and_runs() {
        let mut bv = Bitvector::new();
        bv.append_run(false, 3);
        bv.append_run(true, 100);
        bv.append_run(false, 10);
        bv.append_bit(true);
        let sets: Vec<IndexSet> = bv.index_sets().collect();
        assert!(sets.iter().any(|s| matches!(s, IndexSet::Range { .. })));
        let ones: Vec<u64> = bv.positions().collect();
        assert_eq!(ones.len(), 101);
        assert_eq!(ones[0], 3);
        assert_eq!(ones[99], 102);
        assert_eq!(ones[100], 113);
        assert_eq!(bv.count_runs(), 2);
        assert!((bv.clustering_factor() - 50.5).abs() < 1e-9);
    }

    #[test]
    fn test_truncate_and_keep_first() {
        let bits = pattern(900, 5);
        let mut bv = Bitvector::from_bools(&bits);
        bv.truncate(400);
        assert_eq!(to_bools(&bv), bits[..400].to_vec());

        let mut first = Bitvector::from_positions([2, 5, 9, 40], 50);
        first.keep_first(2);
        assert_eq!(first.positions().collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!(first.size(), 50);
    }

    #[test]
    fn test_estimate_bytes_bounds() {
        let dense = Bitvector::estimate_bytes(1 << 20, 1 << 20, 1.0);
        let sparse = Bitvector::estimate_bytes(1 << 20, 1 << 19, 1.0);
        let clustered = Bitvector::estimate_bytes(1 << 20, 1 << 19, 4096.0);
        assert!(dense < sparse);
        assert!(clustered < sparse);
    }

    #[test]
    fn test_serde_roundtrip() {
        let bv = Bitvector::from_bools(&pattern(333, 9));
        let bytes = bincode::serialize(&bv).unwrap();
        let back: Bitvector = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, bv);
    }
}
