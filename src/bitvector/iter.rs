//! Iteration over set bits.

use super::{fill_bit, fill_count, is_fill, GenericBitvector, Word};

/// A batch of set positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSet {
    /// Every position in `start..end` is set
    Range { start: u64, end: u64 },
    /// Explicit ascending positions (at most one group's worth)
    Positions(Vec<u64>),
}

impl IndexSet {
    /// Number of positions in this batch
    pub fn len(&self) -> u64 {
        match self {
            IndexSet::Range { start, end } => end - start,
            IndexSet::Positions(list) => list.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Yields [`IndexSet`]s in ascending position order
pub struct IndexSetIter<'a, W> {
    words: &'a [W],
    idx: usize,
    pos: u64,
    active: u64,
    active_done: bool,
}

impl<'a, W: Word> IndexSetIter<'a, W> {
    pub(super) fn new(bv: &'a GenericBitvector<W>) -> Self {
        Self {
            words: &bv.words,
            idx: 0,
            pos: 0,
            active: bv.active,
            active_done: bv.nactive == 0,
        }
    }
}

fn literal_positions(base: u64, mut bits: u64) -> Vec<u64> {
    let mut list = Vec::with_capacity(bits.count_ones() as usize);
    while bits != 0 {
        list.push(base + bits.trailing_zeros() as u64);
        bits &= bits - 1;
    }
    list
}

impl<'a, W: Word> Iterator for IndexSetIter<'a, W> {
    type Item = IndexSet;

    fn next(&mut self) -> Option<IndexSet> {
        while self.idx < self.words.len() {
            let v = self.words[self.idx].to_u64();
            self.idx += 1;
            let base = self.pos;
            if is_fill::<W>(v) {
                self.pos += fill_count::<W>(v) * W::GROUP;
                if fill_bit::<W>(v) {
                    return Some(IndexSet::Range { start: base, end: self.pos });
                }
            } else {
                self.pos += W::GROUP;
                if v != 0 {
                    return Some(IndexSet::Positions(literal_positions(base, v)));
                }
            }
        }
        if !self.active_done {
            self.active_done = true;
            if self.active != 0 {
                return Some(IndexSet::Positions(literal_positions(self.pos, self.active)));
            }
        }
        None
    }
}

/// Yields each set position in ascending order
pub struct Ones<'a, W> {
    sets: IndexSetIter<'a, W>,
    range: std::ops::Range<u64>,
    list: std::vec::IntoIter<u64>,
}

impl<'a, W: Word> Ones<'a, W> {
    pub(super) fn new(bv: &'a GenericBitvector<W>) -> Self {
        Self {
            sets: IndexSetIter::new(bv),
            range: 0..0,
            list: Vec::new().into_iter(),
        }
    }
}

impl<'a, W: Word> Iterator for Ones<'a, W> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            if let Some(p) = self.range.next() {
                return Some(p);
            }
            if let Some(p) = self.list.next() {
                return Some(p);
            }
            match self.sets.next()? {
                IndexSet::Range { start, end } => self.range = start..end,
                IndexSet::Positions(list) => self.list = list.into_iter(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bitvector::Bitvector;

    #[test]
    fn test_index_sets_cover_all_ones() {
        let bv = Bitvector::from_positions((0..200).filter(|i| i % 3 == 0 || (60..150).contains(i)), 250);
        let total: u64 = bv.index_sets().map(|s| s.len()).sum();
        assert_eq!(total, bv.cnt());
        let flat: Vec<u64> = bv.positions().collect();
        let expected: Vec<u64> = (0..200).filter(|i| i % 3 == 0 || (60..150).contains(i)).collect();
        assert_eq!(flat, expected);
    }

    #[test]
    fn test_empty_iteration() {
        let bv = Bitvector::zeros(1000);
        assert_eq!(bv.index_sets().count(), 0);
        assert_eq!(bv.positions().count(), 0);
    }
}
