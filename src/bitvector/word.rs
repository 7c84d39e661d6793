//! Storage words for compressed bitvectors.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A storage word of a [`GenericBitvector`](super::GenericBitvector).
///
/// The most significant bit tags a word as a fill, the next bit is the fill
/// value and the remaining bits count groups. A literal word carries
/// `BITS - 1` payload bits.
pub trait Word:
    Copy + Debug + Default + PartialEq + Eq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Bits per storage word
    const BITS: u32;
    /// Payload bits per literal word (one group)
    const GROUP: u64 = (Self::BITS - 1) as u64;
    /// Mask covering the payload of a literal word
    const LITERAL_MASK: u64 = (1u64 << Self::GROUP) - 1;
    /// Tag bit of a fill word
    const FILL_FLAG: u64 = 1u64 << (Self::BITS - 1);
    /// Value bit of a fill word
    const FILL_BIT: u64 = 1u64 << (Self::BITS - 2);
    /// Largest group count one fill word can hold
    const MAX_FILL: u64 = (1u64 << (Self::BITS - 2)) - 1;

    fn to_u64(self) -> u64;
    fn from_u64(value: u64) -> Self;
}

impl Word for u32 {
    const BITS: u32 = 32;

    #[inline]
    fn to_u64(self) -> u64 {
        self as u64
    }

    #[inline]
    fn from_u64(value: u64) -> Self {
        value as u32
    }
}

impl Word for u64 {
    const BITS: u32 = 64;

    #[inline]
    fn to_u64(self) -> u64 {
        self
    }

    #[inline]
    fn from_u64(value: u64) -> Self {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_layout() {
        assert_eq!(<u32 as Word>::GROUP, 31);
        assert_eq!(<u32 as Word>::LITERAL_MASK, 0x7fff_ffff);
        assert_eq!(<u32 as Word>::FILL_FLAG, 0x8000_0000);
        assert_eq!(<u32 as Word>::FILL_BIT, 0x4000_0000);
        assert_eq!(<u32 as Word>::MAX_FILL, 0x3fff_ffff);
        assert_eq!(<u64 as Word>::GROUP, 63);
        assert_eq!(<u64 as Word>::LITERAL_MASK, u64::MAX >> 1);
    }
}
