//! Fixed-length tuple of dimension-value indices

use crate::limits::WILDCARD;
use crate::{Error, Result};
use smallvec::SmallVec;
use std::cmp::Ordering;

/// Most counters carry a handful of dimensions; inline storage for up to
/// four avoids a heap allocation per key in the common case.
type Indices = SmallVec<[u32; 4]>;

/// A tuple of dimension-value indices identifying one point in the
/// dimensional cube. Ordered lexicographically over the index tuple.
/// Cheap to clone: backed by inline storage for small arities.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    indices: Indices,
}

impl Key {
    /// Build a key from an explicit index tuple.
    pub fn from_indices(indices: impl IntoIterator<Item = u32>) -> Self {
        Key {
            indices: indices.into_iter().collect(),
        }
    }

    /// A key of `arity` wildcard slots.
    pub fn wildcard(arity: usize) -> Self {
        Key {
            indices: std::iter::repeat(WILDCARD).take(arity).collect(),
        }
    }

    /// Number of dimension slots.
    pub fn arity(&self) -> usize {
        self.indices.len()
    }

    /// The index at `slot`.
    pub fn get(&self, slot: usize) -> u32 {
        self.indices[slot]
    }

    /// Set the index at `slot`.
    pub fn set(&mut self, slot: usize, value: u32) {
        self.indices[slot] = value;
    }

    /// Borrow the raw index slice.
    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }

    /// True if every non-wildcard slot of `self` equals the corresponding slot
    /// of `other`. `self` is typically the filter key and `other` a row's
    /// stored key, but the relation is symmetric in the non-wildcard
    /// positions.
    pub fn matches(&self, other: &Key) -> bool {
        debug_assert_eq!(self.arity(), other.arity());
        self.indices.iter().zip(other.indices.iter()).all(|(&a, &b)| a == WILDCARD || a == b)
    }

    /// Serialize: each index as a fixed 32-bit little-endian value.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        use perf_codec::fixed;
        for &idx in self.indices.iter() {
            fixed::write_u32(out, idx);
        }
    }

    /// Deserialize a key of the given `arity`.
    pub fn deserialize(cursor: &mut &[u8], arity: usize) -> Result<Self> {
        use perf_codec::fixed;
        let mut indices = Indices::with_capacity(arity);
        for _ in 0..arity {
            let idx = fixed::read_u32(cursor).map_err(|e| Error::CorruptData(format!("reading key index: {e}")))?;
            indices.push(idx);
        }
        Ok(Key { indices })
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.indices.cmp(&other.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexicographic_ordering() {
        let a = Key::from_indices([1, 2]);
        let b = Key::from_indices([1, 3]);
        let c = Key::from_indices([2, 0]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn wildcard_matches_anything_in_that_slot() {
        let filter = Key::from_indices([WILDCARD, 5]);
        assert!(filter.matches(&Key::from_indices([1, 5])));
        assert!(filter.matches(&Key::from_indices([2, 5])));
        assert!(!filter.matches(&Key::from_indices([2, 6])));
    }

    #[test]
    fn exact_match_requires_all_slots_equal() {
        let a = Key::from_indices([1, 2, 3]);
        let b = Key::from_indices([1, 2, 3]);
        let c = Key::from_indices([1, 2, 4]);
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn serialize_round_trip() {
        let key = Key::from_indices([10, WILDCARD, 42]);
        let mut buf = Vec::new();
        key.serialize(&mut buf);
        let mut cursor = buf.as_slice();
        let loaded = Key::deserialize(&mut cursor, 3).unwrap();
        assert_eq!(key, loaded);
    }
}
