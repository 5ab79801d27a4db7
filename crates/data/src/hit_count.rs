//! Scalar hit-count value

use perf_codec::fixed;
use perf_core::{Error, Result};

/// A signed 64-bit running sum of increments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HitCount(i64);

impl HitCount {
    /// A fresh, zeroed hit count.
    pub fn new() -> Self {
        HitCount(0)
    }

    /// The current total.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Add `amount` to the running total.
    pub fn add(&mut self, amount: i64) {
        self.0 = self.0.wrapping_add(amount);
    }

    /// Reset to zero.
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Merge another hit count's total into this one.
    pub fn merge_from(&mut self, other: &HitCount) {
        self.add(other.0);
    }

    /// Merge a single raw increment (the scalar `mergeFrom` overload).
    pub fn merge_from_raw(&mut self, raw: i64) {
        self.add(raw);
    }

    /// Serialize as one fixed-length 64-bit integer.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        fixed::write_i64(out, self.0);
    }

    /// Deserialize a value written by [`HitCount::serialize`].
    pub fn deserialize(cursor: &mut &[u8]) -> Result<Self> {
        let value = fixed::read_i64(cursor).map_err(|e| Error::CorruptData(format!("reading hit count: {e}")))?;
        Ok(HitCount(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accumulates() {
        let mut h = HitCount::new();
        h.add(3);
        h.add(7);
        assert_eq!(h.value(), 10);
    }

    #[test]
    fn merge_from_another() {
        let mut a = HitCount::new();
        a.add(10);
        let mut b = HitCount::new();
        b.add(5);
        a.merge_from(&b);
        assert_eq!(a.value(), 15);
    }

    #[test]
    fn merge_from_raw_scalar() {
        let mut a = HitCount::new();
        a.merge_from_raw(42);
        assert_eq!(a.value(), 42);
    }

    #[test]
    fn clear_resets() {
        let mut a = HitCount::new();
        a.add(10);
        a.clear();
        assert_eq!(a.value(), 0);
    }

    #[test]
    fn serialize_round_trip() {
        let mut a = HitCount::new();
        a.add(-123);
        let mut buf = Vec::new();
        a.serialize(&mut buf);
        let mut cursor = buf.as_slice();
        let loaded = HitCount::deserialize(&mut cursor).unwrap();
        assert_eq!(a, loaded);
    }
}
