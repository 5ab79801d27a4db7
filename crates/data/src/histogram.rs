//! Value-frequency histogram: a `value -> frequency` mapping plus a
//! running sample count, supporting average/min/max/percentile derivation.

use perf_codec::{fixed, varint};
use perf_core::{Error, Result};
use std::collections::BTreeMap;

/// A histogram over observed `i64` sample values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    /// Value -> frequency. A `BTreeMap` keeps values ascending for
    /// percentile/min/max without a separate sort step.
    freq: BTreeMap<i64, u32>,
    total: u64,
}

impl Histogram {
    /// A fresh, empty histogram.
    pub fn new() -> Self {
        Histogram::default()
    }

    /// Total number of samples observed.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct values observed.
    pub fn distinct(&self) -> usize {
        self.freq.len()
    }

    /// Record one observation of `value`.
    pub fn add_value(&mut self, value: i64) {
        *self.freq.entry(value).or_insert(0) += 1;
        self.total += 1;
    }

    /// Reset to empty.
    pub fn clear(&mut self) {
        self.freq.clear();
        self.total = 0;
    }

    /// Merge another histogram's frequencies into this one (dictionary
    /// union, summing frequencies).
    pub fn merge_from(&mut self, other: &Histogram) {
        for (&value, &count) in other.freq.iter() {
            *self.freq.entry(value).or_insert(0) += count;
        }
        self.total += other.total;
    }

    /// Merge a raw slab of sample values (the buffered-value-slab overload of
    /// `mergeFrom`).
    pub fn merge_from_raw(&mut self, values: &[i64]) {
        for &v in values {
            self.add_value(v);
        }
    }

    /// `floor(sum(v * f) / sum(f))` using 64-bit (widened to 128-bit for
    /// the product) accumulation.
    pub fn average(&self) -> Option<i64> {
        if self.total == 0 {
            return None;
        }
        let sum: i128 = self.freq.iter().map(|(&v, &f)| v as i128 * f as i128).sum();
        Some((sum / self.total as i128) as i64)
    }

    /// Smallest observed value.
    pub fn min(&self) -> Option<i64> {
        self.freq.keys().next().copied()
    }

    /// Largest observed value.
    pub fn max(&self) -> Option<i64> {
        self.freq.keys().next_back().copied()
    }

    /// The first value whose cumulative frequency (walked ascending) is at least
    /// `ceil(p/100 * total)`, with `p == 0` special-cased to target the first
    /// sample rather than requiring a zero cumulative count (see rounding
    /// decision). `p` must be in `[0, 100]`.
    pub fn percentile(&self, p: u32) -> Result<i64> {
        if p > 100 {
            return Err(Error::InvalidArgument(format!("percentile {p} out of range [0, 100]")));
        }
        if self.total == 0 {
            return Err(Error::InvalidArgument("percentile of an empty histogram".into(),));
        }
        let target: u64 = if p == 0 {
            1
        } else {
            ((p as f64 / 100.0) * self.total as f64).ceil() as u64
        };
        let mut cumulative: u64 = 0;
        for (&value, &count) in self.freq.iter() {
            cumulative += count as u64;
            if cumulative >= target {
                return Ok(value);
            }
        }
        // Defensive fallback; cumulative should always reach `total >= target`.
        Ok(self.max().expect("non-empty histogram has a max"))
    }

    /// Serialize as a 32-bit length prefix (high bit =
    /// frequency-compressed) followed by the chosen body encoding.
    /// Compressed (value, count) pairs are chosen when `2 * distinct <
    /// total`; otherwise bare value varints are repeated by frequency.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        let compressed = 2 * self.distinct() as u64 < self.total;
        let mut body = Vec::new();
        if compressed {
            for (&value, &count) in self.freq.iter() {
                varint::write_i64(&mut body, value);
                varint::write_u32(&mut body, count);
            }
        } else {
            for (&value, &count) in self.freq.iter() {
                for _ in 0..count {
                    varint::write_i64(&mut body, value);
                }
            }
        }
        let flag = if compressed { 1u32 << 31 } else { 0 };
        let len_with_flag = flag | (body.len() as u32 & 0x7fff_ffff);
        fixed::write_u32(out, len_with_flag);
        out.extend_from_slice(&body);
    }

    /// Deserialize a histogram written by [`Histogram::serialize`].
    pub fn deserialize(cursor: &mut &[u8]) -> Result<Self> {
        let len_with_flag = fixed::read_u32(cursor).map_err(|e| Error::CorruptData(format!("reading histogram length: {e}")))?;
        let compressed = len_with_flag & (1 << 31) != 0;
        let body_len = (len_with_flag & 0x7fff_ffff) as usize;
        if cursor.len() < body_len {
            return Err(Error::CorruptData(format!("histogram body truncated: need {body_len}, have {}",
                        cursor.len())));
        }
        let (body, rest) = cursor.split_at(body_len);
        *cursor = rest;
        let mut body_cursor = body;

        let mut histogram = Histogram::new();
        if compressed {
            while !body_cursor.is_empty() {
                let value = varint::read_i64(&mut body_cursor).map_err(|e| Error::CorruptData(format!("histogram value: {e}")))?;
                let count = varint::read_u32(&mut body_cursor).map_err(|e| Error::CorruptData(format!("histogram count: {e}")))?;
                *histogram.freq.entry(value).or_insert(0) += count;
                histogram.total += count as u64;
            }
        } else {
            while !body_cursor.is_empty() {
                let value = varint::read_i64(&mut body_cursor).map_err(|e| Error::CorruptData(format!("histogram value: {e}")))?;
                histogram.add_value(value);
            }
        }
        Ok(histogram)
    }

    /// Deserialize the previous protocol version's supplemental entry
    /// body: `count` raw fixed-length `i64` samples, no varint and no
    /// frequency compression.
    pub fn deserialize_legacy(cursor: &mut &[u8], count: u32) -> Result<Self> {
        let mut histogram = Histogram::new();
        for _ in 0..count {
            let value = fixed::read_i64(cursor).map_err(|e| Error::CorruptData(format!("legacy histogram sample: {e}")))?;
            histogram.add_value(value);
        }
        Ok(histogram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_1_to_100() -> Histogram {
        let mut h = Histogram::new();
        for v in 1..=100 {
            h.add_value(v);
        }
        h
    }

    #[test]
    fn percentile_scenarios_from_spec() {
        let h = filled_1_to_100();
        assert_eq!(h.percentile(95).unwrap(), 95);
        assert_eq!(h.percentile(50).unwrap(), 50);
        assert_eq!(h.percentile(0).unwrap(), 1);
        assert_eq!(h.percentile(100).unwrap(), 100);
    }

    #[test]
    fn percentile_out_of_range_is_invalid_argument() {
        let h = filled_1_to_100();
        assert!(h.percentile(101).is_err());
    }

    #[test]
    fn average_min_max() {
        let h = filled_1_to_100();
        assert_eq!(h.average().unwrap(), 50); // floor(5050/100) = 50.5 -> 50
        assert_eq!(h.min().unwrap(), 1);
        assert_eq!(h.max().unwrap(), 100);
    }

    #[test]
    fn derived_values_within_observed_range() {
        let h = filled_1_to_100();
        let (min, max) = (h.min().unwrap(), h.max().unwrap());
        assert!(h.average().unwrap() >= min && h.average().unwrap() <= max);
        for p in [0, 25, 50, 75, 100] {
            let v = h.percentile(p).unwrap();
            assert!(v >= min && v <= max);
        }
    }

    #[test]
    fn merge_from_sums_frequencies() {
        let mut a = Histogram::new();
        a.add_value(1);
        a.add_value(1);
        let mut b = Histogram::new();
        b.add_value(1);
        b.add_value(2);
        a.merge_from(&b);
        assert_eq!(a.total, 4);
        assert_eq!(a.max().unwrap(), 2);
    }

    #[test]
    fn merge_from_raw_slab() {
        let mut a = Histogram::new();
        a.merge_from_raw(&[1, 2, 2, 3]);
        assert_eq!(a.total, 4);
        assert_eq!(a.distinct(), 3);
    }

    #[test]
    fn sum_of_frequencies_equals_total() {
        let h = filled_1_to_100();
        let sum: u64 = h.freq.values().map(|&c| c as u64).sum();
        assert_eq!(sum, h.total);
    }

    #[test]
    fn serialize_round_trip_compressed() {
        // distinct=1, total=1000 -> compressed (2*1 < 1000)
        let mut h = Histogram::new();
        for _ in 0..1000 {
            h.add_value(42);
        }
        let mut buf = Vec::new();
        h.serialize(&mut buf);
        let mut cursor = buf.as_slice();
        let loaded = Histogram::deserialize(&mut cursor).unwrap();
        assert_eq!(h, loaded);
    }

    #[test]
    fn serialize_round_trip_uncompressed() {
        // distinct == total -> not compressed (2*distinct > total)
        let h = filled_1_to_100();
        let mut buf = Vec::new();
        h.serialize(&mut buf);
        let mut cursor = buf.as_slice();
        let loaded = Histogram::deserialize(&mut cursor).unwrap();
        assert_eq!(h, loaded);
    }

    #[test]
    fn serialize_round_trip_empty() {
        let h = Histogram::new();
        let mut buf = Vec::new();
        h.serialize(&mut buf);
        let mut cursor = buf.as_slice();
        let loaded = Histogram::deserialize(&mut cursor).unwrap();
        assert_eq!(h, loaded);
    }
}
