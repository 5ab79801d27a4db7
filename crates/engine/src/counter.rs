//! Counter handles: `HitCounter`/`HistogramCounter`, the public-facing
//! wrappers over a `DataSet`, plus `CounterId` and histogram rounding.

use crate::data_set::DataSet;
use crate::query::{QueryEngine, QueryParams, Sample};
use perf_core::{validate_counter_name, Error, Result, Timestamp};
use perf_data::{InternalValue, RawUpdate};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A validated counter path name: starts with `/`, no `..` segments, no
/// reserved path characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterId(String);

impl CounterId {
    /// Validate and wrap `name`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_counter_name(&name).map_err(Error::InvalidArgument)?;
        Ok(CounterId(name))
    }

    /// The underlying path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a raw sample is rounded before being folded into a histogram: an
/// optional rounding mode (`None`, `SignificantDigits`, `ByteCount`) plus a
/// factor. The exact rounding functions aren't specified by name; the ones
/// below are simple, monotonic, and documented in `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    /// No rounding; the sample is recorded exactly.
    None,
    /// Round to `factor` significant decimal digits.
    SignificantDigits,
    /// Round to the nearest multiple of `factor` (typically a byte
    /// granularity, e.g. 1024 to bucket by kilobyte).
    ByteCount,
}

/// Round `value` per `mode`/`factor` (`factor` is unused for
    /// [`RoundingMode::None`]).
pub fn round_sample(value: i64, mode: RoundingMode, factor: i64) -> Result<i64> {
    if factor < 0 {
        return Err(Error::InvalidArgument("rounding factor must not be negative".into()));
    }
    Ok(match mode {
        RoundingMode::None => value,
        RoundingMode::SignificantDigits => round_significant_digits(value, factor.max(1) as u32),
        RoundingMode::ByteCount => round_to_multiple(value, factor.max(1)),
    })
}

fn round_significant_digits(value: i64, digits: u32) -> i64 {
    if value == 0 {
        return 0;
    }
    let magnitude = (value.unsigned_abs() as f64).log10().floor() as i32 + 1;
    let drop = magnitude - digits as i32;
    if drop <= 0 {
        return value;
    }
    let factor = 10i64.pow(drop as u32);
    round_to_multiple(value, factor)
}

fn round_to_multiple(value: i64, factor: i64) -> i64 {
    if factor <= 1 {
        return value;
    }
    let half = factor / 2;
    let abs = value.unsigned_abs();
    let rounded = ((abs + half as u64) / factor as u64) * factor as u64;
    if value < 0 {
        -(rounded as i64)
    } else {
        rounded as i64
    }
}

/// A hit-count counter: a monotonic (by convention) running total per
/// dimension point, split across time buckets
pub struct HitCounter {
    id: CounterId,
    data_set: Arc<DataSet>,
}

impl HitCounter {
    pub(crate) fn new(id: CounterId, data_set: Arc<DataSet>) -> Self {
        HitCounter { id, data_set }
    }

    /// This counter's validated name.
    pub fn id(&self) -> &CounterId {
        &self.id
    }

    /// Add `amount` at the dimension point named by `dims`, timestamped
    /// `ts`.
    pub fn increment(&self, amount: i64, dims: &HashMap<String, String>, ts: Timestamp) -> Result<()> {
        let (key, _) = self.data_set.dimension_set().create_key(dims);
        let mut value = InternalValue::new_hit_count();
        value.merge_from_raw(RawUpdate::Scalar(amount))?;
        self.data_set.add_value(key, value, ts)
    }

    /// Run a query against this counter's data
    pub fn query(&self, params: &HashMap<String, String>) -> Result<Vec<Sample>> {
        let parsed = QueryParams::parse(params)?;
        QueryEngine::query(&self.data_set, self.id.as_str(), &parsed)
    }

    /// Serialize every bucket in `[start, end)` to `out`.
    pub fn serialize(&self, start: Timestamp, end: Timestamp, out: &mut Vec<u8>) -> Result<bool> {
        self.data_set.serialize(start, end, out)?;
        Ok(true)
    }
}

/// A histogram counter: a value-frequency distribution per dimension point,
/// split across time buckets
pub struct HistogramCounter {
    id: CounterId,
    data_set: Arc<DataSet>,
    rounding: RoundingMode,
    factor: i64,
}

impl HistogramCounter {
    pub(crate) fn new(
        id: CounterId,
        data_set: Arc<DataSet>,
        rounding: RoundingMode,
        factor: i64,) -> Self {
        HistogramCounter { id, data_set, rounding, factor }
    }

    /// This counter's validated name.
    pub fn id(&self) -> &CounterId {
        &self.id
    }

    /// Record one observed sample at the dimension point named by `dims`,
    /// timestamped `ts`, after applying this counter's rounding mode.
    pub fn add_value(&self, v: i64, dims: &HashMap<String, String>, ts: Timestamp) -> Result<()> {
        let rounded = round_sample(v, self.rounding, self.factor)?;
        let (key, _) = self.data_set.dimension_set().create_key(dims);
        let mut value = InternalValue::new_histogram();
        value.merge_from_raw(RawUpdate::Samples(vec![rounded]))?;
        self.data_set.add_value(key, value, ts)
    }

    /// Run a query against this counter's data
    pub fn query(&self, params: &HashMap<String, String>) -> Result<Vec<Sample>> {
        let parsed = QueryParams::parse(params)?;
        QueryEngine::query(&self.data_set, self.id.as_str(), &parsed)
    }

    /// Serialize every bucket in `[start, end)` to `out`.
    pub fn serialize(&self, start: Timestamp, end: Timestamp, out: &mut Vec<u8>) -> Result<bool> {
        self.data_set.serialize(start, end, out)?;
        Ok(true)
    }
}
