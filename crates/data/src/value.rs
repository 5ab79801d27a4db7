//! Tagged-variant internal value: hit-count or histogram. This
//! representation prefers a tagged variant over a polymorphic trait object
//! for this seam.

use crate::histogram::Histogram;
use crate::hit_count::HitCount;
use perf_core::{Error, Result};

/// A raw update to merge into an [`InternalValue`]: either a single scalar
/// increment (hit-count) or a slab of freshly-observed samples
/// (histogram), `mergeFrom` overloads.
#[derive(Debug, Clone)]
pub enum RawUpdate {
    /// A single signed increment.
    Scalar(i64),
    /// A batch of observed sample values.
    Samples(Vec<i64>),
}

/// The requested query derivation. `Normal` returns the internal value
/// unchanged; the others derive a scalar from a histogram and are silently
/// downgraded to `Normal` by the query engine when run against a hit-count,
/// rather than failing with `UnsupportedQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Return the raw internal value.
    Normal,
    /// Percentile in `[0, 100]`.
    Percentile(u32),
    /// Floor of the mean.
    Average,
    /// Minimum observed value.
    Min,
    /// Maximum observed value.
    Max,
}

/// The result of applying a [`QueryKind`] to an [`InternalValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum Derived {
    /// A hit-count's running total.
    HitCount(i64),
    /// A histogram, unmodified.
    Histogram(Histogram),
    /// A derived scalar (percentile, average, min, or max).
    Scalar(i64),
}

/// One of the two internal value kinds a counter may hold.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalValue {
    /// Scalar sum-of-increments value.
    HitCount(HitCount),
    /// Value-frequency histogram.
    Histogram(Histogram),
}

impl InternalValue {
    /// A fresh, zeroed hit-count value.
    pub fn new_hit_count() -> Self {
        InternalValue::HitCount(HitCount::new())
    }

    /// A fresh, empty histogram value.
    pub fn new_histogram() -> Self {
        InternalValue::Histogram(Histogram::new())
    }

    /// Reset to the empty/zero state.
    pub fn clear(&mut self) {
        match self {
            InternalValue::HitCount(h) => h.clear(),
            InternalValue::Histogram(h) => h.clear(),
        }
    }

    /// Merge another value of the *same* kind into this one.
    pub fn merge_from(&mut self, other: &InternalValue) -> Result<()> {
        match (self, other) {
            (InternalValue::HitCount(a), InternalValue::HitCount(b)) => {
                a.merge_from(b);
                Ok(())
            }
            (InternalValue::Histogram(a), InternalValue::Histogram(b)) => {
                a.merge_from(b);
                Ok(())
            }
            _ => Err(Error::InvalidArgument("cannot merge internal values of different kinds".into(),)),
        }
    }

    /// Merge a raw update produced on the ingest path.
    pub fn merge_from_raw(&mut self, raw: RawUpdate) -> Result<()> {
        match (self, raw) {
            (InternalValue::HitCount(h), RawUpdate::Scalar(v)) => {
                h.merge_from_raw(v);
                Ok(())
            }
            (InternalValue::Histogram(h), RawUpdate::Samples(values)) => {
                h.merge_from_raw(&values);
                Ok(())
            }
            _ => Err(Error::InvalidArgument("raw update kind does not match internal value kind".into(),)),
        }
    }

    /// Serialize this value per its kind-specific encoding
    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            InternalValue::HitCount(h) => h.serialize(out),
            InternalValue::Histogram(h) => h.serialize(out),
        }
    }

    /// True if this value kind can satisfy `kind` directly (only
    /// histograms support anything beyond `Normal`).
    pub fn supports(&self, kind: QueryKind) -> bool {
        matches!(
            (self, kind),
            (_, QueryKind::Normal) | (InternalValue::Histogram(_), _))
    }

    /// Derive a query result. Callers should check [`InternalValue::supports`]
    /// first if they want to detect a downgrade; this never fails -- a
    /// histogram-only `kind` against a hit-count is silently treated as
    /// `Normal`.
    pub fn derive(&self, kind: QueryKind) -> Result<Derived> {
        match (self, kind) {
            (InternalValue::HitCount(h), _) => Ok(Derived::HitCount(h.value())),
            (InternalValue::Histogram(h), QueryKind::Normal) => {
                Ok(Derived::Histogram(h.clone()))
            }
            (InternalValue::Histogram(h), QueryKind::Percentile(p)) => {
                Ok(Derived::Scalar(h.percentile(p)?))
            }
            (InternalValue::Histogram(h), QueryKind::Average) => Ok(Derived::Scalar(
                    h.average().ok_or_else(|| Error::InvalidArgument("average of empty histogram".into()))?,)),
            (InternalValue::Histogram(h), QueryKind::Min) => Ok(Derived::Scalar(
                    h.min().ok_or_else(|| Error::InvalidArgument("min of empty histogram".into()))?,)),
            (InternalValue::Histogram(h), QueryKind::Max) => Ok(Derived::Scalar(
                    h.max().ok_or_else(|| Error::InvalidArgument("max of empty histogram".into()))?,)),
        }
    }
}
