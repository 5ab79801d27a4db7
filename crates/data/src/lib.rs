//! Internal data kinds: hit-count and histogram

#![warn(missing_docs)]

pub mod histogram;
pub mod hit_count;
pub mod value;

pub use histogram::Histogram;
pub use hit_count::HitCount;
pub use value::{Derived, InternalValue, QueryKind, RawUpdate};
