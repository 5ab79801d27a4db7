//! Persisted bucket block framing, byte-exact: a versioned header (name,
//! time range, data type, sources, dimension set) and a data frame of `(Key,
//! InternalValue)` rows, plus file naming and cross-dimension-set key
//! translation

#![warn(missing_docs)]

pub mod header;
pub mod naming;
pub mod reader;
pub mod writer;

pub use header::{BucketHeader, DataTypeCode, SourceEntry};
pub use naming::{bucket_file_name, counter_directory_name, parse_bucket_file_name};
pub use reader::{read_bucket, DecodedBucket};
pub use writer::{write_bucket, PROTOCOL_VERSION_CURRENT, PROTOCOL_VERSION_PREVIOUS};

pub use perf_core::KeyConverter;
