//! Error types for the PerfCounters engine.
//!
//! All fallible operations in the crate return [`Result<T>`], a thin alias
//! over [`Error`]. Errors fall into a handful of categories: invalid input,
//! writes against a sealed bucket, unknown dimension lookups, corrupt
//! persisted data, unsupported query/value-kind combinations, and shutdown.

use std::io;
use thiserror::Error;

/// Result type alias for PerfCounters operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the PerfCounters engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input: bad counter names, negative rounding, empty source
    /// lists, or a query window with `start >= end` when both were
    /// user-supplied.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Write or update attempted against an already-sealed bucket.
    #[error("bucket is sealed")]
    Sealed,

    /// A dimension name was referenced that is not part of the set.
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    /// Truncated stream, CRC mismatch, duplicate dimension value, unknown
    /// type code, or unsupported protocol version.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The requested query type cannot be satisfied by the counter's value
    /// kind (e.g. percentile on a hit-count counter). Callers that want to
    /// observe this should check first; the query engine itself downgrades
    /// silently to `Normal` rather than returning this to the caller.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Operation attempted after the engine signaled shutdown.
    #[error("engine has shut down")]
    Shutdown,

    /// Underlying I/O failure (bucket file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for errors that ingest call sites should swallow and record as
    /// an event rather than propagate. Currently just `Sealed`:
    /// age-rejection doesn't produce an `Error` at all.
    pub fn is_ingest_swallowable(&self) -> bool {
        matches!(self, Error::Sealed)
    }
}
