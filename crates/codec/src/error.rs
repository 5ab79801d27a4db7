//! Error type for the codec crate.
//!
//! Kept separate from the engine-wide error type so this crate has no
//! dependency back on `perf-core`; callers convert with `.into()` or
//! `map_err`.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Codec-level failure: any truncated read, or a CRC mismatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes remained than the encoding required.
    #[error("truncated read: expected at least {needed} bytes, found {available}")]
    Truncated {
        /// Bytes required to complete the read.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// A varint exceeded the maximum number of continuation bytes for its
    /// width (corrupt stream, not a legitimate encoding).
    #[error("varint overflow: more than {max_bytes} continuation bytes")]
    VarintOverflow {
        /// Maximum bytes allowed for this width.
        max_bytes: usize,
    },

    /// A decoded varint's value does not fit in the narrower integer width
    /// the caller requested (e.g. a 40-bit value read as `u32`).
    #[error("value {value} does not fit in {width}-bit width")]
    WidthExceeded {
        /// Decoded 64-bit value.
        value: u64,
        /// Requested bit width.
        width: u32,
    },

    /// A CRC32 checksum did not match the payload.
    #[error("CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// CRC stored in the frame.
        expected: u32,
        /// CRC computed over the payload actually read.
        computed: u32,
    },

    /// Deflate or LZ4 decompression failed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// A string's UTF-16 code units did not decode to valid UTF-16.
    #[error("invalid UTF-16 string data")]
    InvalidString,
}
