//! Variable-length integer encoding, fixed-length encoding, CRC32, and
//! deflate/LZ4 block framing for the PerfCounters on-disk format.

#![warn(missing_docs)]

pub mod compress;
pub mod crc;
pub mod error;
pub mod fixed;
pub mod frame;
pub mod varint;

pub use crc::crc32;
pub use error::{CodecError, Result};
pub use frame::{read_frame, read_legacy_lz4_frame, write_frame, write_legacy_lz4_frame, CompressionKind};
