//! Length-and-CRC-framed block layout.
//!
//! ```text
//! encoded length (i64)
//! top bit = compressed flag
//! next 7 bits = compression kind
//! low 56 bits = on-disk payload length
//! uncompressed length (u64) -- present only if compressed
//! CRC32 (u32) -- over the *uncompressed* bytes
//! payload -- compressed (per `kind`) or raw
//! ```

use crate::compress::{deflate_compress, deflate_decompress, lz4_compress, lz4_decompress};
use crate::crc::crc32;
use crate::error::{CodecError, Result};
use crate::fixed;

const COMPRESSED_FLAG: u64 = 1 << 63;
const KIND_SHIFT: u32 = 56;
const KIND_MASK: u64 = 0x7f;
const LENGTH_MASK: u64 = (1u64 << 56) - 1;

/// Compression algorithm selector for a frame's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    /// Payload stored raw (used whenever the frame is not compressed).
    None,
    /// Deflate (current protocol version).
    Deflate,
    /// LZ4 block format (previous protocol version).
    Lz4,
}

impl CompressionKind {
    fn to_bits(self) -> u64 {
        match self {
            CompressionKind::None => 0,
            CompressionKind::Deflate => 1,
            CompressionKind::Lz4 => 2,
        }
    }

    fn from_bits(bits: u64) -> Result<Self> {
        match bits {
            0 => Ok(CompressionKind::None),
            1 => Ok(CompressionKind::Deflate),
            2 => Ok(CompressionKind::Lz4),
            other => Err(CodecError::Decompression(format!("unknown compression kind {other}"))),
        }
    }
}

/// Write a frame. `kind` is ignored (written as `None`) when `compressed`
/// is false.
pub fn write_frame(out: &mut Vec<u8>, payload: &[u8], kind: CompressionKind) {
    match kind {
        CompressionKind::None => {
            let encoded_len = (payload.len() as u64) & LENGTH_MASK;
            fixed::write_i64(out, encoded_len as i64);
            fixed::write_u32(out, crc32(payload));
            out.extend_from_slice(payload);
        }
        CompressionKind::Deflate | CompressionKind::Lz4 => {
            let compressed = match kind {
                CompressionKind::Deflate => deflate_compress(payload),
                CompressionKind::Lz4 => lz4_compress(payload),
                CompressionKind::None => unreachable!(),
            };
            let encoded_len =
            COMPRESSED_FLAG | (kind.to_bits() << KIND_SHIFT) | ((compressed.len() as u64) & LENGTH_MASK);
            fixed::write_i64(out, encoded_len as i64);
            fixed::write_u64(out, payload.len() as u64);
            fixed::write_u32(out, crc32(payload));
            out.extend_from_slice(&compressed);
        }
    }
}

/// Read a frame written by [`write_frame`], returning its uncompressed
/// payload. Fails with [`CodecError::CrcMismatch`] if the checksum does not
/// match, or [`CodecError::Truncated`] on a short read.
pub fn read_frame(cursor: &mut &[u8]) -> Result<Vec<u8>> {
    let encoded_len = fixed::read_i64(cursor)? as u64;
    let compressed = encoded_len & COMPRESSED_FLAG != 0;
    let kind = CompressionKind::from_bits((encoded_len >> KIND_SHIFT) & KIND_MASK)?;
    let on_disk_len = (encoded_len & LENGTH_MASK) as usize;

    if compressed {
        let uncompressed_len = fixed::read_u64(cursor)? as usize;
        let expected_crc = fixed::read_u32(cursor)?;
        let payload = take(cursor, on_disk_len)?;
        let decompressed = match kind {
            CompressionKind::Deflate => deflate_decompress(payload, uncompressed_len)?,
            CompressionKind::Lz4 => lz4_decompress(payload, uncompressed_len)?,
            CompressionKind::None => {
                return Err(CodecError::Decompression("compressed flag set with kind=None".into(),))
            }
        };
        let computed = crc32(&decompressed);
        if computed != expected_crc {
            return Err(CodecError::CrcMismatch {
                    expected: expected_crc,
                    computed,
            });
        }
        Ok(decompressed)
    } else {
        let expected_crc = fixed::read_u32(cursor)?;
        let payload = take(cursor, on_disk_len)?.to_vec();
        let computed = crc32(&payload);
        if computed != expected_crc {
            return Err(CodecError::CrcMismatch {
                    expected: expected_crc,
                    computed,
            });
        }
        Ok(payload)
    }
}

/// Read a legacy frame: 32-bit length, then 32-bit CRC, then payload (no
/// compressed-flag bit-packing). Used for the previous protocol version's
/// header frame.
pub fn read_legacy_lz4_frame(cursor: &mut &[u8]) -> Result<Vec<u8>> {
    let on_disk_len = fixed::read_u32(cursor)? as usize;
    let uncompressed_len = fixed::read_u32(cursor)? as usize;
    let expected_crc = fixed::read_u32(cursor)?;
    let payload = take(cursor, on_disk_len)?;
    let decompressed = lz4_decompress(payload, uncompressed_len)?;
    let computed = crc32(&decompressed);
    if computed != expected_crc {
        return Err(CodecError::CrcMismatch {
                expected: expected_crc,
                computed,
        });
    }
    Ok(decompressed)
}

/// Write a legacy-format frame (used only by tests that exercise the
/// previous-version read path; production writers always use
/// [`write_frame`]).
pub fn write_legacy_lz4_frame(out: &mut Vec<u8>, payload: &[u8]) {
    let compressed = lz4_compress(payload);
    fixed::write_u32(out, compressed.len() as u32);
    fixed::write_u32(out, payload.len() as u32);
    fixed::write_u32(out, crc32(payload));
    out.extend_from_slice(&compressed);
}

fn take<'a>(cursor: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if cursor.len() < n {
        return Err(CodecError::Truncated {
                needed: n,
                available: cursor.len(),
        });
    }
    let (head, tail) = cursor.split_at(n);
    *cursor = tail;
    Ok(head)
}
