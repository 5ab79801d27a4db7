//! Block compression backends used by the persisted-bucket frame format.
//! The current protocol version compresses header frames with deflate; the
//! previous protocol version (kept for read compatibility) used an LZ4
//! block variant.

use crate::error::{CodecError, Result};
use std::io::{Read, Write};

/// Deflate-compress `data`.
pub fn deflate_compress(data: &[u8]) -> Vec<u8> {
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    // Writing to an in-memory Vec cannot fail.
    encoder.write_all(data).expect("in-memory deflate write");
    encoder.finish().expect("in-memory deflate finish")
}

/// Inflate a deflate-compressed block previously produced by
/// [`deflate_compress`]. `uncompressed_len` sizes the output buffer; the
/// decoder still self-terminates on the deflate end marker regardless.
pub fn deflate_decompress(data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
    use flate2::read::DeflateDecoder;
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::with_capacity(uncompressed_len);
    decoder.read_to_end(&mut out).map_err(|e| CodecError::Decompression(e.to_string()))?;
    Ok(out)
}

/// LZ4-block-compress `data` (previous protocol version only).
pub fn lz4_compress(data: &[u8]) -> Vec<u8> {
    lz4::block::compress(data, None, false).expect("in-memory lz4 compress")
}

/// Decompress an LZ4 block previously produced by [`lz4_compress`].
pub fn lz4_decompress(data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
    lz4::block::decompress(data, Some(uncompressed_len as i32)).map_err(|e| CodecError::Decompression(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflate_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(10);
        let compressed = deflate_compress(&data);
        let decompressed = deflate_decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn lz4_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(10);
        let compressed = lz4_compress(&data);
        let decompressed = lz4_decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }
}
