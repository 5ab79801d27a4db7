//! Variable-length integer encoding. Seven bits of payload per output
//! byte, continuation bit (`0x80`) set on every non-final byte, least-
//! significant group first. The signed variants reinterpret the value's raw
//! two's-complement bits as unsigned before grouping -- there is no zig-zag
//! transform, so small negative numbers are *not* cheap to encode. This
//! matches callers that only ever varint-encode non-negative quantities
//! (counts, frequencies) plus the handful of signed fields (timestamps,
//! histogram sample values) where the source format does the same.

use crate::error::{CodecError, Result};

/// Maximum bytes a 64-bit varint can occupy (`ceil(64 / 7)`).
pub const MAX_VARINT_BYTES_64: usize = 10;
/// Maximum bytes a 32-bit varint can occupy (`ceil(32 / 7)`).
pub const MAX_VARINT_BYTES_32: usize = 5;

/// Write a raw 64-bit unsigned varint.
pub fn write_u64(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        } else {
            out.push(byte | 0x80);
        }
    }
}

/// Read a raw 64-bit unsigned varint, advancing `cursor`.
pub fn read_u64(cursor: &mut &[u8]) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    for i in 0..MAX_VARINT_BYTES_64 {
        let byte = *cursor.first().ok_or(CodecError::Truncated {
                needed: 1,
                available: 0,
        })?;
        *cursor = &cursor[1..];
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if i == MAX_VARINT_BYTES_64 - 1 {
            return Err(CodecError::VarintOverflow {
                    max_bytes: MAX_VARINT_BYTES_64,
            });
        }
    }
    unreachable!()
}

/// Write a `u32` as a varint.
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    write_u64(out, value as u64);
}

/// Read a varint and require it fit in `u32`.
pub fn read_u32(cursor: &mut &[u8]) -> Result<u32> {
    let value = read_u64(cursor)?;
    u32::try_from(value).map_err(|_| CodecError::WidthExceeded { value, width: 32 })
}

/// Write an `i64` as a varint over its raw two's-complement bit pattern
/// (no zig-zag).
pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    write_u64(out, value as u64);
}

/// Read an `i64` varint written by [`write_i64`].
pub fn read_i64(cursor: &mut &[u8]) -> Result<i64> {
    Ok(read_u64(cursor)? as i64)
}

/// Write an `i32` as a varint over its raw bit pattern.
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    write_u32(out, value as u32);
}

/// Read an `i32` varint written by [`write_i32`].
pub fn read_i32(cursor: &mut &[u8]) -> Result<i32> {
    Ok(read_u32(cursor)? as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_round_trips_to_one_byte() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 0);
        assert_eq!(buf, vec![0]);
        let mut cursor = buf.as_slice();
        assert_eq!(read_u64(&mut cursor).unwrap(), 0);
        assert!(cursor.is_empty());
    }

    #[test]
    fn multi_byte_continuation_bits() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 300); // 0b1_0010_1100 -> two groups
        assert_eq!(buf.len(), 2);
        assert_eq!(buf[0] & 0x80, 0x80);
        assert_eq!(buf[1] & 0x80, 0);
    }

    #[test]
    fn truncated_read_fails() {
        let buf = vec![0x80, 0x80];
        let mut cursor = buf.as_slice();
        assert!(matches!(read_u64(&mut cursor), Err(CodecError::Truncated {.. })));
    }

    #[test]
    fn width_exceeded_on_narrow_read() {
        let mut buf = Vec::new();
        write_u64(&mut buf, u32::MAX as u64 + 1);
        let mut cursor = buf.as_slice();
        assert!(matches!(
                read_u32(&mut cursor),
                Err(CodecError::WidthExceeded {.. })));
    }

    #[test]
    fn signed_negative_values_round_trip() {
        let mut buf = Vec::new();
        write_i64(&mut buf, -1);
        // Raw bit pattern of -1i64 is all-ones, which needs the full 10 bytes.
        assert_eq!(buf.len(), MAX_VARINT_BYTES_64);
        let mut cursor = buf.as_slice();
        assert_eq!(read_i64(&mut cursor).unwrap(), -1);
    }

    proptest! {
        #[test]
        fn u64_round_trip(v: u64) {
            let mut buf = Vec::new();
            write_u64(&mut buf, v);
            let mut cursor = buf.as_slice();
            prop_assert_eq!(read_u64(&mut cursor).unwrap(), v);
            prop_assert!(cursor.is_empty());
        }

        #[test]
        fn i64_round_trip(v: i64) {
            let mut buf = Vec::new();
            write_i64(&mut buf, v);
            let mut cursor = buf.as_slice();
            prop_assert_eq!(read_i64(&mut cursor).unwrap(), v);
        }

        #[test]
        fn u32_round_trip(v: u32) {
            let mut buf = Vec::new();
            write_u32(&mut buf, v);
            let mut cursor = buf.as_slice();
            prop_assert_eq!(read_u32(&mut cursor).unwrap(), v);
        }
    }
}
