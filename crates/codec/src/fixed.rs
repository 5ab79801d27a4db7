//! Fixed-length little-endian encoding, and length-prefixed UTF-16 strings.

use crate::error::{CodecError, Result};
use crate::varint;
use byteorder::{ByteOrder, LittleEndian};

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

/// Write a `u16` little-endian.
pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    let mut buf = [0u8; 2];
    LittleEndian::write_u16(&mut buf, value);
    out.extend_from_slice(&buf);
}

/// Read a `u16` little-endian.
pub fn read_u16(cursor: &mut &[u8]) -> Result<u16> {
    Ok(LittleEndian::read_u16(take(cursor, 2)?))
}

/// Write a `u32` little-endian.
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, value);
    out.extend_from_slice(&buf);
}

/// Read a `u32` little-endian.
pub fn read_u32(cursor: &mut &[u8]) -> Result<u32> {
    Ok(LittleEndian::read_u32(take(cursor, 4)?))
}

/// Write a `u64` little-endian.
pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, value);
    out.extend_from_slice(&buf);
}

/// Read a `u64` little-endian.
pub fn read_u64(cursor: &mut &[u8]) -> Result<u64> {
    Ok(LittleEndian::read_u64(take(cursor, 8)?))
}

/// Write an `i64` little-endian.
pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    write_u64(out, value as u64);
}

/// Read an `i64` little-endian.
pub fn read_i64(cursor: &mut &[u8]) -> Result<i64> {
    Ok(read_u64(cursor)? as i64)
}

/// Write a string: varint code-unit count, then each UTF-16 code unit as a
/// fixed `u16`.
pub fn write_string(out: &mut Vec<u8>, value: &str) {
    let units: Vec<u16> = value.encode_utf16().collect();
    varint::write_u32(out, units.len() as u32);
    for unit in units {
        write_u16(out, unit);
    }
}

/// Read a string written by [`write_string`].
pub fn read_string(cursor: &mut &[u8]) -> Result<String> {
    let count = varint::read_u32(cursor)? as usize;
    let mut units = Vec::with_capacity(count);
    for _ in 0..count {
        units.push(read_u16(cursor)?);
    }
    String::from_utf16(&units).map_err(|_| CodecError::InvalidString)
}
