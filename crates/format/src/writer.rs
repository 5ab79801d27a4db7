//! Bucket block writer. Always emits the current protocol version.

use crate::header::{BucketHeader, DataTypeCode, SourceEntry};
use perf_codec::{fixed, frame, CompressionKind};
use perf_core::{DimensionSet, Error, Key, Result};
use perf_data::InternalValue;

/// The protocol version this crate writes.
pub const PROTOCOL_VERSION_CURRENT: u16 = 2;
/// The previous protocol version this crate can still read.
pub const PROTOCOL_VERSION_PREVIOUS: u16 = 1;

/// Write one bucket block: version, back-patched block length, header
/// frame (deflate-compressed), data frame (raw).
pub fn write_bucket(
    out: &mut Vec<u8>,
    name: &str,
    start_time: i64,
    end_time: i64,
    sources: &[SourceEntry],
    dims: &DimensionSet,
    rows: &[(Key, InternalValue)],) -> Result<()> {
    let data_type = infer_data_type(rows)?;

    let mut row_bytes = Vec::new();
    let mut supplemental = Vec::new();
    for (key, value) in rows {
        key.serialize(&mut row_bytes);
        match value {
            InternalValue::HitCount(h) => fixed::write_i64(&mut row_bytes, h.value()),
            InternalValue::Histogram(histogram) => {
                let pointer = supplemental.len() as u32;
                fixed::write_u32(&mut row_bytes, pointer);
                histogram.serialize(&mut supplemental);
            }
        }
    }
    let mut data_body = row_bytes;
    data_body.extend_from_slice(&supplemental);

    let header = BucketHeader {
        name: name.to_string(),
        start_time,
        end_time,
        data_type,
        sources: sources.to_vec(),
        dims: dims.clone(),
        data_count: rows.len() as u32,
    };
    let mut header_body = Vec::new();
    header.write(&mut header_body);

    let mut header_frame = Vec::new();
    frame::write_frame(&mut header_frame, &header_body, CompressionKind::Deflate);

    let mut data_frame = Vec::new();
    frame::write_frame(&mut data_frame, &data_body, CompressionKind::None);

    let mut block_body = header_frame;
    block_body.extend_from_slice(&data_frame);

    fixed::write_u16(out, PROTOCOL_VERSION_CURRENT);
    fixed::write_u64(out, block_body.len() as u64);
    out.extend_from_slice(&block_body);
    Ok(())
}

fn infer_data_type(rows: &[(Key, InternalValue)]) -> Result<DataTypeCode> {
    let mut kind = None;
    for (_, value) in rows {
        let this_kind = match value {
            InternalValue::HitCount(_) => DataTypeCode::HitCount,
            InternalValue::Histogram(_) => DataTypeCode::Histogram,
        };
        match kind {
            None => kind = Some(this_kind),
            Some(existing) if existing == this_kind => {}
            Some(_) => {
                return Err(Error::InvalidArgument("bucket rows mix hit-count and histogram values".into(),))
            }
        }
    }
    // An empty bucket still needs a declared type; callers always know it
    // from the counter, but the writer has no counter context, so default
    // to hit-count for the degenerate empty case.
    Ok(kind.unwrap_or(DataTypeCode::HitCount))
}
