//! Bucket block reader: current protocol version plus the immediately
//! previous one.

use crate::header::{BucketHeader, DataTypeCode};
use crate::writer::{PROTOCOL_VERSION_CURRENT, PROTOCOL_VERSION_PREVIOUS};
use perf_codec::{fixed, frame};
use perf_core::{Error, Key, KeyConverter, Result};
use perf_data::{Histogram, InternalValue};
use tracing::warn;

/// A fully decoded bucket: its header plus the keyed rows from the data
/// frame, already remapped through `converter` if one was supplied.
pub struct DecodedBucket {
    /// The decoded header.
    pub header: BucketHeader,
    /// The decoded `(Key, InternalValue)` rows.
    pub rows: Vec<(Key, InternalValue)>,
}

/// Read one bucket block, optionally remapping every row's key through
/// `converter`.
pub fn read_bucket(cursor: &mut &[u8], converter: Option<&KeyConverter>) -> Result<DecodedBucket> {
    let version = fixed::read_u16(cursor).map_err(|e| Error::CorruptData(format!("bucket version: {e}")))?;
    if version != PROTOCOL_VERSION_CURRENT && version != PROTOCOL_VERSION_PREVIOUS {
        return Err(Error::CorruptData(format!("unsupported protocol version {version}")));
    }
    let block_len = fixed::read_u64(cursor).map_err(|e| Error::CorruptData(format!("bucket block length: {e}")))? as usize;
    if cursor.len() < block_len {
        return Err(Error::CorruptData(format!("bucket block truncated: need {block_len}, have {}", cursor.len())));
    }
    let (block_bytes, rest) = cursor.split_at(block_len);
    *cursor = rest;
    let mut block_cursor = block_bytes;

    let header_body = if version == PROTOCOL_VERSION_CURRENT {
        frame::read_frame(&mut block_cursor)
    } else {
        frame::read_legacy_lz4_frame(&mut block_cursor)
    }
    .map_err(|e| Error::CorruptData(format!("bucket header frame: {e}")))?;
    let mut header_cursor = header_body.as_slice();
    let header = BucketHeader::read(&mut header_cursor)?;

    let data_body = frame::read_frame(&mut block_cursor).map_err(|e| Error::CorruptData(format!("bucket data frame: {e}")))?;
    let arity = header.dims.arity();

    let mut rows = Vec::with_capacity(header.data_count as usize);
    let mut row_cursor = data_body.as_slice();
    let mut histogram_pointers = Vec::new();
    for _ in 0..header.data_count {
        let key = Key::deserialize(&mut row_cursor, arity)?;
        match header.data_type {
            DataTypeCode::HitCount => {
                let v = fixed::read_i64(&mut row_cursor).map_err(|e| Error::CorruptData(format!("hit-count row value: {e}")))?;
                let mut value = InternalValue::new_hit_count();
                value.merge_from_raw(perf_data::RawUpdate::Scalar(v)).expect("hit-count value accepts a scalar raw update");
                rows.push((key, value));
            }
            DataTypeCode::Histogram => {
                let pointer = fixed::read_u32(&mut row_cursor).map_err(|e| Error::CorruptData(format!("histogram row pointer: {e}")))?;
                histogram_pointers.push(pointer);
                // Placeholder; replaced once the supplemental buffer is read below.
                rows.push((key, InternalValue::new_histogram()));
            }
        }
    }

    if header.data_type == DataTypeCode::Histogram {
        let supplemental = row_cursor;
        for (row, pointer) in rows.iter_mut().zip(histogram_pointers.iter()) {
            let mut entry_cursor = &supplemental[*pointer as usize..];
            let histogram = if version == PROTOCOL_VERSION_CURRENT {
                Histogram::deserialize(&mut entry_cursor)?
            } else {
                legacy_histogram_at(&supplemental, *pointer)?
            };
            row.1 = InternalValue::Histogram(histogram);
        }
    }

    if let Some(converter) = converter {
        for (key, _) in rows.iter_mut() {
            *key = converter.convert(key);
        }
    }

    Ok(DecodedBucket { header, rows })
}

fn legacy_histogram_at(supplemental: &[u8], pointer: u32) -> Result<Histogram> {
    let mut entry_cursor = &supplemental[pointer as usize..];
    let len_with_flag = fixed::read_u32(&mut entry_cursor).map_err(|e| Error::CorruptData(format!("legacy histogram entry length: {e}")))?;
    let count = len_with_flag & 0x7fff_ffff;
    if len_with_flag & (1 << 31) != 0 {
        warn!("legacy frequency-compressed histogram entries are not supported; treating as raw samples");
    }
    Histogram::deserialize_legacy(&mut entry_cursor, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::SourceEntry;
    use crate::writer::write_bucket;
    use perf_core::{Dimension, DimensionSet};
    use perf_data::RawUpdate;
    use std::sync::Arc;

    #[test]
    fn writes_then_reads_hit_count_bucket() {
        let region = Arc::new(Dimension::new("region").unwrap());
        let us = region.index_of("us");
        let eu = region.index_of("eu");
        let dims = DimensionSet::new(vec![region]).unwrap();

        let mut v1 = InternalValue::new_hit_count();
        v1.merge_from_raw(RawUpdate::Scalar(10)).unwrap();
        let mut v2 = InternalValue::new_hit_count();
        v2.merge_from_raw(RawUpdate::Scalar(5)).unwrap();
        let rows = vec![(Key::from_indices([us]), v1), (Key::from_indices([eu]), v2)];

        let mut buf = Vec::new();
        write_bucket(
            &mut buf,
            "/svc/requests",
            1000,
            2000,
            &[SourceEntry {
                name: "host-a".into(),
                status: 1,
            }],
            &dims,
            &rows,
        )
        .unwrap();

        let mut cursor = buf.as_slice();
        let decoded = read_bucket(&mut cursor, None).unwrap();
        assert_eq!(decoded.header.name, "/svc/requests");
        assert_eq!(decoded.header.start_time, 1000);
        assert_eq!(decoded.header.end_time, 2000);
        assert_eq!(decoded.rows.len(), 2);
        assert!(cursor.is_empty());

        let total: i64 = decoded
            .rows
            .iter()
            .map(|(_, v)| match v {
                InternalValue::HitCount(h) => h.value(),
                _ => panic!("expected hit count"),
            })
            .sum();
        assert_eq!(total, 15);
    }

    #[test]
    fn writes_then_reads_histogram_bucket() {
        let dims = DimensionSet::new(vec![]).unwrap();
        let mut value = InternalValue::new_histogram();
        value.merge_from_raw(RawUpdate::Samples((1..=10).collect())).unwrap();
        let rows = vec![(Key::from_indices([]), value)];

        let mut buf = Vec::new();
        write_bucket(&mut buf, "/svc/latency", 0, 1000, &[], &dims, &rows).unwrap();

        let mut cursor = buf.as_slice();
        let decoded = read_bucket(&mut cursor, None).unwrap();
        match &decoded.rows[0].1 {
            InternalValue::Histogram(h) => {
                assert_eq!(h.total(), 10);
                assert_eq!(h.max().unwrap(), 10);
            }
            _ => panic!("expected histogram"),
        }
    }

    #[test]
    fn read_remaps_rows_through_key_converter() {
        let source_region = Arc::new(Dimension::new("region").unwrap());
        let us = source_region.index_of("us");
        let source_dims = DimensionSet::new(vec![source_region]).unwrap();

        let mut value = InternalValue::new_hit_count();
        value.merge_from_raw(RawUpdate::Scalar(1)).unwrap();
        let rows = vec![(Key::from_indices([us]), value)];

        let mut buf = Vec::new();
        write_bucket(&mut buf, "/svc/requests", 0, 1, &[], &source_dims, &rows).unwrap();

        let dest_region = Arc::new(Dimension::new("region").unwrap());
        let dest_dims = DimensionSet::new(vec![dest_region]).unwrap();
        let converter = KeyConverter::new(&source_dims, &dest_dims);

        let mut cursor = buf.as_slice();
        let decoded = read_bucket(&mut cursor, Some(&converter)).unwrap();
        let dest_region = &decoded.header.dims.dimensions()[0];
        let _ = dest_region; // header dims are the source's; destination strings come via `dest_dims`.
        assert_eq!(dest_dims.dimensions()[0].string_at(decoded.rows[0].0.get(0)), "us");
    }

    #[test]
    fn truncated_block_fails() {
        let buf = vec![0u8; 2];
        let mut cursor = buf.as_slice();
        assert!(matches!(read_bucket(&mut cursor, None), Err(Error::CorruptData(_))));
    }

    #[test]
    fn unknown_version_rejected() {
        let mut buf = Vec::new();
        fixed::write_u16(&mut buf, 99);
        fixed::write_u64(&mut buf, 0);
        let mut cursor = buf.as_slice();
        assert!(matches!(read_bucket(&mut cursor, None), Err(Error::CorruptData(_))));
    }
}
