//! Bucket header payload: name, time range, data type, sources, and dimension
//! set

use perf_codec::{fixed, varint};
use perf_core::{Dimension, DimensionSet, Error, Result};
use std::sync::Arc;

/// The on-disk data type code. Code `2` is reserved for a legacy
/// histogram encoding this crate does not write and rejects on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTypeCode {
    /// Scalar hit-count values.
    HitCount,
    /// Value-frequency histogram values.
    Histogram,
}

impl DataTypeCode {
    fn to_i32(self) -> i32 {
        match self {
            DataTypeCode::HitCount => 1,
            DataTypeCode::Histogram => 3,
        }
    }

    fn from_i32(code: i32) -> Result<Self> {
        match code {
            1 => Ok(DataTypeCode::HitCount),
            3 => Ok(DataTypeCode::Histogram),
            2 => Err(Error::CorruptData("data type code 2 is reserved legacy and unsupported".into(),)),
            other => Err(Error::CorruptData(format!("unknown data type code {other}"))),
        }
    }
}

/// One source entry: a name and a raw status code. `perf-engine` owns the
/// interpretation of the status code (`SourceStatus`); this crate only
/// round-trips the integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// The source (host) name.
    pub name: String,
    /// The raw, caller-interpreted status code.
    pub status: i32,
}

/// The full bucket header payload.
#[derive(Debug, Clone)]
pub struct BucketHeader {
    /// Counter name this bucket belongs to.
    pub name: String,
    /// Bucket start time, ms since Unix epoch UTC.
    pub start_time: i64,
    /// Bucket end time, ms since Unix epoch UTC.
    pub end_time: i64,
    /// The value kind stored in this bucket's data frame.
    pub data_type: DataTypeCode,
    /// Per-host contribution sources.
    pub sources: Vec<SourceEntry>,
    /// The dimension set rows are keyed against.
    pub dims: DimensionSet,
    /// Number of rows in the following data frame.
    pub data_count: u32,
}

impl BucketHeader {
    /// Encode the header payload.
    pub fn write(&self, out: &mut Vec<u8>) {
        fixed::write_string(out, &self.name);
        varint::write_i64(out, self.start_time);
        varint::write_i64(out, self.end_time);
        varint::write_i32(out, self.data_type.to_i32());

        varint::write_i32(out, self.sources.len() as i32);
        for source in &self.sources {
            fixed::write_string(out, &source.name);
            varint::write_i32(out, source.status);
        }

        varint::write_i32(out, self.dims.arity() as i32);
        for dim in self.dims.dimensions() {
            dim.serialize(out);
        }

        varint::write_u32(out, self.data_count);
    }

    /// Decode a header payload previously written by
    /// [`BucketHeader::write`].
    pub fn read(cursor: &mut &[u8]) -> Result<Self> {
        let name = fixed::read_string(cursor).map_err(|e| Error::CorruptData(format!("bucket header name: {e}")))?;
        let start_time = varint::read_i64(cursor).map_err(|e| Error::CorruptData(format!("bucket header start time: {e}")))?;
        let end_time = varint::read_i64(cursor).map_err(|e| Error::CorruptData(format!("bucket header end time: {e}")))?;
        let data_type = DataTypeCode::from_i32(
            varint::read_i32(cursor).map_err(|e| Error::CorruptData(format!("bucket header data type: {e}")))?,)?;

        let source_count = varint::read_i32(cursor).map_err(|e| Error::CorruptData(format!("bucket header source count: {e}")))?;
        if source_count < 0 {
            return Err(Error::CorruptData("negative source count".into()));
        }
        let mut sources = Vec::with_capacity(source_count as usize);
        for _ in 0..source_count {
            let name = fixed::read_string(cursor).map_err(|e| Error::CorruptData(format!("source name: {e}")))?;
            let status = varint::read_i32(cursor).map_err(|e| Error::CorruptData(format!("source status: {e}")))?;
            sources.push(SourceEntry { name, status });
        }

        let dim_count = varint::read_i32(cursor).map_err(|e| Error::CorruptData(format!("bucket header dimension count: {e}")))?;
        if dim_count < 0 {
            return Err(Error::CorruptData("negative dimension count".into()));
        }
        let mut dims = Vec::with_capacity(dim_count as usize);
        for _ in 0..dim_count {
            dims.push(Arc::new(Dimension::deserialize(cursor)?));
        }
        let dims = DimensionSet::new(dims)?;

        let data_count = varint::read_u32(cursor).map_err(|e| Error::CorruptData(format!("bucket header data count: {e}")))?;

        Ok(BucketHeader {
                name,
                start_time,
                end_time,
                data_type,
                sources,
                dims,
                data_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample_header() -> BucketHeader {
        let region = Arc::new(Dimension::new("region").unwrap());
        region.index_of("us");
        region.index_of("eu");
        let dims = DimensionSet::new(vec![region]).unwrap();
        BucketHeader {
            name: "/svc/requests".to_string(),
            start_time: 1_000,
            end_time: 2_000,
            data_type: DataTypeCode::HitCount,
            sources: vec![SourceEntry {
                    name: "host-a".to_string(),
                    status: 1,
            }],
            dims,
            data_count: 2,
        }
    }

    #[test]
    fn header_round_trips() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write(&mut buf);
        let mut cursor = buf.as_slice();
        let loaded = BucketHeader::read(&mut cursor).unwrap();
        assert_eq!(loaded.name, header.name);
        assert_eq!(loaded.start_time, header.start_time);
        assert_eq!(loaded.end_time, header.end_time);
        assert_eq!(loaded.data_type, header.data_type);
        assert_eq!(loaded.sources, header.sources);
        assert_eq!(loaded.data_count, header.data_count);
        assert_eq!(loaded.dims.arity(), 1);
        assert!(cursor.is_empty());
    }

    #[test]
    fn reserved_legacy_type_code_rejected() {
        assert!(matches!(
                DataTypeCode::from_i32(2),
                Err(Error::CorruptData(_))));
    }
}
