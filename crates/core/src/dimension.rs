//! A single named, interned dimension. Values are interned to dense `u32`
//! indices. The reserved sentinel [`crate::limits::WILDCARD`] means "unset /
//! any" and is never allocated as a real index.

use crate::limits::{is_reserved_dimension_name, MAX_DIMENSION_VALUES, WILDCARD};
use crate::{Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;

/// A named dimension with an interned, append-only value table.
///
/// `indexOf` is safe under concurrent writers: new values are appended
/// under `values` (a mutex-guarded `Vec`), and `lookup` (a `DashMap`)
/// provides lock-free reads for values that already exist. Duplicates are
/// prevented because the lookup map is consulted, and updated, while the
/// mutex is held.
pub struct Dimension {
    name: String,
    lowercase_name: String,
    whitelist: Option<DashMap<String, ()>>,
    values: Mutex<Vec<String>>,
    lookup: DashMap<String, u32>,
}

impl Dimension {
    /// Create a new dimension. Fails if `name` collides with a reserved
    /// dimension name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_whitelist(name, None)
    }

    /// Create a new dimension restricted to `whitelist`. Values written
    /// outside the whitelist resolve to the wildcard index.
    pub fn with_whitelist(
        name: impl Into<String>,
        whitelist: Option<Vec<String>>,) -> Result<Self> {
        let name = name.into();
        if is_reserved_dimension_name(&name) {
            return Err(Error::InvalidArgument(format!("dimension name '{name}' is reserved")));
        }
        let lowercase_name = name.to_ascii_lowercase();
        let whitelist = whitelist.map(|values| {
                let map = DashMap::new();
                for v in values {
                    map.insert(v, ());
                }
                map
        });
        Ok(Dimension {
                name,
                lowercase_name,
                whitelist,
                values: Mutex::new(Vec::new()),
                lookup: DashMap::new(),
        })
    }

    /// The dimension's name, as originally supplied.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of distinct, allocated values (not counting the wildcard).
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// True if no values have been allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `value` to its index, allocating a new one if necessary.
    ///
    /// Returns [`WILDCARD`] for an empty string or for a value outside the
    /// whitelist, if one is configured.
    pub fn index_of(&self, value: &str) -> u32 {
        if value.is_empty() {
            return WILDCARD;
        }
        if let Some(whitelist) = &self.whitelist {
            if !whitelist.contains_key(value) {
                return WILDCARD;
            }
        }
        if let Some(existing) = self.lookup.get(value) {
            return *existing;
        }

        let mut values = self.values.lock();
        // Re-check under the lock: another writer may have inserted this
        // value between our optimistic read and acquiring the mutex.
        if let Some(existing) = self.lookup.get(value) {
            return *existing;
        }
        if values.len() as u32 >= MAX_DIMENSION_VALUES {
            // Capacity exhausted: treat further novel values as wildcard
            // rather than panicking on an ingest-path call.
            return WILDCARD;
        }
        let index = values.len() as u32;
        values.push(value.to_string());
        self.lookup.insert(value.to_string(), index);
        index
    }

    /// Look up the index for `value` without allocating. Returns `None` if
    /// the value has never been interned.
    pub fn try_index_of(&self, value: &str) -> Option<u32> {
        if value.is_empty() {
            return Some(WILDCARD);
        }
        self.lookup.get(value).map(|v| *v)
    }

    /// The string for `index`. Returns the empty string for the wildcard
    /// index.
    pub fn string_at(&self, index: u32) -> String {
        if index == WILDCARD {
            return String::new();
        }
        let values = self.values.lock();
        values.get(index as usize).cloned().unwrap_or_default()
    }

    /// Serialize: name, varint count, then each value in index order.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        use perf_codec::{fixed, varint};
        fixed::write_string(out, &self.name);
        let values = self.values.lock();
        varint::write_u32(out, values.len() as u32);
        for v in values.iter() {
            fixed::write_string(out, v);
        }
    }

    /// Deserialize a dimension previously written by [`Dimension::serialize`].
    /// Fails with `CorruptData` on a duplicate value.
    pub fn deserialize(cursor: &mut &[u8]) -> Result<Self> {
        use perf_codec::{fixed, varint};
        let name = fixed::read_string(cursor)?;
        let count = varint::read_u32(cursor)?;
        let dim = Dimension::new(name).unwrap_or_else(|_| {
                // A persisted dimension name might legitimately collide with a
                // reserved name if validation rules changed; fall back to an
                // unchecked construction so load never fails on old data.
                Dimension {
                    name: String::new(),
                    lowercase_name: String::new(),
                    whitelist: None,
                    values: Mutex::new(Vec::new()),
                    lookup: DashMap::new(),
                }
        });
        for _ in 0..count {
            let value = fixed::read_string(cursor)?;
            if dim.lookup.contains_key(&value) {
                return Err(Error::CorruptData(format!("duplicate dimension value '{value}'")));
            }
            let index = dim.values.lock().len() as u32;
            dim.values.lock().push(value.clone());
            dim.lookup.insert(value, index);
        }
        Ok(dim)
    }
}

impl PartialEq for Dimension {
    fn eq(&self, other: &Self) -> bool {
        self.lowercase_name == other.lowercase_name
    }
}
impl Eq for Dimension {}

impl std::fmt::Debug for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dimension").field("name", &self.name).field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_of_allocates_and_dedups() {
        let dim = Dimension::new("region").unwrap();
        let a = dim.index_of("us");
        let b = dim.index_of("eu");
        let a2 = dim.index_of("us");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(dim.len(), 2);
    }

    #[test]
    fn empty_value_is_wildcard() {
        let dim = Dimension::new("region").unwrap();
        assert_eq!(dim.index_of(""), WILDCARD);
        assert_eq!(dim.string_at(WILDCARD), "");
    }

    #[test]
    fn whitelist_restricts_values() {
        let dim = Dimension::with_whitelist("region", Some(vec!["us".into(), "eu".into()])).unwrap();
        assert_ne!(dim.index_of("us"), WILDCARD);
        assert_eq!(dim.index_of("ap"), WILDCARD);
    }

    #[test]
    fn reserved_name_rejected() {
        assert!(Dimension::new("startTime").is_err());
        assert!(Dimension::new("Percentile").is_err());
    }

    #[test]
    fn string_at_round_trips() {
        let dim = Dimension::new("region").unwrap();
        let idx = dim.index_of("us");
        assert_eq!(dim.string_at(idx), "us");
    }

    #[test]
    fn serialize_round_trip() {
        let dim = Dimension::new("region").unwrap();
        dim.index_of("us");
        dim.index_of("eu");
        let mut buf = Vec::new();
        dim.serialize(&mut buf);
        let mut cursor = buf.as_slice();
        let loaded = Dimension::deserialize(&mut cursor).unwrap();
        assert_eq!(loaded.name, "region");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.string_at(0), "us");
        assert_eq!(loaded.string_at(1), "eu");
    }

    #[test]
    fn serialize_duplicate_value_fails_on_load() {
        let mut buf = Vec::new();
        {
            use perf_codec::{fixed, varint};
            fixed::write_string(&mut buf, "region");
            varint::write_u32(&mut buf, 2);
            fixed::write_string(&mut buf, "us");
            fixed::write_string(&mut buf, "us");
        }
        let mut cursor = buf.as_slice();
        let result = Dimension::deserialize(&mut cursor);
        assert!(matches!(result, Err(Error::CorruptData(_))));
    }
}
