//! Ordered tuple of dimensions attached to a counter

use crate::dimension::Dimension;
use crate::key::Key;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered collection of dimensions. Two sets are equal if they contain the
/// same named dimensions in any order.
#[derive(Clone)]
pub struct DimensionSet {
    dims: Arc<Vec<Arc<Dimension>>>,
}

impl DimensionSet {
    /// Build a set from an ordered list of dimensions. Fails if two
    /// dimensions share a (case-insensitive) name.
    pub fn new(dims: Vec<Arc<Dimension>>) -> Result<Self> {
        for i in 0..dims.len() {
            for j in (i + 1)..dims.len() {
                if dims[i] == dims[j] {
                    return Err(Error::InvalidArgument(format!("duplicate dimension name '{}'",
                                dims[i].name())));
                }
            }
        }
        Ok(DimensionSet {
                dims: Arc::new(dims),
        })
    }

    /// Number of dimensions in the set.
    pub fn arity(&self) -> usize {
        self.dims.len()
    }

    /// Dimensions in their current (possibly reordered) order.
    pub fn dimensions(&self) -> &[Arc<Dimension>] {
        &self.dims
    }

    /// Position of the dimension named `name` (case-insensitive).
    pub fn offset_of(&self, name: &str) -> Result<usize> {
        self.dims.iter().position(|d| d.name().eq_ignore_ascii_case(name)).ok_or_else(|| Error::UnknownDimension(name.to_string()))
    }

    /// Build a key from a `name -> value` dict: every dimension present in
    /// `dict` (case-insensitively) resolves through `index_of`; every
    /// absent dimension is set to wildcard. Returns the key and whether
    /// every dimension was provided.
    pub fn create_key(&self, dict: &HashMap<String, String>) -> (Key, bool) {
        let mut indices = Vec::with_capacity(self.dims.len());
        let mut all_provided = true;
        for dim in self.dims.iter() {
            let found = dict.iter().find(|(k, _)| k.eq_ignore_ascii_case(dim.name()));
            match found {
                Some((_, v)) => indices.push(dim.index_of(v)),
                None => {
                    all_provided = false;
                    indices.push(crate::limits::WILDCARD);
                }
            }
        }
        (Key::from_indices(indices), all_provided)
    }

    /// An all-wildcard key for this set's arity, served from a small shared
    /// cache keyed by arity.
    pub fn wildcard_key(&self) -> Key {
        wildcard_key_for_arity(self.arity())
    }
}

impl PartialEq for DimensionSet {
    fn eq(&self, other: &Self) -> bool {
        if self.dims.len() != other.dims.len() {
            return false;
        }
        self.dims.iter().all(|d| other.dims.iter().any(|o| d == o))
    }
}
impl Eq for DimensionSet {}

static WILDCARD_CACHE: Lazy<Mutex<HashMap<usize, Key>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn wildcard_key_for_arity(arity: usize) -> Key {
    let mut cache = WILDCARD_CACHE.lock();
    cache.entry(arity).or_insert_with(|| Key::wildcard(arity)).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> DimensionSet {
        let dims = names.iter().map(|n| Arc::new(Dimension::new(*n).unwrap())).collect();
        DimensionSet::new(dims).unwrap()
    }

    #[test]
    fn equality_ignores_order() {
        let a = set(&["region", "env"]);
        let b = set(&["env", "region"]);
        assert_eq!(a, b);
    }

    #[test]
    fn offset_of_is_case_insensitive() {
        let s = set(&["Region", "env"]);
        assert_eq!(s.offset_of("region").unwrap(), 0);
        assert_eq!(s.offset_of("ENV").unwrap(), 1);
        assert!(s.offset_of("missing").is_err());
    }

    #[test]
    fn create_key_fills_wildcard_for_missing() {
        let s = set(&["region", "env"]);
        let mut dict = HashMap::new();
        dict.insert("region".to_string(), "us".to_string());
        let (key, all) = s.create_key(&dict);
        assert!(!all);
        assert_ne!(key.get(0), crate::limits::WILDCARD);
        assert_eq!(key.get(1), crate::limits::WILDCARD);
    }

    #[test]
    fn create_key_all_provided() {
        let s = set(&["region"]);
        let mut dict = HashMap::new();
        dict.insert("region".to_string(), "us".to_string());
        let (_, all) = s.create_key(&dict);
        assert!(all);
    }

    #[test]
    fn wildcard_key_has_all_wildcards() {
        let s = set(&["region", "env", "host"]);
        let key = s.wildcard_key();
        assert_eq!(key.arity(), 3);
        for i in 0..3 {
            assert_eq!(key.get(i), crate::limits::WILDCARD);
        }
    }

    #[test]
    fn duplicate_names_rejected() {
        let dims = vec![
            Arc::new(Dimension::new("region").unwrap()),
            Arc::new(Dimension::new("Region").unwrap()),
        ];
        assert!(DimensionSet::new(dims).is_err());
    }
}
