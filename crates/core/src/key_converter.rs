//! Translate keys between dimension sets. Used both when absorbing cross-
//! host data into a bucket and when a buffer's rows are remapped onto a new
//! (reordered, or value-remapped) dimension set before a sort-merge.

use crate::dimension::Dimension;
use crate::dimension_set::DimensionSet;
use crate::key::Key;
use crate::limits::WILDCARD;
use std::sync::Arc;

/// Precomputed per-slot mapping from a destination dimension set back to a
/// source dimension set.
pub struct KeyConverter {
    source_dims: Vec<Arc<Dimension>>,
    dest_dims: Vec<Arc<Dimension>>,
    /// `mapping[dest_slot] = Some(source_slot)` or `None` if the
    /// destination dimension has no same-named counterpart in the source.
    mapping: Vec<Option<usize>>,
}

impl KeyConverter {
    /// Build a converter from `source` to `destination`.
    pub fn new(source: &DimensionSet, destination: &DimensionSet) -> Self {
        let source_dims: Vec<_> = source.dimensions().to_vec();
        let dest_dims: Vec<_> = destination.dimensions().to_vec();
        let mapping = dest_dims.iter().map(|d| {
                source_dims.iter().position(|s| s.name().eq_ignore_ascii_case(d.name()))
        }).collect();
        KeyConverter {
            source_dims,
            dest_dims,
            mapping,
        }
    }

    /// Convert a key from the source dimension set to the destination one.
    pub fn convert(&self, source_key: &Key) -> Key {
        let mut out = Vec::with_capacity(self.dest_dims.len());
        for (dest_slot, src_slot) in self.mapping.iter().enumerate() {
            let value = match src_slot {
                Some(src_slot) => {
                    let src_dim = &self.source_dims[*src_slot];
                    let s = src_dim.string_at(source_key.get(*src_slot));
                    self.dest_dims[dest_slot].index_of(&s)
                }
                None => WILDCARD,
            };
            out.push(value);
        }
        Key::from_indices(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension_set::DimensionSet;

    fn dim_set(names: &[&str]) -> DimensionSet {
        let dims = names.iter().map(|n| Arc::new(Dimension::new(*n).unwrap())).collect();
        DimensionSet::new(dims).unwrap()
    }

    #[test]
    fn converts_matching_dimensions_and_wildcards_the_rest() {
        let source = dim_set(&["region", "env"]);
        let destination = dim_set(&["env", "datacenterx"]);

        let region_idx = source.offset_of("region").unwrap();
        let env_idx = source.offset_of("env").unwrap();
        let mut key = Key::wildcard(2);
        key.set(region_idx, source.dimensions()[0].index_of("us"));
        key.set(env_idx, source.dimensions()[1].index_of("prod"));

        let converter = KeyConverter::new(&source, &destination);
        let converted = converter.convert(&key);

        let dest_env_idx = destination.offset_of("env").unwrap();
        let dest_dc_idx = destination.offset_of("datacenterx").unwrap();
        assert_eq!(
            destination.dimensions()[dest_env_idx].string_at(converted.get(dest_env_idx)),
            "prod");
        assert_eq!(converted.get(dest_dc_idx), WILDCARD);
    }

    #[test]
    fn identity_conversion_round_trips() {
        let set = dim_set(&["region"]);
        let idx = set.dimensions()[0].index_of("us");
        let key = Key::from_indices([idx]);
        let converter = KeyConverter::new(&set, &set);
        let converted = converter.convert(&key);
        assert_eq!(
            set.dimensions()[0].string_at(converted.get(0)),
            "us");
    }
}
