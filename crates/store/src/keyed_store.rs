//! The keyed data store: one merged buffer plus a list of unmerged buffers,
//! with policies for flushing, compacting, and merging them

use crate::kway_merge::merge_sorted;
use crate::slab::{BufferedKeyedData, SealedBuffer};
use parking_lot::{Mutex, RwLock};
use perf_core::{DimensionSet, Key, KeyConverter, Result};
use perf_data::InternalValue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// Unmerged buffers are compacted once their combined estimated size crosses
/// this many bytes (approximately 8 MiB).
pub const UNMERGED_FLUSH_THRESHOLD_BYTES: usize = 8 * 1024 * 1024;

/// Row count of each writable slab before it is sealed and rotated.
const DEFAULT_SLAB_CAPACITY: usize = 4096;

fn estimated_row_bytes(dims: &DimensionSet) -> usize {
    // 4 bytes per dimension index plus a rough allowance for the value
    // payload (hit-count is 8 bytes; histograms vary, this is a buffer
        // sizing heuristic, not an on-disk layout guarantee).
    dims.arity() * 4 + 24
}

/// Wraps one merged buffer and zero or more unmerged buffers for a single
/// counter's live data.
pub struct KeyedDataStore {
    dims: Mutex<DimensionSet>,
    writable: RwLock<BufferedKeyedData>,
    unmerged: Mutex<Vec<SealedBuffer>>,
    merged: Mutex<SealedBuffer>,
    unmerged_bytes: AtomicUsize,
    dirty: AtomicBool,
    slab_capacity: usize,
}

impl KeyedDataStore {
    /// A new, empty store over `dims`.
    pub fn new(dims: DimensionSet) -> Self {
        Self::with_slab_capacity(dims, DEFAULT_SLAB_CAPACITY)
    }

    /// As [`KeyedDataStore::new()`], with an explicit writable-slab row
    /// capacity (mainly useful for tests that want to exercise rotation
        /// without writing thousands of rows).
    pub fn with_slab_capacity(dims: DimensionSet, slab_capacity: usize) -> Self {
        KeyedDataStore {
            writable: RwLock::new(BufferedKeyedData::new(slab_capacity)),
            dims: Mutex::new(dims),
            unmerged: Mutex::new(Vec::new()),
            merged: Mutex::new(SealedBuffer::empty()),
            unmerged_bytes: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
            slab_capacity,
        }
    }

    /// True if there is merged data pending persistence.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Append one `(key, value)` row to the shared writable slab, rotating it into
    /// the unmerged list when full. Concurrent appenders share a read lock on
    /// `writable` and race on the slab's internal atomic claim; only rotation,
    /// the rare case, takes `writable` exclusively.
    pub fn append(&self, key: Key, value: InternalValue) -> Result<()> {
        loop {
            {
                let guard = self.writable.read();
                if guard.try_write(key.clone(), value.clone()).is_ok() {
                    return Ok(());
                }
            }
            self.rotate_writable();
        }
    }

    fn rotate_writable(&self) {
        let mut writable = self.writable.write();
        let full = std::mem::replace(&mut *writable, BufferedKeyedData::new(self.slab_capacity));
        drop(writable);
        let sealed = full.seal();
        if sealed.is_empty() {
            return;
        }
        let dims = self.dims.lock();
        let added_bytes = sealed.len() * estimated_row_bytes(&dims);
        drop(dims);
        self.unmerged.lock().push(sealed);
        let total = self.unmerged_bytes.fetch_add(added_bytes, Ordering::AcqRel) + added_bytes;
        if total >= UNMERGED_FLUSH_THRESHOLD_BYTES {
            self.compact_unmerged();
        }
    }

    /// Remap, sort, and k-way merge every unmerged buffer into one new
    /// unmerged buffer.
    fn compact_unmerged(&self) {
            let dims = self.dims.lock().clone();
            let mut unmerged = self.unmerged.lock();
            if unmerged.len() <= 1 {
                return;
            }
            let mut buffers: Vec<SealedBuffer> = std::mem::take(&mut *unmerged);
            for buf in buffers.iter_mut() {
                let converter = KeyConverter::new(&dims, &dims);
                buf.remap(&converter);
                buf.sort();
            }
            let rows_refs: Vec<&[(Key, InternalValue)]> = buffers.iter().map(|b| b.rows()).collect();
            match merge_sorted(&rows_refs) {
                Ok(rows) => {
                    debug!(buffers = buffers.len(), rows = rows.len(), "compacted unmerged buffers");
                    *unmerged = vec![SealedBuffer::from_rows(rows)];
                }
                Err(_) => {
                    // Kind-mismatched values can't happen for a single counter's
                    // store; fail safe by putting the buffers back uncompacted.
                    *unmerged = buffers;
                }
            }
            self.unmerged_bytes.store(
                unmerged.iter().map(|b| b.len()).sum::<usize>() * estimated_row_bytes(&dims),
                Ordering::Release,);
        }

        /// Seal the writable slab, remap+sort it together with every unmerged buffer
        /// and the current merged buffer, and reduce them into one new merged buffer
        /// via the k-way ordered merge. Marks the store dirty
        pub fn merge(&self) -> Result<()> {
            let dims = self.dims.lock().clone();

            let mut writable = self.writable.write();
            let full = std::mem::replace(&mut *writable, BufferedKeyedData::new(self.slab_capacity));
            drop(writable);
            let mut fresh_sealed = full.seal();

            let mut unmerged = self.unmerged.lock();
            let mut all: Vec<SealedBuffer> = std::mem::take(&mut *unmerged);
            if !fresh_sealed.is_empty() {
                let converter = KeyConverter::new(&dims, &dims);
                fresh_sealed.remap(&converter);
                all.push(fresh_sealed);
            }

            let mut merged = self.merged.lock();
            let mut current_merged = std::mem::replace(&mut *merged, SealedBuffer::empty());
            if !current_merged.is_empty() {
                all.push(current_merged);
                current_merged = SealedBuffer::empty();
            }
            drop(current_merged);

            for buf in all.iter_mut() {
                let converter = KeyConverter::new(&dims, &dims);
                buf.remap(&converter);
                buf.sort();
            }
            let rows_refs: Vec<&[(Key, InternalValue)]> = all.iter().map(|b| b.rows()).collect();
            let rows = merge_sorted(&rows_refs)?;
            *merged = SealedBuffer::from_rows(rows);
            self.unmerged_bytes.store(0, Ordering::Release);
            self.dirty.store(true, Ordering::Release);
            Ok(())
        }

        /// Clear the dirty flag after a successful persist.
        pub fn mark_clean(&self) {
            self.dirty.store(false, Ordering::Release);
        }

        /// Move `other`'s merged and unmerged buffers into this store's unmerged list,
        /// remapping them onto this store's dimension set. Safe against concurrent
        /// appenders on either store
        pub fn take_data(&self, other: &KeyedDataStore) -> Result<()> {
            let self_dims = self.dims.lock().clone();
            let other_dims = other.dims.lock().clone();
            let converter = KeyConverter::new(&other_dims, &self_dims);

            other.rotate_writable();

            let mut other_unmerged = other.unmerged.lock();
            let mut taken: Vec<SealedBuffer> = std::mem::take(&mut *other_unmerged);
            drop(other_unmerged);

            let mut other_merged = other.merged.lock();
            let taken_merged = std::mem::replace(&mut *other_merged, SealedBuffer::empty());
            drop(other_merged);
            if !taken_merged.is_empty() {
                taken.push(taken_merged);
            }

            for buf in taken.iter_mut() {
                buf.remap(&converter);
            }

            let added_bytes: usize = taken.iter().map(|b| b.len()).sum::<usize>()
            * estimated_row_bytes(&self_dims);
            let mut dest_unmerged = self.unmerged.lock();
            dest_unmerged.extend(taken);
            drop(dest_unmerged);
            let total = self.unmerged_bytes.fetch_add(added_bytes, Ordering::AcqRel) + added_bytes;
            if total >= UNMERGED_FLUSH_THRESHOLD_BYTES {
                self.compact_unmerged();
            }
            Ok(())
        }

        /// Snapshot of the merged buffer's rows, matching `filter` if given.
        /// Does not include unmerged data; call [`KeyedDataStore::merge`] first
        /// for a complete view.
        pub fn query_merged<'a>(&'a self) -> parking_lot::MappedMutexGuard<'a, SealedBuffer> {
            parking_lot::MutexGuard::map(self.merged.lock(), |m| m)
        }

        /// Total row count across the merged buffer and all unmerged buffers
        /// (an upper bound on distinct keys until the next `merge`).
        pub fn approximate_len(&self) -> usize {
            self.merged.lock().len()
            + self.unmerged.lock().iter().map(|b| b.len()).sum::<usize>()
            + self.writable.read().len()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use perf_core::Dimension;
        use perf_data::RawUpdate;
        use std::sync::Arc;

        fn dims() -> DimensionSet {
            DimensionSet::new(vec![Arc::new(Dimension::new("region").unwrap())]).unwrap()
        }

        fn hit(v: i64) -> InternalValue {
            let mut val = InternalValue::new_hit_count();
            val.merge_from_raw(RawUpdate::Scalar(v)).unwrap();
            val
        }

        #[test]
        fn append_and_merge_produces_sorted_distinct_keys() {
            let store = KeyedDataStore::with_slab_capacity(dims(), 8);
            store.append(Key::from_indices([3]), hit(1)).unwrap();
            store.append(Key::from_indices([1]), hit(2)).unwrap();
            store.append(Key::from_indices([1]), hit(3)).unwrap();
            store.merge().unwrap();

            let merged = store.query_merged();
            assert_eq!(merged.len(), 2);
            let keys: Vec<_> = merged.rows().iter().map(|(k, _)| k.get(0)).collect();
            assert_eq!(keys, vec![1, 3]);
            match &merged.rows()[0].1 {
                InternalValue::HitCount(h) => assert_eq!(h.value(), 5),
                _ => panic!("expected hit count"),
            }
        }

        #[test]
        fn rotation_happens_when_slab_fills() {
            let store = KeyedDataStore::with_slab_capacity(dims(), 2);
            for i in 0..5 {
                store.append(Key::from_indices([i]), hit(1)).unwrap();
            }
            assert_eq!(store.approximate_len(), 5);
            store.merge().unwrap();
            assert_eq!(store.query_merged().len(), 5);
        }

        #[test]
        fn merge_sets_dirty_and_mark_clean_resets_it() {
            let store = KeyedDataStore::with_slab_capacity(dims(), 8);
            store.append(Key::from_indices([1]), hit(1)).unwrap();
            assert!(!store.is_dirty());
            store.merge().unwrap();
            assert!(store.is_dirty());
            store.mark_clean();
            assert!(!store.is_dirty());
        }

        #[test]
        fn take_data_moves_rows_into_destination() {
            let source = KeyedDataStore::with_slab_capacity(dims(), 8);
            source.append(Key::from_indices([1]), hit(5)).unwrap();
            source.merge().unwrap();

            let dest = KeyedDataStore::with_slab_capacity(dims(), 8);
            dest.append(Key::from_indices([1]), hit(2)).unwrap();
            dest.take_data(&source).unwrap();
            dest.merge().unwrap();

            let merged = dest.query_merged();
            assert_eq!(merged.len(), 1);
            match &merged.rows()[0].1 {
                InternalValue::HitCount(h) => assert_eq!(h.value(), 7),
                _ => panic!("expected hit count"),
            }
        }

        #[test]
        fn merge_twice_is_idempotent_for_unchanged_data() {
            let store = KeyedDataStore::with_slab_capacity(dims(), 8);
            store.append(Key::from_indices([1]), hit(1)).unwrap();
            store.merge().unwrap();
            let first: Vec<_> = store.query_merged().rows().to_vec();
            store.merge().unwrap();
            let second: Vec<_> = store.query_merged().rows().to_vec();
            assert_eq!(first, second);
        }
    }
