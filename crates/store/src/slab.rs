//! Append-only buffered key/value rows. A buffer starts *writable*:
//! concurrent writers claim a row index with a fetch-and-add and each claimed
//! slot is written exactly once (a [`once_cell::sync::OnceCell`] gives us that
//! "claim, then write" pattern without unsafe pointer arithmetic). Sealing
//! drains the claimed rows into a plain `Vec`, after which the buffer is
//! eligible for remap and in-place sort.

use once_cell::sync::OnceCell;
use perf_core::{DimensionSet, Error, Key, KeyConverter, Result};
use perf_data::InternalValue;
use std::sync::atomic::{AtomicUsize, Ordering};

enum Storage {
    Writable {
        rows: Vec<OnceCell<(Key, InternalValue)>>,
        next: AtomicUsize,
    },
    Sealed {
        rows: Vec<(Key, InternalValue)>,
    },
}

/// A buffer of `(Key, InternalValue)` rows, writable until sealed.
pub struct BufferedKeyedData {
    storage: Storage,
}

impl BufferedKeyedData {
    /// A new writable buffer with room for `capacity` rows.
    pub fn new(capacity: usize) -> Self {
        let rows = (0..capacity).map(|_| OnceCell::new()).collect();
        BufferedKeyedData {
            storage: Storage::Writable {
                rows,
                next: AtomicUsize::new(0),
            },
        }
    }

    /// True until [`BufferedKeyedData::seal`] is called.
    pub fn is_writable(&self) -> bool {
        matches!(self.storage, Storage::Writable {.. })
    }

    /// Atomically claim the next row index and write `(key, value)` into
    /// it. Fails once the buffer's capacity is exhausted.
    pub fn try_write(&self, key: Key, value: InternalValue) -> Result<()> {
        match &self.storage {
            Storage::Writable { rows, next } => {
                let idx = next.fetch_add(1, Ordering::AcqRel);
                if idx >= rows.len() {
                    return Err(Error::InvalidArgument("buffered keyed data capacity exhausted".into(),));
                }
                rows[idx].set((key, value)).ok().expect("row index claimed via fetch_add is written exactly once");
                Ok(())
            }
            Storage::Sealed {.. } => Err(Error::Sealed),
        }
    }

    /// Number of rows actually written so far (claimed rows that made it
        /// in before capacity was exhausted).
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Writable { rows, next } => {
                next.load(Ordering::Acquire).min(rows.len())
            }
            Storage::Sealed { rows } => rows.len(),
        }
    }

    /// True if no rows have been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seal the buffer: drains claimed rows into a plain, immutable-to-new-
    /// writes `Vec`. Idempotent.
    pub fn seal(self) -> SealedBuffer {
        match self.storage {
            Storage::Writable { mut rows, next } => {
                let written = next.load(Ordering::Acquire).min(rows.len());
                rows.truncate(written);
                let rows = rows.into_iter().map(|cell| cell.into_inner().expect("all cells up to `written` are set")).collect();
                SealedBuffer { rows }
            }
            Storage::Sealed { rows } => SealedBuffer { rows },
        }
    }
}

/// A sealed, owned row vector: immutable to new writes, mutable in place for
/// remap/sort/validate
pub struct SealedBuffer {
    rows: Vec<(Key, InternalValue)>,
}

impl SealedBuffer {
    /// An empty sealed buffer (the identity element for merges).
    pub fn empty() -> Self {
        SealedBuffer { rows: Vec::new() }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    /// True if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Borrow the rows.
    pub fn rows(&self) -> &[(Key, InternalValue)] {
        &self.rows
    }

    /// Take ownership of the rows, consuming the buffer.
    pub fn into_rows(self) -> Vec<(Key, InternalValue)> {
        self.rows
    }

    /// Build directly from already-owned rows (used by the k-way merge and
        /// by tests).
    pub fn from_rows(rows: Vec<(Key, InternalValue)>) -> Self {
        SealedBuffer { rows }
    }

    /// Rewrite every row's key under `converter`, in place. Must not be
    /// called more than once per buffer.
    pub fn remap(&mut self, converter: &KeyConverter) {
        for (key, _) in self.rows.iter_mut() {
            *key = converter.convert(key);
        }
    }

    /// Sort rows by key using an index-based cycle sort: the permutation is
    /// computed over a `Vec<u32>` of indices (word-sized, not a second copy of
    /// the rows) and then realized with in-place swaps directly on the row
    /// vector.
    pub fn sort(&mut self) {
        let n = self.rows().len();
        if n < 2 {
            return;
        }
        let mut order: Vec<u32> = (0..n as u32).collect();
        order.sort_by(|&a, &b| self.rows()[a as usize].0.cmp(&self.rows()[b as usize].0));

        // `order[i]` is the original index that should end up at position
        // `i`. Realize the permutation with cycle-following swaps: O(n)
        // swaps, O(n) auxiliary index storage, no second rows buffer.
        let mut visited = vec![false; n];
        for start in 0..n {
            if visited[start] || order[start] as usize == start {
                visited[start] = true;
                continue;
            }
            let mut i = start;
            loop {
                visited[i] = true;
                let target = order[i] as usize;
                if target == start {
                    break;
                }
                self.rows.swap(i, target);
                i = target;
            }
        }
    }

    /// True if every row's dimension indices lie within `dims`'s current
    /// tables (or are wildcard).
    pub fn validate(&self, dims: &DimensionSet) -> bool {
        self.rows().iter().all(|(key, _)| {
                key.arity() == dims.arity()
                && (0..dims.arity()).all(|slot| {
                        let idx = key.get(slot);
                        idx == perf_core::WILDCARD || (idx as usize) < dims.dimensions()[slot].len()
                })
        })
    }

    /// Iterate `(Key, &InternalValue)` pairs in buffer order, optionally
    /// restricted to rows matching `filter`.
    pub fn iter_matching<'a>(
        &'a self,
        filter: Option<&'a Key>,) -> impl Iterator<Item = (&'a Key, &'a InternalValue)> + 'a {
        self.rows().iter().filter_map(move |(k, v)| match filter {
                Some(f) if !f.matches(k) => None,
                _ => Some((k, v)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perf_data::RawUpdate;

    fn hit(v: i64) -> InternalValue {
        let mut val = InternalValue::new_hit_count();
        val.merge_from_raw(RawUpdate::Scalar(v)).unwrap();
        val
    }

    #[test]
    fn try_write_claims_unique_indices() {
        let buf = BufferedKeyedData::new(4);
        buf.try_write(Key::from_indices([1]), hit(1)).unwrap();
        buf.try_write(Key::from_indices([2]), hit(2)).unwrap();
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn try_write_fails_past_capacity() {
        let buf = BufferedKeyedData::new(1);
        buf.try_write(Key::from_indices([1]), hit(1)).unwrap();
        assert!(buf.try_write(Key::from_indices([2]), hit(2)).is_err());
    }

    #[test]
    fn seal_then_write_fails() {
        let buf = BufferedKeyedData::new(2);
        buf.try_write(Key::from_indices([1]), hit(1)).unwrap();
        let sealed = buf.seal();
        assert_eq!(sealed.len(), 1);
    }

    #[test]
    fn sort_orders_rows_by_key() {
        let mut buf = SealedBuffer::from_rows(vec![
                (Key::from_indices([3]), hit(3)),
                (Key::from_indices([1]), hit(1)),
                (Key::from_indices([2]), hit(2)),
        ]);
        buf.sort();
        let keys: Vec<_> = buf.rows().iter().map(|(k, _)| k.get(0)).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn sort_is_stable_enough_for_distinct_keys_with_repeats() {
        let mut buf = SealedBuffer::from_rows(vec![
                (Key::from_indices([2]), hit(1)),
                (Key::from_indices([1]), hit(2)),
                (Key::from_indices([2]), hit(3)),
                (Key::from_indices([1]), hit(4)),
        ]);
        buf.sort();
        let keys: Vec<_> = buf.rows().iter().map(|(k, _)| k.get(0)).collect();
        assert_eq!(keys, vec![1, 1, 2, 2]);
    }

    #[test]
    fn sort_handles_larger_random_like_permutation() {
        let mut rows: Vec<_> = (0..50).rev().map(|i| (Key::from_indices([i]), hit(i as i64))).collect();
        rows.swap(0, 25);
        rows.swap(10, 40);
        let mut buf = SealedBuffer::from_rows(rows);
        buf.sort();
        let keys: Vec<_> = buf.rows().iter().map(|(k, _)| k.get(0)).collect();
        let mut expected: Vec<_> = keys.clone();
        expected.sort();
        assert_eq!(keys, expected);
    }
}
