//! A single time-bounded container of keyed data for one counter. State
//! machine: `Unsealed -> Sealed`; `Loaded <-> Unloaded` (only sealed buckets
//! may legitimately unload); `Exists -> Deleted` (terminal, modeled by the
//! owning `DataSet` dropping its `Arc`).

use crate::source_set::{SourceSet, SourceStatus};
use parking_lot::{Mutex, RwLock};
use perf_core::{DimensionSet, DurationMs, Error, Key, Result, Timestamp};
use perf_data::InternalValue;
use perf_format::{self, DataTypeCode, SourceEntry};
use perf_store::KeyedDataStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// In-memory data that is dropped on `release_data` and rebuilt on
/// `ensure_loaded` for a sealed bucket with a clean on-disk copy.
enum LiveData {
    Loaded(KeyedDataStore),
    Unloaded,
}

/// One time interval's worth of a counter's keyed data.
pub struct DataBucket {
    /// The owning counter's name (for logging and header round-trips).
    pub name: String,
    /// This bucket's start time, ms since Unix epoch UTC.
    pub start_time: Timestamp,
    /// This bucket's end time (exclusive), ms since Unix epoch UTC.
    pub end_time: Timestamp,
    /// The interval this bucket currently represents.
    pub interval: DurationMs,
    value_kind: DataTypeCode,
    dims: DimensionSet,
    data: RwLock<LiveData>,
    sources: Mutex<SourceSet>,
    sealed: AtomicBool,
    deleted: AtomicBool,
    file_path: Mutex<Option<PathBuf>>,
}

impl DataBucket {
    /// A new, unsealed, in-memory bucket.
    pub fn new(
        name: impl Into<String>,
        dims: DimensionSet,
        start_time: Timestamp,
        end_time: Timestamp,
        interval: DurationMs,
        value_kind: DataTypeCode,
    ) -> Self {
        DataBucket {
            name: name.into(),
            start_time,
            end_time,
            interval,
            value_kind,
            data: RwLock::new(LiveData::Loaded(KeyedDataStore::new(dims.clone()))),
            dims,
            sources: Mutex::new(SourceSet::new()),
            sealed: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            file_path: Mutex::new(None),
        }
    }

    /// True once `seal` has run.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// True once `release_data` has dropped the in-memory store.
    pub fn is_loaded(&self) -> bool {
        matches!(&*self.data.read(), LiveData::Loaded(_))
    }

    /// True once removed from its data set (informational; the `DataSet`
    /// actually enforces this by dropping its `Arc`).
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    fn empty_value(&self) -> InternalValue {
        match self.value_kind {
            DataTypeCode::HitCount => InternalValue::new_hit_count(),
            DataTypeCode::Histogram => InternalValue::new_histogram(),
        }
    }

    /// Append one value, keyed by `key`. Fails with `Sealed` once sealed.
    pub fn add_value(&self, key: Key, value: InternalValue) -> Result<()> {
        if self.is_sealed() {
            return Err(Error::Sealed);
        }
        let guard = self.data.read();
        // `seal` holds `data` exclusively across its merge-then-flag-set, so
        // this second check, now synchronized against that write lock, is
        // what actually makes the seal transition atomic with respect to a
        // writer that passed the first check just before the seal happened.
        if self.is_sealed() {
            return Err(Error::Sealed);
        }
        match &*guard {
            LiveData::Loaded(store) => store.append(key, value),
            LiveData::Unloaded => Err(Error::InvalidArgument("cannot write to an unloaded bucket".into())),
        }
    }

    fn with_loaded<R>(&self, f: impl FnOnce(&KeyedDataStore) -> Result<R>) -> Result<R> {
        let guard = self.data.read();
        match &*guard {
            LiveData::Loaded(store) => f(store),
            LiveData::Unloaded => Err(Error::InvalidArgument("bucket data is unloaded; call ensure_loaded first".into())),
        }
    }

    /// As [`DataBucket::with_loaded`], but holds `data` exclusively. Used by
    /// the handful of operations the locking model reserves the exclusive
    /// lock for: `seal` and `update_data_from_sources`.
    fn with_loaded_exclusive<R>(&self, f: impl FnOnce(&KeyedDataStore) -> Result<R>) -> Result<R> {
        let guard = self.data.write();
        match &*guard {
            LiveData::Loaded(store) => f(store),
            LiveData::Unloaded => Err(Error::InvalidArgument("bucket data is unloaded; call ensure_loaded first".into())),
        }
    }

    /// Merge every row matching `filter` into a single accumulated value.
    pub fn get_matches(&self, filter: &Key) -> Result<InternalValue> {
        self.get_matches_filtered(filter, |_| true)
    }

    /// As [`DataBucket::get_matches`], with an extra row-level predicate
    /// (used by the query engine for glob-pattern dimension filters that a
    /// `Key`'s wildcard-or-exact matching can't express).
    pub fn get_matches_filtered(
        &self,
        filter: &Key,
        predicate: impl Fn(&Key) -> bool,
    ) -> Result<InternalValue> {
        self.with_loaded(|store| {
            store.merge()?;
            let merged = store.query_merged();
            let mut acc = self.empty_value();
            for (key, value) in merged.iter_matching(Some(filter)) {
                if predicate(key) {
                    acc.merge_from(value)?;
                }
            }
            Ok(acc)
        })
    }

    /// One accumulated match per distinct value of the dimension at
    /// `split_slot`; `filter`'s slot at `split_slot` is forced to wildcard
    /// so every value passes through.
    pub fn get_matches_split_by_dimension(
        &self,
        filter: &Key,
        split_slot: usize,
    ) -> Result<HashMap<u32, InternalValue>> {
        self.get_matches_split_by_dimension_filtered(filter, split_slot, |_| true)
    }

    /// As [`DataBucket::get_matches_split_by_dimension`], with an extra
    /// row-level predicate.
    pub fn get_matches_split_by_dimension_filtered(
        &self,
        filter: &Key,
        split_slot: usize,
        predicate: impl Fn(&Key) -> bool,
    ) -> Result<HashMap<u32, InternalValue>> {
        let mut filter = filter.clone();
        filter.set(split_slot, perf_core::WILDCARD);
        self.with_loaded(|store| {
            store.merge()?;
            let merged = store.query_merged();
            let mut out: HashMap<u32, InternalValue> = HashMap::new();
            for (key, value) in merged.iter_matching(Some(&filter)) {
                if !predicate(key) {
                    continue;
                }
                match out.get_mut(&key.get(split_slot)) {
                    Some(acc) => acc.merge_from(value)?,
                    None => {
                        out.insert(key.get(split_slot), value.clone());
                    }
                }
            }
            Ok(out)
        })
    }

    /// The value string at `slot` for every matching row, duplicates allowed.
    pub fn get_dimension_values(&self, slot: usize, filter: &Key) -> Result<Vec<String>> {
        self.with_loaded(|store| {
            store.merge()?;
            let merged = store.query_merged();
            let dim = &self.dims.dimensions()[slot];
            Ok(merged.iter_matching(Some(filter)).map(|(key, _)| dim.string_at(key.get(slot))).collect())
        })
    }

    /// Flush unmerged data into the merged store and mark sealed. Subsequent
    /// writes fail.
    pub fn seal(&self) -> Result<()> {
        // Held across both the merge and the flag set: a concurrent
        // `add_value` that re-checks `is_sealed` after acquiring `data` for
        // read must see this store, not just the merge.
        let guard = self.data.write();
        match &*guard {
            LiveData::Loaded(store) => store.merge()?,
            LiveData::Unloaded => {
                return Err(Error::InvalidArgument("bucket data is unloaded; call ensure_loaded first".into()))
            }
        }
        self.sealed.store(true, Ordering::Release);
        Ok(())
    }

    /// If dirty and a directory is configured, write the merged data to
    /// disk and clear the dirty flag. Returns whether a write happened.
    pub fn persist(&self, dir: &std::path::Path) -> Result<bool> {
        let dirty = self.with_loaded(|store| Ok(store.is_dirty()))?;
        if !dirty {
            return Ok(false);
        }
        let bytes = self.with_loaded(|store| {
            store.merge()?;
            let merged = store.query_merged();
            let rows: Vec<_> = merged.rows().to_vec();
            let sources: Vec<SourceEntry> = self
                .sources
                .lock()
                .entries()
                .map(|(name, status)| SourceEntry {
                    name: name.to_string(),
                    status: status.to_i32(),
                })
                .collect();
            let mut out = Vec::new();
            perf_format::write_bucket(
                &mut out,
                &self.name,
                self.start_time,
                self.end_time,
                &sources,
                &self.dims,
                &rows,
            )?;
            Ok(out)
        })?;

        std::fs::create_dir_all(dir).map_err(Error::Io)?;
        let file_name = perf_format::bucket_file_name(self.start_time, self.end_time);
        let path = dir.join(&file_name);
        let tmp_path = dir.join(format!("{file_name}.tmp"));
        std::fs::write(&tmp_path, &bytes).map_err(Error::Io)?;
        std::fs::rename(&tmp_path, &path).map_err(Error::Io)?;
        *self.file_path.lock() = Some(path);
        self.with_loaded(|store| {
            store.mark_clean();
            Ok(())
        })?;
        info!(counter = %self.name, start = self.start_time, end = self.end_time, "persisted bucket");
        Ok(true)
    }

    /// Persist if dirty, then drop in-memory data. Only meaningful for a
    /// sealed bucket with a known on-disk file; metadata is retained.
    pub fn release_data(&self, dir: &std::path::Path) -> Result<()> {
        if !self.is_sealed() {
            return Err(Error::InvalidArgument("only sealed buckets may release their in-memory data".into()));
        }
        self.persist(dir)?;
        *self.data.write() = LiveData::Unloaded;
        Ok(())
    }

    /// Reload in-memory data from the on-disk file if currently unloaded.
    pub fn ensure_loaded(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let path = self
            .file_path
            .lock()
            .clone()
            .ok_or_else(|| Error::CorruptData("bucket has no on-disk file to reload from".into()))?;
        let load_result = std::fs::read(&path).map_err(Error::Io).and_then(|bytes| {
            let mut cursor = bytes.as_slice();
            perf_format::read_bucket(&mut cursor, None)
        });
        match load_result {
            Ok(decoded) => {
                let store = KeyedDataStore::new(self.dims.clone());
                for (key, value) in decoded.rows {
                    store.append(key, value)?;
                }
                store.merge()?;
                store.mark_clean();
                *self.data.write() = LiveData::Loaded(store);
                Ok(())
            }
            Err(e) => {
                warn!(counter = %self.name, error = %e, "corrupt bucket file on load; reverting to empty");
                let _ = std::fs::remove_file(&path);
                *self.file_path.lock() = None;
                *self.data.write() = LiveData::Loaded(KeyedDataStore::new(self.dims.clone()));
                Ok(())
            }
        }
    }

    /// Stream this bucket's bytes to `out`: verbatim from its clean file
    /// copy when sealed and clean, otherwise freshly serialized from
    /// in-memory state.
    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        let clean_file = self.file_path.lock().clone();
        let is_clean = self.with_loaded(|store| Ok(!store.is_dirty())).unwrap_or(true);
        if self.is_sealed() && is_clean {
            if let Some(path) = clean_file {
                let bytes = std::fs::read(&path).map_err(Error::Io)?;
                out.extend_from_slice(&bytes);
                return Ok(());
            }
        }
        self.ensure_loaded()?;
        self.with_loaded(|store| {
            store.merge()?;
            let merged = store.query_merged();
            let rows: Vec<_> = merged.rows().to_vec();
            let sources: Vec<SourceEntry> = self
                .sources
                .lock()
                .entries()
                .map(|(name, status)| SourceEntry {
                    name: name.to_string(),
                    status: status.to_i32(),
                })
                .collect();
            perf_format::write_bucket(
                out,
                &self.name,
                self.start_time,
                self.end_time,
                &sources,
                &self.dims,
                &rows,
            )
        })
    }

    /// Mark `sources` as `Available`, then absorb `rows` (translated from
    /// `incoming_dims` onto this bucket's dimension set) into the live
    /// store, and mark dirty.
    pub fn update_data_from_sources(
        &self,
        sources: &[String],
        incoming_dims: &DimensionSet,
        rows: Vec<(Key, InternalValue)>,
    ) -> Result<()> {
        for source in sources {
            self.sources.lock().set_status(source, SourceStatus::Available);
        }
        self.with_loaded_exclusive(|store| {
            let incoming = KeyedDataStore::new(incoming_dims.clone());
            for (key, value) in rows {
                incoming.append(key, value)?;
            }
            store.take_data(&incoming)?;
            store.merge()
        })
    }

    /// Source names whose status is still `Unknown`.
    pub fn pending_sources(&self) -> Vec<String> {
        self.sources.lock().pending_sources()
    }

    /// Record `name` as a contributing source with `status`.
    pub fn set_source_status(&self, name: impl Into<String>, status: SourceStatus) {
        self.sources.lock().set_status(name, status);
    }

    /// This bucket's dimension set.
    pub fn dimension_set(&self) -> &DimensionSet {
        &self.dims
    }

    /// All contributing sources and their status (used when folding a
    /// bucket's sources into a compaction group's destination bucket).
    pub fn source_entries(&self) -> Vec<(String, SourceStatus)> {
        self.sources.lock().entries().map(|(name, status)| (name.to_string(), status)).collect()
    }

    /// A full, merged snapshot of this bucket's rows (used to fold a
    /// bucket's data into a compaction group's destination bucket).
    pub fn snapshot_rows(&self) -> Result<Vec<(Key, InternalValue)>> {
        self.with_loaded(|store| {
            store.merge()?;
            Ok(store.query_merged().rows().to_vec())
        })
    }

    /// Remove this bucket's on-disk file, if any.
    pub fn delete_files(&self, dir: &std::path::Path) {
        if let Some(path) = self.file_path.lock().take() {
            let _ = std::fs::remove_file(&path);
        } else {
            let file_name = perf_format::bucket_file_name(self.start_time, self.end_time);
            let _ = std::fs::remove_file(dir.join(file_name));
        }
        self.deleted.store(true, Ordering::Release);
    }

    /// Rebuild a sealed, `Unloaded` bucket bound to an existing on-disk
    /// file (used when reloading a counter's directory at startup).
    pub fn from_file(
        name: impl Into<String>,
        dims: DimensionSet,
        start_time: Timestamp,
        end_time: Timestamp,
        interval: DurationMs,
        value_kind: DataTypeCode,
        path: PathBuf,
        sealed: bool,
    ) -> Self {
        DataBucket {
            name: name.into(),
            start_time,
            end_time,
            interval,
            value_kind,
            dims,
            data: RwLock::new(LiveData::Unloaded),
            sources: Mutex::new(SourceSet::new()),
            sealed: AtomicBool::new(sealed),
            deleted: AtomicBool::new(false),
            file_path: Mutex::new(Some(path)),
        }
    }

    /// Clear the sealed flag. Only used by `load_stored_data` for the
    /// single newest on-disk bucket, which may still be accepting writes.
    pub fn force_unsealed(&self) {
        self.sealed.store(false, Ordering::Release);
    }
}
