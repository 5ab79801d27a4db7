//! A counter's full time series: an ordered list of [`DataBucket`]s plus the
//! maintenance and compaction policies that govern their lifecycle.

use crate::bucket::DataBucket;
use crate::config::BucketConfig;
use crate::events::{Event, EventBus};
use crate::source_set::SourceStatus;
use parking_lot::RwLock;
use perf_core::{align_down, DimensionSet, DurationMs, Error, Key, Result, Timestamp};
use perf_data::InternalValue;
use perf_format::DataTypeCode;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// The name the local host registers itself as in a newly-created bucket's
/// source set.
const LOCAL_HOST: &str = "local";

/// One counter's buckets, newest-first, plus the policy knobs that drive
/// sealing, deletion, and interval roll-up.
pub struct DataSet {
    counter_name: String,
    dir: PathBuf,
    dims: DimensionSet,
    value_kind: DataTypeCode,
    config: BucketConfig,
    events: Arc<EventBus>,
    /// Sorted descending by `start_time` -- `buckets[0]` is always the newest.
    buckets: RwLock<Vec<Arc<DataBucket>>>,
    compaction_in_progress: AtomicBool,
}

impl DataSet {
    /// A new, empty data set for one counter.
    pub fn new(
        counter_name: impl Into<String>,
        dir: PathBuf,
        dims: DimensionSet,
        value_kind: DataTypeCode,
        config: BucketConfig,
        events: Arc<EventBus>,
    ) -> Self {
        DataSet {
            counter_name: counter_name.into(),
            dir,
            dims,
            value_kind,
            config,
            events,
            buckets: RwLock::new(Vec::new()),
            compaction_in_progress: AtomicBool::new(false),
        }
    }

    /// The counter name this set belongs to.
    pub fn counter_name(&self) -> &str {
        &self.counter_name
    }

    /// Number of buckets currently tracked (loaded or not).
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Append a value at `ts`: locate or create the covering bucket and
    /// forward the write; writes landing before the earliest unsealed
    /// bucket's start are rejected silently and recorded as an event rather
    /// than returned as an error.
    pub fn add_value(&self, key: Key, value: InternalValue, ts: Timestamp) -> Result<()> {
        match self.get_or_create_data_bucket(ts, true)? {
            Some(bucket) => match bucket.add_value(key, value) {
                Ok(()) => Ok(()),
                Err(e) if e.is_ingest_swallowable() => {
                    self.events.push(Event::WriteRejectedTooOld {
                        counter: self.counter_name().to_string(),
                        timestamp: ts,
                    });
                    Ok(())
                }
                Err(e) => Err(e),
            },
            None => {
                self.events.push(Event::WriteRejectedTooOld {
                    counter: self.counter_name().to_string(),
                    timestamp: ts,
                });
                Ok(())
            }
        }
    }

    fn earliest_unsealed_bucket_time(&self) -> Option<Timestamp> {
        self.buckets.read().iter().filter(|b| !b.is_sealed()).map(|b| b.start_time).min()
    }

    /// Find the bucket covering `ts`, creating one at the finest configured
    /// interval if missing and not too old. Returns `None` if `ts` precedes
    /// the earliest unsealed bucket.
    pub fn get_or_create_data_bucket(
        &self,
        ts: Timestamp,
        add_source_data: bool,
    ) -> Result<Option<Arc<DataBucket>>> {
        {
            let buckets = self.buckets.read();
            if let Some(b) = buckets.iter().find(|b| b.start_time <= ts && ts < b.end_time) {
                return Ok(Some(b.clone()));
            }
        }

        if let Some(earliest) = self.earliest_unsealed_bucket_time() {
            if ts < earliest {
                return Ok(None);
            }
        }

        let interval = self.config.compaction.finest_interval();
        let start = align_down(ts, interval);
        let end = start + interval;
        let bucket = Arc::new(DataBucket::new(
            self.counter_name().to_string(),
            self.dims.clone(),
            start,
            end,
            interval,
            self.value_kind(),
        ));
        if add_source_data {
            bucket.set_source_status(LOCAL_HOST, SourceStatus::Available);
        }

        {
            let mut buckets = self.buckets.write();
            // Another writer may have raced us to the same interval.
            if let Some(b) = buckets.iter().find(|b| b.start_time == start) {
                return Ok(Some(b.clone()));
            }
            let pos = buckets.iter().position(|b| b.start_time < start).unwrap_or(buckets.len());
            buckets.insert(pos, bucket.clone());
        }

        self.maintenance_scan()?;
        Ok(Some(bucket))
    }

    /// Walk buckets oldest-to-newest: delete those past `max_data_age`, seal
    /// those past `seal_time`.
    pub fn maintenance_scan(&self) -> Result<()> {
        let latest = match self.buckets.read().iter().map(|b| b.end_time).max() {
            Some(l) => l,
            None => return Ok(()),
        };
        let max_age_cutoff = latest - self.config.max_data_age;
        let seal_cutoff = latest - self.config.seal_time;

        let snapshot: Vec<Arc<DataBucket>> = self.buckets.read().clone();
        let mut ordered: Vec<&Arc<DataBucket>> = snapshot.iter().collect();
        ordered.sort_by_key(|b| b.start_time);

        let mut to_delete = Vec::new();
        for bucket in ordered {
            if bucket.end_time <= max_age_cutoff {
                to_delete.push(bucket.start_time);
                continue;
            }
            if bucket.end_time <= seal_cutoff && !bucket.is_sealed() {
                bucket.seal()?;
                bucket.persist(&self.dir)?;
                info!(counter = %self.counter_name(), start = bucket.start_time, end = bucket.end_time, "sealed bucket");
                self.events.push(Event::BucketSealed {
                    counter: self.counter_name().to_string(),
                    start_time: bucket.start_time,
                    end_time: bucket.end_time,
                });
            }
        }

        if !to_delete.is_empty() {
            let mut buckets = self.buckets.write();
            for start in to_delete {
                if let Some(pos) = buckets.iter().position(|b| b.start_time == start) {
                    let removed = buckets.remove(pos);
                    removed.delete_files(&self.dir);
                }
            }
        }
        Ok(())
    }

    /// Roll sealed buckets up to their age-correct interval, mutually
    /// exclusive with itself via a compare-and-swap flag.
    pub fn compact(&self) -> Result<()> {
        if self
            .compaction_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        let result = self.compact_inner();
        self.compaction_in_progress.store(false, Ordering::Release);
        result
    }

    fn compact_inner(&self) -> Result<()> {
        let latest = match self.buckets.read().iter().map(|b| b.end_time).max() {
            Some(l) => l,
            None => return Ok(()),
        };

        let mut groups: std::collections::HashMap<(DurationMs, Timestamp), Vec<Arc<DataBucket>>> =
            std::collections::HashMap::new();
        for bucket in self.buckets.read().iter() {
            if !bucket.is_sealed() {
                continue;
            }
            let age = latest - bucket.end_time;
            let target_interval = self.config.compaction.interval_for_age(age);
            if target_interval <= bucket.interval {
                continue;
            }
            let coarse_start = align_down(bucket.start_time, target_interval);
            groups.entry((target_interval, coarse_start)).or_default().push(bucket.clone());
        }

        for ((interval, coarse_start), group) in groups {
            self.compact_group(interval, coarse_start, group)?;
        }
        Ok(())
    }

    fn compact_group(
        &self,
        interval: DurationMs,
        coarse_start: Timestamp,
        group: Vec<Arc<DataBucket>>,
    ) -> Result<()> {
        if group.iter().any(|b| !b.is_sealed()) {
            return Err(Error::InvalidArgument(
                "a compaction group must be built only from sealed buckets".into(),
            ));
        }
        let coarse_end = coarse_start + interval;
        let destination = Arc::new(DataBucket::new(
            self.counter_name().to_string(),
            self.dims.clone(),
            coarse_start,
            coarse_end,
            interval,
            self.value_kind(),
        ));

        let input_count = group.len();
        for source_bucket in &group {
            let rows = source_bucket.snapshot_rows()?;
            destination.update_data_from_sources(&[], source_bucket.dimension_set(), rows)?;
            for (name, status) in source_bucket.source_entries() {
                destination.set_source_status(name, status);
            }
        }
        destination.seal()?;
        destination.persist(&self.dir)?;

        {
            let mut buckets = self.buckets.write();
            for source_bucket in &group {
                if let Some(pos) = buckets.iter().position(|b| Arc::ptr_eq(b, source_bucket)) {
                    let removed = buckets.remove(pos);
                    removed.delete_files(&self.dir);
                }
            }
            let pos = buckets.iter().position(|b| b.start_time < coarse_start).unwrap_or(buckets.len());
            buckets.insert(pos, destination);
        }

        self.events.push(Event::BucketsCompacted {
            counter: self.counter_name().to_string(),
            input_count,
            new_interval: interval,
        });
        Ok(())
    }

    /// Write every bucket whose start time falls in `[start, end)`,
    /// sequentially, to `out`.
    pub fn serialize(&self, start: Timestamp, end: Timestamp, out: &mut Vec<u8>) -> Result<()> {
        let snapshot: Vec<Arc<DataBucket>> = self
            .buckets
            .read()
            .iter()
            .filter(|b| b.start_time >= start && b.start_time < end)
            .cloned()
            .collect();
        for bucket in snapshot {
            bucket.serialize(out)?;
        }
        Ok(())
    }

    /// Scan newest-to-oldest for the first unsealed bucket past
    /// `previous_start_time` with pending sources, preferring the one with
    /// the most pending sources among ties; wrap once from the minimum time
    /// if nothing qualifies past it.
    pub fn get_next_pending_data(&self, previous_start_time: Timestamp) -> Option<Arc<DataBucket>> {
        let buckets = self.buckets.read();
        let candidate = |past: bool| {
            buckets
                .iter()
                .filter(|b| {
                    !b.is_sealed()
                        && !b.pending_sources().is_empty()
                        && if past {
                            b.start_time > previous_start_time
                        } else {
                            b.start_time <= previous_start_time
                        }
                })
                .max_by_key(|b| b.pending_sources().len())
                .cloned()
        };
        candidate(true).or_else(|| candidate(false))
    }

    /// Enumerate this counter's directory, reconstructing one `Unloaded`
    /// bucket per on-disk file; files whose time range duplicates an
    /// already-tracked bucket are crash-recovery leftovers and are deleted
    /// rather than reloaded. The newest bucket is preloaded in full.
    /// Simplification: unsealed buckets loaded from disk start with an empty
    /// source set, since source status isn't part of the persisted header's
    /// byte layout we recover from.
    pub fn load_stored_data(&self) -> Result<()> {
        let mut entries: Vec<(String, Timestamp, Timestamp)> = Vec::new();
        match std::fs::read_dir(&self.dir) {
            Ok(read_dir) => {
                for entry in read_dir.flatten() {
                    let file_name = entry.file_name().to_string_lossy().to_string();
                    if let Ok((start, end)) = perf_format::parse_bucket_file_name(&file_name) {
                        entries.push((file_name, start, end));
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::Io(e)),
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut buckets = self.buckets.write();
        for (file_name, start, end) in entries {
            if buckets.iter().any(|b| b.start_time == start && b.end_time == end) {
                warn!(counter = %self.counter_name(), file = %file_name, "duplicate bucket range on disk; deleting leftover");
                let _ = std::fs::remove_file(self.dir.join(&file_name));
                continue;
            }
            let interval = end - start;
            let bucket = Arc::new(DataBucket::from_file(
                self.counter_name().to_string(),
                self.dims.clone(),
                start,
                end,
                interval,
                self.value_kind(),
                self.dir.join(&file_name),
                true,
            ));
            let pos = buckets.iter().position(|b| b.start_time < start).unwrap_or(buckets.len());
            buckets.insert(pos, bucket);
        }
        let newest = buckets.first().cloned();
        drop(buckets);

        if let Some(newest) = newest {
            newest.ensure_loaded()?;
            newest.force_unsealed();
        }
        Ok(())
    }

    /// This set's underlying directory (used by the data manager to derive
    /// per-counter layout).
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// This counter's dimension set.
    pub fn dimension_set(&self) -> &DimensionSet {
        &self.dims
    }

    /// The value kind (hit-count or histogram) every bucket in this set
    /// holds.
    pub fn value_kind(&self) -> DataTypeCode {
        self.value_kind
    }

    /// A read-only snapshot of the current bucket list, newest-first.
    pub fn buckets_snapshot(&self) -> Vec<Arc<DataBucket>> {
        self.buckets.read().clone()
    }
}
