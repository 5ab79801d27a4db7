//! The top-level engine handle: a `CounterId -> DataSet` registry, the
//! background maintenance thread pool, and the shared event bus.

use crate::config::DataManagerConfig;
use crate::counter::{CounterId, HistogramCounter, HitCounter, RoundingMode};
use crate::data_set::DataSet;
use crate::events::{Event, EventBus};
use dashmap::DashMap;
use perf_core::{DimensionSet, Error, Result};
use perf_format::DataTypeCode;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Owns every counter's [`DataSet`], a bounded maintenance thread pool, and
/// the event bus counters' seal/compaction/rejection notifications flow
/// through.
pub struct DataManager {
    config: DataManagerConfig,
    counters: DashMap<CounterId, Arc<DataSet>>,
    events: Arc<EventBus>,
    pool: ThreadPool,
    shutting_down: AtomicBool,
}

impl DataManager {
    /// Build a manager rooted at `config.root_dir`, with a maintenance
    /// thread pool capped at `config.parallelism`.
    pub fn new(config: DataManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.root_dir).map_err(Error::Io)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.parallelism)
            .build()
            .map_err(|e| Error::InvalidArgument(format!("failed to build maintenance pool: {e}")))?;
        Ok(DataManager {
            config,
            counters: DashMap::new(),
            events: Arc::new(EventBus::default()),
            pool,
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Create or reopen a hit-count counter.
    pub fn create_hit_counter(&self, name: impl Into<String>, dims: DimensionSet) -> Result<HitCounter> {
        let id = CounterId::new(name)?;
        let data_set = self.get_or_create_data_set(&id, dims, DataTypeCode::HitCount)?;
        Ok(HitCounter::new(id, data_set))
    }

    /// Create or reopen a histogram counter with the given rounding policy.
    pub fn create_histogram_counter(
        &self,
        name: impl Into<String>,
        dims: DimensionSet,
        rounding: RoundingMode,
        factor: i64,
    ) -> Result<HistogramCounter> {
        let id = CounterId::new(name)?;
        let data_set = self.get_or_create_data_set(&id, dims, DataTypeCode::Histogram)?;
        Ok(HistogramCounter::new(id, data_set, rounding, factor))
    }

    fn get_or_create_data_set(
        &self,
        id: &CounterId,
        dims: DimensionSet,
        value_kind: DataTypeCode,
    ) -> Result<Arc<DataSet>> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        if let Some(existing) = self.counters.get(id) {
            if existing.value_kind() != value_kind {
                return Err(Error::InvalidArgument(format!(
                    "counter '{id}' already exists with a different value kind"
                )));
            }
            return Ok((*existing).clone());
        }

        let dir = self
            .config
            .root_dir
            .join(perf_format::counter_directory_name(id.as_str()));
        let data_set = Arc::new(DataSet::new(
            id.as_str(),
            dir,
            dims,
            value_kind,
            self.config.bucket.clone(),
            self.events.clone(),
        ));
        data_set.load_stored_data()?;

        let entry = self.counters.entry(id.clone()).or_insert_with(|| data_set.clone());
        Ok((*entry).clone())
    }

    /// Run one maintenance-and-compaction pass over every counter, spread
    /// across the maintenance pool.
    pub fn flush(&self) -> Result<()> {
        let sets: Vec<Arc<DataSet>> = self.counters.iter().map(|e| Arc::clone(e.value())).collect();
        self.pool.install(|| {
            sets.par_iter().try_for_each(|set| -> Result<()> {
                set.maintenance_scan()?;
                set.compact()
            })
        })
    }

    /// Flag the manager as shutting down and run one last flush. Long-running
    /// loops (compaction iteration) test the flag between units of work and
    /// do not cancel an in-flight unit.
    pub fn shutdown(&self) -> Result<()> {
        self.shutting_down.store(true, Ordering::Release);
        info!("data manager shutting down");
        self.flush()
    }

    /// True once [`DataManager::shutdown`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Drain and return every event queued since the last drain.
    pub fn drain_events(&self) -> Vec<Event> {
        self.events.drain()
    }

    /// Number of counters currently registered.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perf_core::Dimension;
    use std::collections::HashMap;
    use std::sync::Arc as StdArc;

    fn dims() -> DimensionSet {
        DimensionSet::new(vec![StdArc::new(Dimension::new("region").unwrap())]).unwrap()
    }

    fn manager(dir: &std::path::Path) -> DataManager {
        let config = DataManagerConfig::builder(dir).parallelism(2).build().unwrap();
        DataManager::new(config).unwrap()
    }

    #[test]
    fn create_hit_counter_then_query_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let counter = mgr.create_hit_counter("/svc/requests", dims()).unwrap();

        let mut point = HashMap::new();
        point.insert("region".to_string(), "us".to_string());
        counter.increment(5, &point, 0).unwrap();

        let samples = counter.query(&HashMap::new()).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(mgr.counter_count(), 1);
    }

    #[test]
    fn reopening_same_name_with_different_kind_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create_hit_counter("/svc/requests", dims()).unwrap();
        let result = mgr.create_histogram_counter(
            "/svc/requests",
            dims(),
            RoundingMode::None,
            0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn flush_runs_without_error_on_empty_manager() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.flush().unwrap();
    }

    #[test]
    fn shutdown_rejects_new_counters() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.shutdown().unwrap();
        assert!(mgr.is_shutting_down());
        let result = mgr.create_hit_counter("/svc/new", dims());
        assert!(matches!(result, Err(Error::Shutdown)));
    }
}
