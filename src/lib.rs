//! # PerfCounters
//!
//! An embeddable time-series counter store for high-volume performance
//! metrics — hit counters and histograms, dimensioned by arbitrary
//! key/value pairs, rolled up over time and queryable by time window,
//! dimension filter, and split.
//!
//! # Quick Start
//!
//! ```no_run
//! use perfcounters::{DataManager, DataManagerConfig};
//! use perf_core::{Dimension, DimensionSet};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! fn main() -> perf_core::Result<()> {
//!     let config = DataManagerConfig::builder("./perf-data").build()?;
//!     let manager = DataManager::new(config)?;
//!
//!     let dims = DimensionSet::new(vec![Arc::new(Dimension::new("region")?)])?;
//!     let requests = manager.create_hit_counter("/svc/requests", dims)?;
//!
//!     let mut point = HashMap::new();
//!     point.insert("region".to_string(), "us".to_string());
//!     requests.increment(1, &point, 0)?;
//!
//!     let samples = requests.query(&HashMap::new())?;
//!     assert_eq!(samples.len(), 1);
//!
//!     manager.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! # Counter Kinds
//!
//! | Kind | Purpose | Key Methods |
//! |------|---------|-------------|
//! | **Hit counter** | Running totals (requests, errors, bytes sent) | `increment`, `query` |
//! | **Histogram counter** | Value distributions (latency, size), with optional rounding | `add_value`, `query` |
//!
//! # Architecture
//!
//! [`DataManager`] is the entry point: it owns every counter's [`DataSet`],
//! a bounded background maintenance pool, and the shared event stream that
//! surfaces bucket seals, compactions, and rejected late writes. Each
//! counter's data lives in a time-ordered sequence of [`DataBucket`]s;
//! new writes land in the newest unsealed bucket, buckets seal and persist
//! on a timer, and aged-out buckets are rolled up into coarser intervals
//! by background compaction. [`Sample`] and [`QueryParams`] describe the
//! query surface: time window, dimension glob filters, optional split, and
//! optional aggregation (percentile, average, min, max).
//!
//! Internal codec, storage, and on-disk framing crates are not part of the
//! stable surface; only the re-exports below are.

pub use perf_core::{
    Dimension, DimensionSet, DurationMs, Error, Key, Result, Timestamp,
};
pub use perf_engine::{
    BucketConfig, BucketConfigBuilder, CompactionSchedule, CompactionStep, CounterId, DataBucket,
    DataManager, DataManagerConfig, DataManagerConfigBuilder, Event, EventBus, HistogramCounter,
    HitCounter, QueryEngine, QueryParams, RoundingMode, Sample,
};
pub use perf_data::QueryKind;
