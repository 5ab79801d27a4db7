//! The counter lifecycle: time-bucketed keyed storage, background
//! maintenance and roll-up compaction, the dimension-filtered query
//! engine, and the `DataManager` handle tying them together.
//!
//! A counter's data lives in a [`DataSet`]: a time-ordered sequence of
//! [`DataBucket`]s, each an in-memory or on-disk [`perf_store::KeyedDataStore`]
//! keyed by dimension values. New writes land in the newest unsealed
//! bucket; buckets seal on a timer, persist to disk, and are later rolled
//! up into coarser intervals by compaction. [`query::QueryEngine`] answers
//! dimension-filtered, optionally time-combined, optionally percentile/
//! average/min/max-derived queries over one or more buckets.
//!
//! [`DataManager`] is the entry point most callers reach for: it owns every
//! counter's `DataSet`, a bounded maintenance thread pool, and the shared
//! event bus that surfaces seals, rejections, and compactions for polling.

mod bucket;
mod config;
mod counter;
mod data_set;
mod events;
mod manager;
mod query;
mod source_set;

pub use bucket::DataBucket;
pub use config::{
    BucketConfig, BucketConfigBuilder, CompactionSchedule, CompactionStep, DataManagerConfig,
    DataManagerConfigBuilder,
};
pub use counter::{round_sample, CounterId, HistogramCounter, HitCounter, RoundingMode};
pub use data_set::DataSet;
pub use events::{Event, EventBus};
pub use manager::DataManager;
pub use query::{QueryEngine, QueryParams, Sample};
pub use source_set::{SourceSet, SourceStatus};
