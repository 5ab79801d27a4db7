//! Engine configuration: seal time, max data age, the compaction schedule,
//! and maintenance parallelism.

use perf_core::{DurationMs, Error, Result};
use std::path::PathBuf;

/// One step of a [`CompactionSchedule`]: buckets younger than `duration`
/// (relative to the latest write) are kept at `interval`. The final step's
/// `duration` is `None`, meaning "forever".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStep {
    /// The bucket interval this step rolls buckets up to.
    pub interval: DurationMs,
    /// How long (from the latest write) buckets stay at this interval.
    /// `None` on the last step, meaning "forever".
    pub duration: Option<DurationMs>,
}

/// An ordered sequence of `(interval, duration)` compaction steps. The
/// default mirrors a worked example: 1 min x 2 h, 5 min x 46 h, 10 min x 2
/// d, 20 min x 24 d, 1 h forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionSchedule {
    steps: Vec<CompactionStep>,
}

const MINUTE_MS: DurationMs = 60_000;

impl CompactionSchedule {
    /// Build and eagerly validate a schedule.
    pub fn new(steps: Vec<CompactionStep>) -> Result<Self> {
        let schedule = CompactionSchedule { steps };
        schedule.validate()?;
        Ok(schedule)
    }

    /// A conservative default schedule, good for moderate write volumes.
    pub fn default_schedule() -> Self {
        CompactionSchedule::new(vec![
            CompactionStep { interval: MINUTE_MS, duration: Some(2 * 60 * MINUTE_MS) },
            CompactionStep { interval: 5 * MINUTE_MS, duration: Some(46 * 60 * MINUTE_MS) },
            CompactionStep { interval: 10 * MINUTE_MS, duration: Some(2 * 24 * 60 * MINUTE_MS) },
            CompactionStep { interval: 20 * MINUTE_MS, duration: Some(24 * 24 * 60 * MINUTE_MS) },
            CompactionStep { interval: 60 * MINUTE_MS, duration: None },
        ])
        .expect("the built-in default schedule is valid")
    }

    /// The finest (first) interval, used for new unsealed buckets.
    pub fn finest_interval(&self) -> DurationMs {
        self.steps[0].interval
    }

    /// The steps in coarsening order.
    pub fn steps(&self) -> &[CompactionStep] {
        &self.steps
    }

    /// The interval a bucket of `age` (ms, relative to the latest write)
    /// should be compacted to.
    pub fn interval_for_age(&self, age: DurationMs) -> DurationMs {
        let mut cumulative = 0i64;
        for step in &self.steps {
            match step.duration {
                Some(d) => {
                    cumulative += d;
                    if age < cumulative {
                        return step.interval;
                    }
                }
                None => return step.interval,
            }
        }
        self.steps.last().expect("non-empty schedule").interval
    }

    /// Reject schedules the on-disk file-naming scheme can't support: a
    /// non-minute-aligned interval, a non-increasing interval, or an
    /// interval that isn't an integer multiple of the previous one.
    fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::InvalidArgument("compaction schedule must have at least one step".into()));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.interval <= 0 {
                return Err(Error::InvalidArgument("compaction interval must be positive".into()));
            }
            if step.interval % MINUTE_MS != 0 {
                return Err(Error::InvalidArgument(format!(
                    "compaction interval {} ms is not minute-aligned",
                    step.interval
                )));
            }
            let is_last = i == self.steps.len() - 1;
            if is_last != step.duration.is_none() {
                return Err(Error::InvalidArgument(
                    "only the last compaction step may have an unbounded (forever) duration".into(),
                ));
            }
            if i > 0 {
                let prev = self.steps[i - 1].interval;
                if step.interval <= prev || step.interval % prev != 0 {
                    return Err(Error::InvalidArgument(format!(
                        "compaction interval {} ms must be a larger integer multiple of the previous interval {} ms",
                        step.interval, prev
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Per-counter bucket lifecycle configuration.
#[derive(Debug, Clone)]
pub struct BucketConfig {
    /// How long (ms) after a bucket's end time it is sealed.
    pub seal_time: DurationMs,
    /// How long (ms) after a bucket's end time it is deleted outright.
    pub max_data_age: DurationMs,
    /// The interval roll-up schedule.
    pub compaction: CompactionSchedule,
}

impl BucketConfig {
    /// A builder seeded with the default compaction schedule and
    /// conservative seal/age times.
    pub fn builder() -> BucketConfigBuilder {
        BucketConfigBuilder::default()
    }
}

/// Builder for [`BucketConfig`].
pub struct BucketConfigBuilder {
    seal_time: DurationMs,
    max_data_age: DurationMs,
    compaction: CompactionSchedule,
}

impl Default for BucketConfigBuilder {
    fn default() -> Self {
        BucketConfigBuilder {
            seal_time: 60_000,
            max_data_age: 30 * 24 * 60 * MINUTE_MS,
            compaction: CompactionSchedule::default_schedule(),
        }
    }
}

impl BucketConfigBuilder {
    /// Override the seal time.
    pub fn seal_time(mut self, ms: DurationMs) -> Self {
        self.seal_time = ms;
        self
    }

    /// Override the max data age.
    pub fn max_data_age(mut self, ms: DurationMs) -> Self {
        self.max_data_age = ms;
        self
    }

    /// Override the compaction schedule.
    pub fn compaction(mut self, schedule: CompactionSchedule) -> Self {
        self.compaction = schedule;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<BucketConfig> {
        if self.seal_time <= 0 {
            return Err(Error::InvalidArgument("seal_time must be positive".into()));
        }
        if self.max_data_age <= self.seal_time {
            return Err(Error::InvalidArgument("max_data_age must exceed seal_time".into()));
        }
        Ok(BucketConfig {
            seal_time: self.seal_time,
            max_data_age: self.max_data_age,
            compaction: self.compaction,
        })
    }
}

/// Top-level engine configuration: storage root, bucket lifecycle, and
/// maintenance parallelism.
#[derive(Debug, Clone)]
pub struct DataManagerConfig {
    /// Root directory persisted bucket files live under.
    pub root_dir: PathBuf,
    /// Bucket lifecycle configuration shared by every counter.
    pub bucket: BucketConfig,
    /// Maintenance/compaction thread pool size cap.
    pub parallelism: usize,
}

impl DataManagerConfig {
    /// A builder over `root_dir`.
    pub fn builder(root_dir: impl Into<PathBuf>) -> DataManagerConfigBuilder {
        DataManagerConfigBuilder {
            root_dir: root_dir.into(),
            bucket: None,
            parallelism: 4,
        }
    }
}

/// Builder for [`DataManagerConfig`].
pub struct DataManagerConfigBuilder {
    root_dir: PathBuf,
    bucket: Option<BucketConfig>,
    parallelism: usize,
}

impl DataManagerConfigBuilder {
    /// Override the bucket lifecycle configuration.
    pub fn bucket(mut self, bucket: BucketConfig) -> Self {
        self.bucket = Some(bucket);
        self
    }

    /// Override the maintenance parallelism cap.
    pub fn parallelism(mut self, n: usize) -> Self {
        self.parallelism = n;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<DataManagerConfig> {
        if self.parallelism == 0 {
            return Err(Error::InvalidArgument("parallelism must be at least 1".into()));
        }
        let bucket = match self.bucket {
            Some(b) => b,
            None => BucketConfig::builder().build()?,
        };
        Ok(DataManagerConfig {
            root_dir: self.root_dir,
            bucket,
            parallelism: self.parallelism,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_valid() {
        CompactionSchedule::default_schedule();
    }

    #[test]
    fn non_minute_aligned_interval_rejected() {
        let result = CompactionSchedule::new(vec![CompactionStep { interval: 37_000, duration: None }]);
        assert!(result.is_err());
    }

    #[test]
    fn non_multiple_interval_rejected() {
        let result = CompactionSchedule::new(vec![
            CompactionStep { interval: MINUTE_MS, duration: Some(10 * MINUTE_MS) },
            CompactionStep { interval: 7 * MINUTE_MS, duration: None },
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn interval_for_age_walks_schedule() {
        let schedule = CompactionSchedule::new(vec![
            CompactionStep { interval: MINUTE_MS, duration: Some(10 * MINUTE_MS) },
            CompactionStep { interval: 5 * MINUTE_MS, duration: None },
        ])
        .unwrap();
        assert_eq!(schedule.interval_for_age(0), MINUTE_MS);
        assert_eq!(schedule.interval_for_age(9 * MINUTE_MS), MINUTE_MS);
        assert_eq!(schedule.interval_for_age(11 * MINUTE_MS), 5 * MINUTE_MS);
    }

    #[test]
    fn bucket_config_requires_age_exceeding_seal_time() {
        let result = BucketConfig::builder().seal_time(1000).max_data_age(500).build();
        assert!(result.is_err());
    }
}
