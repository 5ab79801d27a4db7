//! The query engine: turns a flat parameter dictionary into a stream of
//! samples over a counter's data set.

use crate::data_set::DataSet;
use perf_core::{Error, Key, Result, Timestamp, WILDCARD};
use perf_data::{Derived, InternalValue, QueryKind};
use std::collections::HashMap;

const PARAM_START: &str = "start";
const PARAM_END: &str = "end";
const PARAM_DIMENSION: &str = "dimension";
const PARAM_AGGREGATE: &str = "aggregate";
const PARAM_PERCENTILE: &str = "percentile";

/// A parsed query, ready to run against a [`DataSet`].
#[derive(Debug, Clone)]
pub struct QueryParams {
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    split_by: Option<String>,
    combine: bool,
    kind: QueryKind,
    /// Remaining `name -> glob pattern` dimension filters.
    filters: HashMap<String, String>,
}

impl QueryParams {
    /// Parse a flat `name -> value` query dict. Reserved names are `start`,
    /// `end`, `dimension` (split-by target), `aggregate` (combine flag),
    /// and `percentile` (a number, or `average`/`minimum`/`maximum`);
    /// everything else is a dimension-value glob filter.
    pub fn parse(dict: &HashMap<String, String>) -> Result<Self> {
        let mut start = None;
        let mut end = None;
        let mut split_by = None;
        let mut combine = false;
        let mut kind = QueryKind::Normal;
        let mut filters = HashMap::new();

        for (key, value) in dict {
            match key.to_ascii_lowercase().as_str() {
                PARAM_START => {
                    start = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| Error::InvalidArgument(format!("invalid start time: {value}")))?,
                    )
                }
                PARAM_END => {
                    end = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| Error::InvalidArgument(format!("invalid end time: {value}")))?,
                    )
                }
                PARAM_DIMENSION => split_by = Some(value.clone()),
                PARAM_AGGREGATE => combine = value.eq_ignore_ascii_case("true"),
                PARAM_PERCENTILE => kind = parse_percentile(value)?,
                _ => {
                    filters.insert(key.clone(), value.clone());
                }
            }
        }

        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Err(Error::InvalidArgument("query start must be earlier than end".into()));
            }
        }

        Ok(QueryParams { start, end, split_by, combine, kind, filters })
    }
}

fn parse_percentile(value: &str) -> Result<QueryKind> {
    match value.to_ascii_lowercase().as_str() {
        "average" => Ok(QueryKind::Average),
        "minimum" => Ok(QueryKind::Min),
        "maximum" => Ok(QueryKind::Max),
        _ => {
            let p: u32 = value.parse().map_err(|_| Error::InvalidArgument(format!("invalid percentile: {value}")))?;
            if p > 100 {
                return Err(Error::InvalidArgument(format!("percentile must be in [0, 100]: {p}")));
            }
            Ok(QueryKind::Percentile(p))
        }
    }
}

/// One query result row: a counter name, the resolved dimension values that
/// produced it, a time range, and a type-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// The counter this sample belongs to.
    pub counter: String,
    /// Resolved dimension values contributing to this sample (the
    /// split-by dimension's value, plus any exact-match filters supplied).
    pub dimension_values: HashMap<String, String>,
    /// Inclusive start time, ms since epoch UTC.
    pub start_time: Timestamp,
    /// Exclusive end time, ms since epoch UTC.
    pub end_time: Timestamp,
    /// The derived payload.
    pub payload: Derived,
}

/// True if `pattern` (containing only `*`/`?` globs) matches `value`.
fn glob_matches(pattern: &str, value: &str) -> bool {
    fn recurse(pattern: &[u8], value: &[u8]) -> bool {
        match pattern.first() {
            None => value.is_empty(),
            Some(b'*') => recurse(&pattern[1..], value) || (!value.is_empty() && recurse(pattern, &value[1..])),
            Some(b'?') => !value.is_empty() && recurse(&pattern[1..], &value[1..]),
            Some(&c) => !value.is_empty() && value[0] == c && recurse(&pattern[1..], &value[1..]),
        }
    }
    recurse(pattern.as_bytes(), value.as_bytes())
}

fn has_glob_metachars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Runs [`QueryParams`] against a counter's [`DataSet`].
pub struct QueryEngine;

impl QueryEngine {
    /// Execute `params` against `data_set`, returning the resulting
    /// samples. Buckets are loaded on demand and released again on exit if
    /// this call was the one that loaded them.
    pub fn query(data_set: &DataSet, counter_name: &str, params: &QueryParams) -> Result<Vec<Sample>> {
        let dims = data_set.dimension_set().clone();
        let buckets = data_set.buckets_snapshot();

        let (window_start, window_end) = match (params.start, params.end) {
            (Some(s), Some(e)) => (s, e),
            (Some(_), None) | (None, Some(_)) => return Ok(Vec::new()),
            (None, None) => {
                let default_start = buckets.iter().map(|b| b.start_time).min();
                let default_end = buckets.iter().map(|b| b.end_time).max();
                match (default_start, default_end) {
                    (Some(s), Some(e)) => (s, e),
                    _ => return Ok(Vec::new()),
                }
            }
        };

        let split_slot = match &params.split_by {
            Some(name) => Some(dims.offset_of(name)?),
            None => None,
        };

        let (base_filter, exact_values, glob_predicate) = build_filter(&dims, &params.filters);

        let mut loaded_by_scan = Vec::new();
        let mut emitted: Vec<Sample> = Vec::new();
        let mut combined: HashMap<Option<u32>, (InternalValue, Timestamp, Timestamp)> = HashMap::new();

        let scanned: Vec<_> = buckets
            .iter()
            .filter(|b| b.start_time < window_end && b.end_time > window_start)
            .cloned()
            .collect();

        let mut run_result: Result<()> = Ok(());
        for bucket in &scanned {
            if !bucket.is_loaded() {
                match bucket.ensure_loaded() {
                    Ok(()) => loaded_by_scan.push(bucket.clone()),
                    Err(e) => {
                        run_result = Err(e);
                        break;
                    }
                }
            }

            let step = (|| -> Result<()> {
                match split_slot {
                    Some(slot) => {
                        let groups =
                            bucket.get_matches_split_by_dimension_filtered(&base_filter, slot, &glob_predicate)?;
                        for (idx, value) in groups {
                            if params.combine {
                                let entry = combined
                                    .entry(Some(idx))
                                    .or_insert_with(|| (empty_like(&value), bucket.start_time, bucket.end_time));
                                entry.0.merge_from(&value)?;
                                entry.1 = entry.1.min(bucket.start_time);
                                entry.2 = entry.2.max(bucket.end_time);
                            } else {
                                let split_value = dims.dimensions()[slot].string_at(idx);
                                emitted.push(finish_sample(
                                    counter_name,
                                    &exact_values,
                                    params.split_by.as_deref().zip(Some(split_value)),
                                    bucket.start_time,
                                    bucket.end_time,
                                    value,
                                    params.kind,
                                )?);
                            }
                        }
                    }
                    None => {
                        let value = bucket.get_matches_filtered(&base_filter, &glob_predicate)?;
                        if params.combine {
                            let entry = combined
                                .entry(None)
                                .or_insert_with(|| (empty_like(&value), bucket.start_time, bucket.end_time));
                            entry.0.merge_from(&value)?;
                            entry.1 = entry.1.min(bucket.start_time);
                            entry.2 = entry.2.max(bucket.end_time);
                        } else {
                            emitted.push(finish_sample(
                                counter_name,
                                &exact_values,
                                None,
                                bucket.start_time,
                                bucket.end_time,
                                value,
                                params.kind,
                            )?);
                        }
                    }
                }
                Ok(())
            })();

            if let Err(e) = step {
                run_result = Err(e);
                break;
            }
        }

        for bucket in &loaded_by_scan {
            if bucket.is_sealed() {
                let _ = bucket.release_data(data_set.directory());
            }
        }
        run_result?;

        if params.combine {
            for (split_idx, (value, start, end)) in combined {
                let split = match (split_slot, split_idx) {
                    (Some(slot), Some(idx)) => {
                        Some((params.split_by.as_deref().unwrap(), dims.dimensions()[slot].string_at(idx)))
                    }
                    _ => None,
                };
                emitted.push(finish_sample(counter_name, &exact_values, split, start, end, value, params.kind)?);
            }
        }

        Ok(emitted)
    }
}

fn empty_like(value: &InternalValue) -> InternalValue {
    match value {
        InternalValue::HitCount(_) => InternalValue::new_hit_count(),
        InternalValue::Histogram(_) => InternalValue::new_histogram(),
    }
}

/// Build the broad wildcard-or-exact `Key` filter used to scan the store,
/// plus the resolved exact-match values (for sample labeling) and a
/// row-level predicate covering any glob-patterned filters a `Key` can't
/// express directly.
fn build_filter(
    dims: &perf_core::DimensionSet,
    filters: &HashMap<String, String>,
) -> (Key, HashMap<String, String>, impl Fn(&Key) -> bool) {
    let mut indices = vec![WILDCARD; dims.arity()];
    let mut exact_values = HashMap::new();
    let mut glob_slots: Vec<(usize, String)> = Vec::new();

    for (i, dim) in dims.dimensions().iter().enumerate() {
        let pattern = filters.iter().find(|(name, _)| name.eq_ignore_ascii_case(dim.name())).map(|(_, pattern)| pattern.clone());
        if let Some(pattern) = pattern {
            if has_glob_metachars(&pattern) {
                glob_slots.push((i, pattern));
            } else {
                exact_values.insert(dim.name().to_string(), pattern.clone());
                indices[i] = dim.try_index_of(&pattern).unwrap_or(u32::MAX - 1);
            }
        }
    }

    let base_filter = Key::from_indices(indices);
    let dims = dims.clone();
    let predicate =
        move |key: &Key| glob_slots.iter().all(|(slot, pattern)| glob_matches(pattern, &dims.dimensions()[*slot].string_at(key.get(*slot))));
    (base_filter, exact_values, predicate)
}

fn finish_sample(
    counter: &str,
    exact_values: &HashMap<String, String>,
    split: Option<(&str, String)>,
    start_time: Timestamp,
    end_time: Timestamp,
    value: InternalValue,
    kind: QueryKind,
) -> Result<Sample> {
    let effective_kind = if value.supports(kind) { kind } else { QueryKind::Normal };
    let payload = value.derive(effective_kind)?;
    let mut dimension_values = exact_values.clone();
    if let Some((name, val)) = split {
        dimension_values.insert(name.to_string(), val);
    }
    Ok(Sample { counter: counter.to_string(), dimension_values, start_time, end_time, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BucketConfig;
    use crate::events::EventBus;
    use perf_core::{Dimension, DimensionSet};
    use perf_data::RawUpdate;
    use perf_format::DataTypeCode;
    use std::sync::Arc;

    fn dims() -> DimensionSet {
        DimensionSet::new(vec![Arc::new(Dimension::new("region").unwrap())]).unwrap()
    }

    fn hit(v: i64) -> InternalValue {
        let mut val = InternalValue::new_hit_count();
        val.merge_from_raw(RawUpdate::Scalar(v)).unwrap();
        val
    }

    fn fresh_set(dir: &std::path::Path, d: DimensionSet) -> DataSet {
        let config = BucketConfig::builder().seal_time(60_000).max_data_age(3_600_000).build().unwrap();
        DataSet::new("/svc/requests", dir.to_path_buf(), d, DataTypeCode::HitCount, config, Arc::new(EventBus::default()))
    }

    #[test]
    fn parses_reserved_params_and_leaves_dimension_filters() {
        let mut dict = HashMap::new();
        dict.insert("start".to_string(), "0".to_string());
        dict.insert("end".to_string(), "1000".to_string());
        dict.insert("dimension".to_string(), "region".to_string());
        dict.insert("aggregate".to_string(), "true".to_string());
        dict.insert("region".to_string(), "us-*".to_string());
        let params = QueryParams::parse(&dict).unwrap();
        assert_eq!(params.start, Some(0));
        assert_eq!(params.end, Some(1000));
        assert_eq!(params.split_by.as_deref(), Some("region"));
        assert!(params.combine);
        assert_eq!(params.filters.get("region").map(String::as_str), Some("us-*"));
    }

    #[test]
    fn start_after_end_is_rejected() {
        let mut dict = HashMap::new();
        dict.insert("start".to_string(), "1000".to_string());
        dict.insert("end".to_string(), "0".to_string());
        assert!(QueryParams::parse(&dict).is_err());
    }

    #[test]
    fn glob_matching_supports_star_and_question_mark() {
        assert!(glob_matches("us-*", "us-east"));
        assert!(!glob_matches("us-*", "eu-west"));
        assert!(glob_matches("us-?", "us-1"));
        assert!(!glob_matches("us-?", "us-12"));
    }

    #[test]
    fn query_without_filters_returns_one_sample_per_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let d = dims();
        let us = d.dimensions()[0].index_of("us");
        let set = fresh_set(dir.path(), d);
        set.add_value(Key::from_indices([us]), hit(5), 0).unwrap();

        let dict = HashMap::new();
        let params = QueryParams::parse(&dict).unwrap();
        let samples = QueryEngine::query(&set, "/svc/requests", &params).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].payload, Derived::HitCount(5));
    }

    #[test]
    fn combine_merges_across_matching_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let d = dims();
        let us = d.dimensions()[0].index_of("us");
        let set = fresh_set(dir.path(), d);
        set.add_value(Key::from_indices([us]), hit(2), 0).unwrap();
        set.add_value(Key::from_indices([us]), hit(3), 60_000).unwrap();

        let mut dict = HashMap::new();
        dict.insert("aggregate".to_string(), "true".to_string());
        let params = QueryParams::parse(&dict).unwrap();
        let samples = QueryEngine::query(&set, "/svc/requests", &params).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].payload, Derived::HitCount(5));
    }

    #[test]
    fn glob_filter_excludes_non_matching_rows() {
        let dir = tempfile::tempdir().unwrap();
        let d = dims();
        let us = d.dimensions()[0].index_of("us-east");
        let eu = d.dimensions()[0].index_of("eu-west");
        let set = fresh_set(dir.path(), d);
        set.add_value(Key::from_indices([us]), hit(4), 0).unwrap();
        set.add_value(Key::from_indices([eu]), hit(9), 0).unwrap();

        let mut dict = HashMap::new();
        dict.insert("region".to_string(), "us-*".to_string());
        let params = QueryParams::parse(&dict).unwrap();
        let samples = QueryEngine::query(&set, "/svc/requests", &params).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].payload, Derived::HitCount(4));
    }
}
