//! Lock-step k-way merge of sorted row streams, used to merge the unmerged
//! buffer list into the single merged buffer. Each input stream must already
//! be sorted by key (the result of [`crate::slab::SealedBuffer::sort`]). Rows
//! sharing a key across streams are combined into a single output row via
//! `InternalValue::merge_from`.

use perf_core::{Key, Result};
use perf_data::InternalValue;

/// Merge N sorted row slices into one sorted, duplicate-free row vector.
/// Rows with equal keys (possibly spread across several input streams) are
/// folded together with [`InternalValue::merge_from`].
pub fn merge_sorted(streams: &[&[(Key, InternalValue)]]) -> Result<Vec<(Key, InternalValue)>> {
    let mut cursors = vec![0usize; streams.len()];
    let total: usize = streams.iter().map(|s| s.len()).sum();
    let mut out = Vec::with_capacity(total);

    loop {
        // Find the smallest key among all streams' current cursor position.
        let mut min_key: Option<&Key> = None;
        for (i, stream) in streams.iter().enumerate() {
            if let Some((k, _)) = stream.get(cursors[i]) {
                min_key = match min_key {
                    None => Some(k),
                    Some(current) if k < current => Some(k),
                    other => other,
                };
            }
        }
        let Some(min_key) = min_key.cloned() else {
            break;
        };

        let mut accumulator: Option<InternalValue> = None;
        for (i, stream) in streams.iter().enumerate() {
            while let Some((k, v)) = stream.get(cursors[i]) {
                if *k != min_key {
                    break;
                }
                match &mut accumulator {
                    Some(acc) => acc.merge_from(v)?,
                    None => accumulator = Some(v.clone()),
                }
                cursors[i] += 1;
            }
        }

        out.push((min_key, accumulator.expect("at least one stream contributed this key")));
    }

    Ok(out)
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
    fn merges_disjoint_streams_in_order() {
        let a = vec![(Key::from_indices([1]), hit(1)), (Key::from_indices([3]), hit(3))];
        let b = vec![(Key::from_indices([2]), hit(2)), (Key::from_indices([4]), hit(4))];
        let merged = merge_sorted(&[&a, &b]).unwrap();
        let keys: Vec<_> = merged.iter().map(|(k, _)| k.get(0)).collect();
        assert_eq!(keys, vec![1, 2, 3, 4]);
    }

    #[test]
    fn combines_shared_keys_across_streams() {
        let a = vec![(Key::from_indices([1]), hit(5))];
        let b = vec![(Key::from_indices([1]), hit(7))];
        let c = vec![(Key::from_indices([1]), hit(1))];
        let merged = merge_sorted(&[&a, &b, &c]).unwrap();
        assert_eq!(merged.len(), 1);
        match &merged[0].1 {
            InternalValue::HitCount(h) => assert_eq!(h.value(), 13),
            _ => panic!("expected hit count"),
        }
    }

    #[test]
    fn combines_repeated_keys_within_a_single_stream() {
        let a = vec![
            (Key::from_indices([1]), hit(2)),
            (Key::from_indices([1]), hit(3)),
            (Key::from_indices([2]), hit(9)),
        ];
        let merged = merge_sorted(&[&a]).unwrap();
        assert_eq!(merged.len(), 2);
        match &merged[0].1 {
            InternalValue::HitCount(h) => assert_eq!(h.value(), 5),
            _ => panic!("expected hit count"),
        }
    }

    #[test]
    fn empty_streams_merge_to_empty() {
        let a: Vec<(Key, InternalValue)> = vec![];
        let b: Vec<(Key, InternalValue)> = vec![];
        let merged = merge_sorted(&[&a, &b]).unwrap();
        assert!(merged.is_empty());
    }
}
