//! Grouping of sorted ID results into per-ID runs.
//!
//! Replica de-duplication relies on a pre-sort plus a single linear scan instead of a keyed map:
//! no per-ID allocation, and the output order is the byte-wise ID order.

use crate::types::IdResult;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Comparator ordering results by ID, byte-wise lexicographic.
#[inline]
pub fn by_id(a: &IdResult, b: &IdResult) -> Ordering {
    a.id.as_ref().cmp(b.id.as_ref())
}

/// Sorts results by ID. Stable, so results sharing an ID keep their arrival order.
pub fn sort_by_id(results: &mut [IdResult]) {
    results.sort_by(by_id);
}

/// Like [`sort_by_id`], switching to rayon's parallel stable sort for large inputs.
pub fn par_sort_by_id(results: &mut [IdResult], parallel_threshold: usize) {
    if results.len() >= parallel_threshold.max(2) {
        results.par_sort_by(by_id);
    } else {
        results.sort_by(by_id);
    }
}

/// Calls `visit` once per distinct ID in `results` with the contiguous run sharing that ID.
///
/// `results` must already be sorted by ID; behavior on unsorted input is unspecified.
/// The second argument is `true` unless the run is the last one. Returning `false` from
/// `visit` stops the walk immediately; no further run is visited.
pub fn for_each_id<F>(results: &[IdResult], mut visit: F)
where
    F: FnMut(&[IdResult], bool) -> bool,
{
    let mut start = 0;
    while start < results.len() {
        let id = &results[start].id;
        let end = start
            + results[start..]
                .iter()
                .position(|r| r.id != *id)
                .unwrap_or(results.len() - start);
        let has_more = end < results.len();
        if !visit(&results[start..end], has_more) {
            return;
        }
        start = end;
    }
}

/// Counts distinct IDs in a sorted collection.
pub fn count_distinct_ids(results: &[IdResult]) -> usize {
    let mut count = 0;
    for_each_id(results, |_, _| {
        count += 1;
        true
    });
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<IdResult> {
        values.iter().map(|v| IdResult::new(v.as_bytes().to_vec())).collect()
    }

    fn run_ids(run: &[IdResult]) -> String {
        String::from_utf8(run[0].id.to_vec()).unwrap()
    }

    #[test]
    fn test_for_each_id_groups_and_flags_last_run() {
        let mut input = ids(&["abc", "def", "abc", "xyz"]);
        sort_by_id(&mut input);

        let mut seen = Vec::new();
        for_each_id(&input, |run, has_more| {
            seen.push((run_ids(run), run.len(), has_more));
            true
        });

        assert_eq!(
            seen,
            vec![
                ("abc".to_string(), 2, true),
                ("def".to_string(), 1, true),
                ("xyz".to_string(), 1, false),
            ]
        );
    }

    #[test]
    fn test_for_each_id_early_terminate() {
        let mut input = ids(&["xyz", "abc", "def", "abc"]);
        sort_by_id(&mut input);

        let mut calls = 0;
        for_each_id(&input, |run, has_more| {
            calls += 1;
            match calls {
                1 => {
                    assert_eq!(run_ids(run), "abc");
                    assert!(has_more);
                    true
                }
                2 => {
                    assert_eq!(run_ids(run), "def");
                    assert!(has_more);
                    false
                }
                _ => panic!("visited {} after termination", run_ids(run)),
            }
        });
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_for_each_id_empty_input() {
        let mut calls = 0;
        for_each_id(&[], |_, _| {
            calls += 1;
            true
        });
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_for_each_id_single_id() {
        let input = ids(&["same", "same", "same"]);
        let mut calls = Vec::new();
        for_each_id(&input, |run, has_more| {
            calls.push((run.len(), has_more));
            true
        });
        assert_eq!(calls, vec![(3, false)]);
    }

    #[test]
    fn test_by_id_is_bytewise() {
        // 0xff sorts after ASCII; a prefix sorts before its extension.
        let mut input = vec![
            IdResult::new(vec![0xffu8]),
            IdResult::new(b"ab".to_vec()),
            IdResult::new(b"a".to_vec()),
        ];
        sort_by_id(&mut input);
        let order: Vec<Vec<u8>> = input.iter().map(|r| r.id.to_vec()).collect();
        assert_eq!(order, vec![b"a".to_vec(), b"ab".to_vec(), vec![0xff]]);
    }

    #[test]
    fn test_sort_keeps_arrival_order_within_id() {
        let mut input = vec![
            IdResult::new(b"b".to_vec()).with_error("first"),
            IdResult::new(b"a".to_vec()),
            IdResult::new(b"b".to_vec()).with_error("second"),
        ];
        par_sort_by_id(&mut input, 1);
        assert_eq!(input[1].error.as_deref(), Some("first"));
        assert_eq!(input[2].error.as_deref(), Some("second"));
    }

    #[test]
    fn test_count_distinct_ids() {
        let mut input = ids(&["c", "a", "b", "a", "c", "c"]);
        sort_by_id(&mut input);
        assert_eq!(count_distinct_ids(&input), 3);
        assert_eq!(count_distinct_ids(&[]), 0);
    }
}
