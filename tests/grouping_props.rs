use proptest::prelude::*;
use std::collections::BTreeMap;

use ugnos_client::{for_each_id, sort_by_id, IdResult, ShardConsistencyResults};

fn results_from(ids: &[u8]) -> Vec<IdResult> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            // Single-byte IDs from a small alphabet force plenty of duplicate runs.
            IdResult::new(vec![b'a' + id]).with_error(format!("arrival_{}", i))
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        max_shrink_iters: 1000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_for_each_id_visits_every_result_once(ids in prop::collection::vec(0u8..6, 0..200)) {
        let mut results = results_from(&ids);
        sort_by_id(&mut results);

        let mut expected: BTreeMap<Vec<u8>, usize> = BTreeMap::new();
        for r in &results {
            *expected.entry(r.id.to_vec()).or_default() += 1;
        }

        let mut seen: Vec<(Vec<u8>, usize)> = Vec::new();
        let mut visited = 0;
        let mut last_has_more = None;
        for_each_id(&results, |run, has_more| {
            // Every element of a run shares the run's ID.
            assert!(run.iter().all(|r| r.id == run[0].id));
            seen.push((run[0].id.to_vec(), run.len()));
            visited += run.len();
            last_has_more = Some(has_more);
            true
        });

        prop_assert_eq!(visited, results.len());
        prop_assert_eq!(seen, expected.into_iter().collect::<Vec<_>>());
        if !results.is_empty() {
            prop_assert_eq!(last_has_more, Some(false));
        }
    }

    #[test]
    fn prop_has_more_is_false_only_on_last_run(ids in prop::collection::vec(0u8..6, 1..200)) {
        let mut results = results_from(&ids);
        sort_by_id(&mut results);

        let mut flags = Vec::new();
        for_each_id(&results, |_, has_more| {
            flags.push(has_more);
            true
        });

        let (last, rest) = flags.split_last().unwrap();
        prop_assert!(!*last);
        prop_assert!(rest.iter().all(|&f| f));
    }

    #[test]
    fn prop_early_termination_is_final(
        ids in prop::collection::vec(0u8..6, 1..200),
        stop_after in 1usize..6,
    ) {
        let mut results = results_from(&ids);
        sort_by_id(&mut results);

        let mut calls = 0;
        let mut visited = 0;
        let mut seen_ids = Vec::new();
        for_each_id(&results, |run, _| {
            calls += 1;
            visited += run.len();
            seen_ids.push(run[0].id.clone());
            calls < stop_after
        });

        let mut run_sizes = Vec::new();
        let mut run_ids = Vec::new();
        for_each_id(&results, |run, _| {
            run_sizes.push(run.len());
            run_ids.push(run[0].id.clone());
            true
        });

        let k = stop_after.min(run_sizes.len());
        prop_assert_eq!(calls, k);
        // Exactly the first k runs were visited, nothing after.
        prop_assert_eq!(visited, run_sizes[..k].iter().sum::<usize>());
        prop_assert_eq!(&seen_ids[..], &run_ids[..k]);
    }

    #[test]
    fn prop_sort_keeps_arrival_order_within_runs(ids in prop::collection::vec(0u8..4, 0..100)) {
        let mut results = results_from(&ids);
        sort_by_id(&mut results);

        for_each_id(&results, |run, _| {
            let arrivals: Vec<usize> = run
                .iter()
                .map(|r| {
                    r.error
                        .as_deref()
                        .and_then(|e| e.strip_prefix("arrival_"))
                        .and_then(|n| n.parse().ok())
                        .unwrap()
                })
                .collect();
            assert!(arrivals.windows(2).all(|w| w[0] < w[1]));
            true
        });
    }

    #[test]
    fn prop_tracker_initialize_yields_zeroed_shards(
        sizes in prop::collection::vec(0usize..300, 1..20),
        truncate_first in any::<bool>(),
    ) {
        let mut tracker = ShardConsistencyResults::default();
        for n in sizes {
            // Dirty every shard of the previous round before reinitializing.
            for shard in 0..tracker.len() {
                tracker.mark_success(shard).unwrap();
                tracker.mark_error(shard).unwrap();
                tracker.mark_done(shard).unwrap();
            }
            if truncate_first {
                tracker.truncate(0);
            }
            let capacity = tracker.capacity();
            tracker.initialize(n);

            prop_assert_eq!(tracker.len(), n);
            prop_assert!(tracker.iter().all(|s| s.success == 0 && s.errors == 0 && !s.done));
            if n <= capacity {
                prop_assert_eq!(tracker.capacity(), capacity);
            }
        }
    }
}
