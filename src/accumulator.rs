//! Fetch-tagged result accumulation.
//!
//! One [`FetchTaggedResultAccumulator`] collects the node responses of a single fan-out query,
//! tallies per-shard outcomes, and is finalized exactly once into either merged series
//! iterators or index query results. After [`FetchTaggedResultAccumulator::clear`] it is
//! indistinguishable from a new accumulator and can be returned to a pool.
//!
//! The accumulator does no internal locking: ingest and finalization calls for one query must be
//! serialized by the caller (e.g. a `Mutex` around the accumulator, or a single task draining
//! node responses from a channel).

use crate::consistency::{ConsistencyPolicy, ConsistencyReport, ShardConsistencyResults};
use crate::encoding::TagDecoder;
use crate::error::ClientError;
use crate::grouping::{for_each_id, par_sort_by_id};
use crate::iterators::{
    IndexQueryResults, SeriesIterator, SeriesIteratorPools, SeriesIterators, TaggedId,
    TaggedIdsIterator,
};
use crate::pools::{FetchTaggedPools, Pooled};
use crate::telemetry::{fetch_metrics, noop_event_listener, FetchEvent, FetchEventListener};
use crate::types::{IdResult, IdResults, ResponseOutcome, TagSet};

use std::sync::Arc;
use std::time::Instant;

/// Default working-buffer length from which the merge sort runs on the rayon pool.
pub const DEFAULT_PARALLEL_SORT_THRESHOLD: usize = 4096;

/// Configuration options for the accumulator.
#[derive(Debug, Clone)]
pub struct AccumulatorConfig {
    /// Merge buffers at least this long are sorted in parallel.
    pub parallel_sort_threshold: usize,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn FetchEventListener>,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        AccumulatorConfig {
            parallel_sort_threshold: DEFAULT_PARALLEL_SORT_THRESHOLD,
            event_listener: noop_event_listener(),
        }
    }
}

/// Collects per-shard, per-replica responses to one fetch-tagged query.
#[derive(Debug)]
pub struct FetchTaggedResultAccumulator {
    /// Results per shard. May be longer than the active shard count; extra entries are empty
    /// and kept for their capacity.
    shard_results: Vec<IdResults>,
    /// Merge buffer, filled from `shard_results` at finalization.
    working: IdResults,
    consistency: ShardConsistencyResults,
    policy: ConsistencyPolicy,
    /// False once any node reported it truncated its own results.
    responses_exhaustive: bool,
    last_error: Option<String>,
    finalized: bool,
    config: AccumulatorConfig,
}

impl Default for FetchTaggedResultAccumulator {
    fn default() -> Self {
        Self::with_config(AccumulatorConfig::default())
    }
}

/// What a single ID run turned into.
enum RunOutcome<T> {
    Emitted(T),
    /// Per-ID failure; the ID is left out of the output.
    Excluded(String),
}

/// Limit and exclusion bookkeeping for one finalization.
struct MergeState {
    limit: usize,
    emitted: usize,
    excluded: usize,
    limit_exceeded: bool,
}

impl MergeState {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            emitted: 0,
            excluded: 0,
            limit_exceeded: false,
        }
    }

    fn exclude(&mut self, listener: &Arc<dyn FetchEventListener>, run: &[IdResult], error: String) {
        self.excluded += 1;
        listener.on_event(FetchEvent::SeriesExcluded {
            id: String::from_utf8_lossy(&run[0].id).into_owned(),
            error,
        });
    }

    /// Whether to visit the next run. A limit of zero means unlimited.
    fn continue_after(&mut self, has_more: bool) -> bool {
        if self.limit > 0 && self.emitted >= self.limit && has_more {
            self.limit_exceeded = true;
            return false;
        }
        true
    }

    fn capacity_hint(limit: usize, results: usize) -> usize {
        if limit == 0 {
            results
        } else {
            limit.min(results)
        }
    }
}

impl FetchTaggedResultAccumulator {
    /// Creates an empty accumulator with zero shards.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AccumulatorConfig) -> Self {
        Self {
            shard_results: Vec::new(),
            working: Vec::new(),
            consistency: ShardConsistencyResults::default(),
            policy: ConsistencyPolicy::default(),
            responses_exhaustive: true,
            last_error: None,
            finalized: false,
            config,
        }
    }

    /// Prepares the accumulator for a query spanning `shard_count` shards.
    ///
    /// Discards any previous state, like [`FetchTaggedResultAccumulator::clear`].
    pub fn reset(&mut self, shard_count: usize, policy: ConsistencyPolicy) {
        self.clear();
        if self.shard_results.len() < shard_count {
            self.shard_results.resize_with(shard_count, Vec::new);
        }
        self.consistency.initialize(shard_count);
        self.policy = policy;
    }

    /// Resets all state to that of a new accumulator, keeping allocations for reuse.
    ///
    /// Iterators returned by earlier finalizations own their data and are unaffected.
    pub fn clear(&mut self) {
        for shard in &mut self.shard_results {
            shard.clear();
        }
        self.working.clear();
        self.consistency.initialize(0);
        self.policy = ConsistencyPolicy::default();
        self.responses_exhaustive = true;
        self.last_error = None;
        self.finalized = false;
    }

    pub fn shard_count(&self) -> usize {
        self.consistency.len()
    }

    pub fn policy(&self) -> ConsistencyPolicy {
        self.policy
    }

    pub fn consistency(&self) -> &ShardConsistencyResults {
        &self.consistency
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Number of ingested ID results not yet merged.
    pub fn pending_results(&self) -> usize {
        self.shard_results.iter().map(Vec::len).sum()
    }

    /// Records one node response for `shard`.
    ///
    /// On success the results are appended to the shard's collection; on error they are
    /// discarded and only the tally changes. Returns `true` once the fan-out can stop waiting:
    /// every shard is done, or some shard can no longer reach the requested consistency.
    pub fn ingest<I>(
        &mut self,
        shard: usize,
        results: I,
        outcome: ResponseOutcome,
    ) -> Result<bool, ClientError>
    where
        I: IntoIterator<Item = IdResult>,
    {
        if self.finalized {
            return Err(ClientError::ReuseViolation("ingest after finalization"));
        }
        let shard_count = self.consistency.len();
        if shard >= shard_count {
            return Err(ClientError::InvalidShard { shard, shard_count });
        }

        let tally = match outcome {
            ResponseOutcome::Success { exhaustive } => {
                self.shard_results[shard].extend(results);
                if !exhaustive {
                    self.responses_exhaustive = false;
                }
                *self.consistency.mark_success(shard)?
            }
            ResponseOutcome::Error(error) => {
                fetch_metrics::record_shard_error();
                self.config.event_listener.on_event(FetchEvent::ShardResponseFailed {
                    shard,
                    error: error.clone(),
                });
                self.last_error = Some(error);
                *self.consistency.mark_error(shard)?
            }
        };

        if !tally.done && self.policy.level.is_shard_satisfied(&tally, self.policy.replicas) {
            self.consistency.mark_done(shard)?;
        }
        Ok(self.is_complete())
    }

    /// Whether waiting for more responses can no longer change the outcome of the query.
    pub fn is_complete(&self) -> bool {
        let mut all_done = true;
        for shard in self.consistency.iter() {
            if self
                .policy
                .level
                .is_shard_unachievable(shard, self.policy.replicas)
            {
                return true;
            }
            all_done &= shard.done;
        }
        all_done
    }

    /// Finalizes into merged series iterators, one per distinct ID, sorted by ID.
    ///
    /// At most `limit` series are produced (`0` means unlimited). The returned flag is `true`
    /// only when nothing was dropped by the limit, a node-side limit, a failed shard or a
    /// per-ID decode error.
    pub fn as_encoding_series_iterators(
        &mut self,
        limit: usize,
        pools: &dyn FetchTaggedPools,
    ) -> Result<(SeriesIterators, bool), ClientError> {
        let start = Instant::now();
        let report = self.begin_finalize()?;
        self.collect_sorted();

        let handles = SeriesIteratorPools::from_pools(pools);
        let tag_decoder_pool = pools.tag_decoder();
        let mut tag_decoder = Pooled::acquire(&tag_decoder_pool)?;
        let capacity = MergeState::capacity_hint(limit, self.working.len());
        let mut iters = SeriesIterators::acquire(handles.clone(), capacity)?;

        let listener = &self.config.event_listener;
        let mut merge = MergeState::new(limit);
        let mut fatal = None;
        for_each_id(&self.working, |run, has_more| {
            match build_series(run, &handles, &mut tag_decoder) {
                Ok(RunOutcome::Emitted(iter)) => {
                    iters.push(iter);
                    merge.emitted += 1;
                }
                Ok(RunOutcome::Excluded(error)) => merge.exclude(listener, run, error),
                Err(e) => {
                    fatal = Some(e);
                    return false;
                }
            }
            merge.continue_after(has_more)
        });
        tag_decoder.reset();
        self.working.clear();

        if let Some(e) = fatal {
            return Err(e);
        }
        let exhaustive = self.finish(report, &merge, start);
        Ok((iters, exhaustive))
    }

    /// Finalizes into de-duplicated `(id, tags)` pairs, sorted by ID.
    ///
    /// Tags are decoded once per distinct ID with a pooled decoder. Limit and exhaustiveness
    /// follow [`FetchTaggedResultAccumulator::as_encoding_series_iterators`].
    pub fn as_index_query_results(
        &mut self,
        limit: usize,
        pools: &dyn FetchTaggedPools,
    ) -> Result<IndexQueryResults, ClientError> {
        let start = Instant::now();
        let report = self.begin_finalize()?;
        self.collect_sorted();

        let tag_decoder_pool = pools.tag_decoder();
        let mut tag_decoder = Pooled::acquire(&tag_decoder_pool)?;
        let mut ids = Vec::with_capacity(MergeState::capacity_hint(limit, self.working.len()));

        let listener = &self.config.event_listener;
        let mut merge = MergeState::new(limit);
        for_each_id(&self.working, |run, has_more| {
            match decode_tagged_id(run, &mut tag_decoder) {
                RunOutcome::Emitted(tagged) => {
                    ids.push(tagged);
                    merge.emitted += 1;
                }
                RunOutcome::Excluded(error) => merge.exclude(listener, run, error),
            }
            merge.continue_after(has_more)
        });
        tag_decoder.reset();
        self.working.clear();

        let exhaustive = self.finish(report, &merge, start);
        Ok(IndexQueryResults {
            iterator: TaggedIdsIterator::new(ids),
            exhaustive,
        })
    }

    fn begin_finalize(&mut self) -> Result<ConsistencyReport, ClientError> {
        if self.finalized {
            return Err(ClientError::ReuseViolation(
                "accumulator finalized twice without clear",
            ));
        }
        self.finalized = true;

        self.policy
            .check(&self.consistency, self.last_error.as_deref())
            .map_err(|e| {
                fetch_metrics::record_consistency_failure();
                if let ClientError::ConsistencyUnsatisfied {
                    level,
                    failed_shards,
                    shard_count,
                    ..
                } = &e
                {
                    self.config
                        .event_listener
                        .on_event(FetchEvent::ConsistencyUnsatisfied {
                            level: *level,
                            failed_shards: *failed_shards,
                            shard_count: *shard_count,
                        });
                }
                e
            })
    }

    /// Moves every shard's results into the merge buffer and sorts it by ID.
    fn collect_sorted(&mut self) {
        self.working.clear();
        for shard in &mut self.shard_results {
            self.working.append(shard);
        }
        par_sort_by_id(&mut self.working, self.config.parallel_sort_threshold);
    }

    fn finish(&self, report: ConsistencyReport, merge: &MergeState, start: Instant) -> bool {
        let listener = &self.config.event_listener;
        if merge.limit_exceeded {
            listener.on_event(FetchEvent::LimitExceeded { limit: merge.limit });
        }
        let exhaustive = report.exhaustive
            && self.responses_exhaustive
            && !merge.limit_exceeded
            && merge.excluded == 0;

        fetch_metrics::record_finalize(
            start.elapsed(),
            merge.emitted as u64,
            merge.excluded as u64,
            merge.limit_exceeded,
        );
        listener.on_event(FetchEvent::Finalized {
            series: merge.emitted,
            exhaustive,
        });
        exhaustive
    }
}

fn run_error(run: &[IdResult]) -> String {
    run.iter()
        .find_map(|r| r.error.clone())
        .unwrap_or_else(|| "no usable replica".to_string())
}

/// Builds the merged iterator for one ID run. Only pool failures are returned as errors.
fn build_series(
    run: &[IdResult],
    pools: &SeriesIteratorPools,
    tag_decoder: &mut TagDecoder,
) -> Result<RunOutcome<SeriesIterator>, ClientError> {
    let Some(first) = run.iter().find(|r| !r.is_error()) else {
        return Ok(RunOutcome::Excluded(run_error(run)));
    };

    let mut iter = Pooled::acquire(&pools.series_iterator)?;
    let mut id = Pooled::acquire(&pools.id)?;
    let mut segments = Pooled::acquire(&pools.checked_bytes)?;

    if let Err(e) = tag_decoder.decode_into(&first.encoded_tags, iter.tags_mut()) {
        return Ok(RunOutcome::Excluded(e.to_string()));
    }
    id.clear();
    id.extend_from_slice(&first.id);
    segments.clear();
    for r in run.iter().filter(|r| !r.is_error()) {
        segments.extend(r.segments.iter().cloned());
    }

    let mut iter = iter.into_inner();
    match iter.reset(id.into_inner(), segments.into_inner()) {
        Ok(()) => Ok(RunOutcome::Emitted(iter)),
        Err(e) => {
            pools.recycle(iter);
            Ok(RunOutcome::Excluded(e.to_string()))
        }
    }
}

fn decode_tagged_id(run: &[IdResult], tag_decoder: &mut TagDecoder) -> RunOutcome<TaggedId> {
    let Some(first) = run.iter().find(|r| !r.is_error()) else {
        return RunOutcome::Excluded(run_error(run));
    };
    let mut tags = TagSet::new();
    match tag_decoder.decode_into(&first.encoded_tags, &mut tags) {
        Ok(()) => RunOutcome::Emitted(TaggedId {
            id: first.id.clone(),
            tags,
        }),
        Err(e) => RunOutcome::Excluded(e.to_string()),
    }
}
