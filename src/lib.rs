#![doc = include_str!("../README.md")]
// Declare modules
pub mod accumulator;
pub mod consistency;
pub mod encoding;
pub mod error;
pub mod grouping;
pub mod iterators;
pub mod pools;
pub mod telemetry;
pub mod types;

/// Collects per-shard node responses and merges them into query results.
pub use crate::accumulator::FetchTaggedResultAccumulator;
/// Configuration options for the accumulator.
pub use crate::accumulator::AccumulatorConfig;
/// Read consistency policy, levels, and the per-shard response tracker.
pub use crate::consistency::{
    ConsistencyPolicy, ConsistencyReport, ReadConsistencyLevel, ShardConsistencyResult,
    ShardConsistencyResults,
};
/// Segment and tag payload codecs.
pub use crate::encoding::{
    encode_segment, encode_tags, BincodeSegmentDecoder, SegmentDecoder, TagDecoder,
    TagDecoderOptions,
};
/// Error type for accumulator operations.
pub use crate::error::ClientError;
/// Grouping of sorted results into per-ID runs.
pub use crate::grouping::{count_distinct_ids, for_each_id, sort_by_id};
/// Output views returned by finalization.
pub use crate::iterators::{
    IndexQueryResults, SeriesIterator, SeriesIterators, TaggedId, TaggedIdsIterator,
};
/// Object pool capabilities consumed at finalization.
pub use crate::pools::{
    DefaultFetchTaggedPools, FetchTaggedPools, ObjectPool, PoolOptions, Pooled, SimplePool,
};
/// Structured event hook for observability.
pub use crate::telemetry::{FetchEvent, FetchEventListener};
/// One node's answer for one series ID.
pub use crate::types::IdResult;
/// Ordered, non-unique collection of ID results.
pub use crate::types::IdResults;
/// Terminal outcome of a node response.
pub use crate::types::ResponseOutcome;
/// Type alias for a set of tags (key-value pairs) associated with a series.
pub use crate::types::TagSet;
/// Type alias for a timestamp (nanoseconds since epoch).
pub use crate::types::Timestamp;
/// Type alias for a value in a time series (f64).
pub use crate::types::Value;

/// Default merge-buffer length from which sorting runs on the rayon pool.
pub use crate::accumulator::DEFAULT_PARALLEL_SORT_THRESHOLD;
