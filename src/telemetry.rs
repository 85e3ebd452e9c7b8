use crate::consistency::ReadConsistencyLevel;

use std::sync::Arc;
use std::time::Duration;

/// Structured, in-process event hook for observability.
///
/// This crate is a library; emitting logs directly (e.g. `println!`) is not acceptable for
/// production. Instead, callers can provide an implementation that forwards these events to
/// `tracing`, `log`, metrics, or custom sinks.
pub trait FetchEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: FetchEvent);
}

/// Structured events emitted while accumulating fetch-tagged results.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    ShardResponseFailed { shard: usize, error: String },

    /// A series was dropped from the output because none of its replicas could be used.
    SeriesExcluded { id: String, error: String },

    LimitExceeded { limit: usize },

    ConsistencyUnsatisfied {
        level: ReadConsistencyLevel,
        failed_shards: usize,
        shard_count: usize,
    },

    Finalized { series: usize, exhaustive: bool },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl FetchEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: FetchEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn FetchEventListener> {
    Arc::new(NoopEventListener)
}

/// Metrics instrumentation through the `metrics` facade.
///
/// Library-safe: recording is effectively a no-op until the application installs a recorder.
pub mod fetch_metrics {
    use super::*;

    use ::metrics::{describe_counter, describe_histogram, Unit};

    // --- metric names ---
    //
    // Counters are exposed as `<name>_total` by the Prometheus exporter.

    pub const SHARD_ERRORS: &str = "ugnos_client_fetch_tagged_shard_errors";
    pub const EXCLUDED_IDS: &str = "ugnos_client_fetch_tagged_excluded_ids";
    pub const SERIES_RETURNED: &str = "ugnos_client_fetch_tagged_series_returned";
    pub const LIMIT_EXCEEDED: &str = "ugnos_client_fetch_tagged_limit_exceeded";
    pub const CONSISTENCY_FAILURES: &str = "ugnos_client_fetch_tagged_consistency_failures";
    pub const FINALIZE_DURATION_SECONDS: &str = "ugnos_client_fetch_tagged_finalize_duration_seconds";

    #[inline]
    pub fn record_shard_error() {
        ::metrics::counter!(SHARD_ERRORS).increment(1);
    }

    #[inline]
    pub fn record_finalize(duration: Duration, series: u64, excluded: u64, limit_exceeded: bool) {
        ::metrics::histogram!(FINALIZE_DURATION_SECONDS).record(duration.as_secs_f64());
        if series > 0 {
            ::metrics::counter!(SERIES_RETURNED).increment(series);
        }
        if excluded > 0 {
            ::metrics::counter!(EXCLUDED_IDS).increment(excluded);
        }
        if limit_exceeded {
            ::metrics::counter!(LIMIT_EXCEEDED).increment(1);
        }
    }

    #[inline]
    pub fn record_consistency_failure() {
        ::metrics::counter!(CONSISTENCY_FAILURES).increment(1);
    }

    /// Registers metric descriptions with the installed recorder.
    pub fn describe_metrics() {
        describe_counter!(
            SHARD_ERRORS,
            Unit::Count,
            "Node responses ingested with an error outcome."
        );
        describe_counter!(
            EXCLUDED_IDS,
            Unit::Count,
            "Series IDs dropped from results because every replica entry failed to decode."
        );
        describe_counter!(
            SERIES_RETURNED,
            Unit::Count,
            "De-duplicated series or IDs returned by finalization."
        );
        describe_counter!(
            LIMIT_EXCEEDED,
            Unit::Count,
            "Finalizations truncated by the result limit."
        );
        describe_counter!(
            CONSISTENCY_FAILURES,
            Unit::Count,
            "Finalizations rejected because read consistency was not achieved."
        );
        describe_histogram!(
            FINALIZE_DURATION_SECONDS,
            Unit::Seconds,
            "Time spent merging accumulated responses into an output view."
        );
    }
}
