use crate::consistency::ReadConsistencyLevel;
use thiserror::Error;

/// Error type for fetch-tagged result accumulation.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid shard index: shard={shard}, shard_count={shard_count}")]
    InvalidShard { shard: usize, shard_count: usize },

    /// Too many shards failed to reach the requested read consistency.
    #[error(
        "Read consistency not achieved: level={level}, failed_shards={failed_shards}, shard_count={shard_count}, last_error={last_error:?}"
    )]
    ConsistencyUnsatisfied {
        level: ReadConsistencyLevel,
        failed_shards: usize,
        shard_count: usize,
        /// Most recent shard error reported through ingest, if any.
        last_error: Option<String>,
    },

    #[error("Pool exhausted: {pool}")]
    PoolExhausted { pool: String },

    #[error("Accumulator reuse violation: {0}")]
    ReuseViolation(&'static str),

    #[error("Decode Error: {0}")]
    Decode(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),
}

impl<T> From<std::sync::PoisonError<T>> for ClientError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ClientError::LockError(format!("Mutex/RwLock poisoned: {}", err))
    }
}
