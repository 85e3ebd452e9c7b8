use bytes::Bytes;
use std::collections::HashMap;

/// Timestamp type (nanoseconds since epoch).
pub type Timestamp = u64;

/// Value type.
pub type Value = f64;

/// TagSet type (using a HashMap for flexibility).
pub type TagSet = HashMap<String, String>;

/// One node's answer for one series ID within a fetch-tagged response.
///
/// All payloads are `Bytes`, so moving results between the per-shard collections and the
/// merge buffer, or handing segments to an iterator, never copies the underlying data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdResult {
    /// Series identifier. Compared byte-wise.
    pub id: Bytes,
    /// Encoded tag payload, decoded only when the ID survives de-duplication.
    pub encoded_tags: Bytes,
    /// Encoded data blocks for this ID from this node, in node order.
    pub segments: Vec<Bytes>,
    /// Set when the node could not produce this ID even though the response succeeded.
    pub error: Option<String>,
}

impl IdResult {
    /// Creates a result carrying only an ID.
    pub fn new(id: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Attaches an encoded tag payload.
    pub fn with_tags(mut self, encoded_tags: Bytes) -> Self {
        self.encoded_tags = encoded_tags;
        self
    }

    /// Appends an encoded data segment.
    pub fn with_segment(mut self, segment: Bytes) -> Self {
        self.segments.push(segment);
        self
    }

    /// Flags this result as failed.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// An ordered, non-unique collection of results. Must be sorted by ID before grouping.
pub type IdResults = Vec<IdResult>;

/// Terminal outcome of one node response, as surfaced by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The node answered. `exhaustive` is false when the node truncated its own result set.
    Success { exhaustive: bool },
    /// The node failed, timed out or was cancelled.
    Error(String),
}

impl ResponseOutcome {
    /// A successful, complete node response.
    pub fn success() -> Self {
        ResponseOutcome::Success { exhaustive: true }
    }

    pub fn error(err: impl Into<String>) -> Self {
        ResponseOutcome::Error(err.into())
    }
}
