//! Segment and tag payload codecs.
//!
//! The merge layer treats segment bytes as opaque and hands them to a [`SegmentDecoder`].
//! The default decoder reads bincode-encoded `(timestamp, value)` runs written by
//! [`encode_segment`]. Tag payloads are bincode-encoded, key-sorted `(key, value)` pairs.

use crate::error::ClientError;
use crate::types::{TagSet, Timestamp, Value};

use bytes::Bytes;

/// Decodes one opaque data segment, appending its samples to `out`.
pub trait SegmentDecoder: std::fmt::Debug + Send + Sync + 'static {
    fn decode(&self, segment: &[u8], out: &mut Vec<(Timestamp, Value)>) -> Result<(), ClientError>;
}

/// Decoder for segments produced by [`encode_segment`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeSegmentDecoder;

impl SegmentDecoder for BincodeSegmentDecoder {
    fn decode(&self, segment: &[u8], out: &mut Vec<(Timestamp, Value)>) -> Result<(), ClientError> {
        if segment.is_empty() {
            return Ok(());
        }
        let points: Vec<(Timestamp, Value)> =
            bincode::deserialize(segment).map_err(|e| ClientError::Decode(e.to_string()))?;
        if points.windows(2).any(|w| w[1].0 < w[0].0) {
            return Err(ClientError::Decode(
                "Segment samples are not sorted by timestamp".to_string(),
            ));
        }
        out.extend(points);
        Ok(())
    }
}

/// Encodes a run of samples as a single segment. Samples must be sorted by timestamp.
pub fn encode_segment(points: &[(Timestamp, Value)]) -> Result<Bytes, ClientError> {
    if points.windows(2).any(|w| w[1].0 < w[0].0) {
        return Err(ClientError::Serialization(
            "Samples must be sorted by timestamp".to_string(),
        ));
    }
    let buf = bincode::serialize(points).map_err(|e| ClientError::Serialization(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Encodes a tag set as a canonical, key-sorted payload.
pub fn encode_tags(tags: &TagSet) -> Result<Bytes, ClientError> {
    let mut pairs: Vec<(&str, &str)> = tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    pairs.sort_unstable();
    let buf = bincode::serialize(&pairs).map_err(|e| ClientError::Serialization(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Limits enforced while decoding tag payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagDecoderOptions {
    pub max_tags: usize,
    pub max_literal_len: usize,
}

impl Default for TagDecoderOptions {
    fn default() -> Self {
        Self {
            max_tags: 1 << 16,
            max_literal_len: 1 << 16,
        }
    }
}

/// Reusable tag payload decoder. Pooled; keeps its scratch buffer between uses.
#[derive(Debug, Default)]
pub struct TagDecoder {
    opts: TagDecoderOptions,
    scratch: Vec<(String, String)>,
}

impl TagDecoder {
    pub fn new(opts: TagDecoderOptions) -> Self {
        Self {
            opts,
            scratch: Vec::new(),
        }
    }

    pub fn options(&self) -> TagDecoderOptions {
        self.opts
    }

    /// Decodes `encoded` into `out`, replacing its contents. An empty payload is an empty tag set.
    pub fn decode_into(&mut self, encoded: &[u8], out: &mut TagSet) -> Result<(), ClientError> {
        out.clear();
        self.scratch.clear();
        if encoded.is_empty() {
            return Ok(());
        }
        let pairs: Vec<(String, String)> =
            bincode::deserialize(encoded).map_err(|e| ClientError::Decode(e.to_string()))?;
        self.scratch.extend(pairs);

        if self.scratch.len() > self.opts.max_tags {
            return Err(ClientError::Decode(format!(
                "Too many tags: {} > {}",
                self.scratch.len(),
                self.opts.max_tags
            )));
        }
        for (k, v) in &self.scratch {
            if k.is_empty() {
                return Err(ClientError::Decode("Empty tag name".to_string()));
            }
            if k.len() > self.opts.max_literal_len || v.len() > self.opts.max_literal_len {
                return Err(ClientError::Decode(format!(
                    "Tag literal too long for key {k:?}"
                )));
            }
        }
        out.reserve(self.scratch.len());
        out.extend(self.scratch.drain(..));
        Ok(())
    }

    /// Clears per-use state before the decoder goes back to its pool.
    pub fn reset(&mut self) {
        self.scratch.clear();
    }
}
