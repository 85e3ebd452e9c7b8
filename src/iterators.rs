//! Output views produced by finalizing an accumulator.

use crate::encoding::SegmentDecoder;
use crate::error::ClientError;
use crate::pools::{FetchTaggedPools, ObjectPool};
use crate::types::{TagSet, Timestamp, Value};

use bytes::Bytes;
use std::sync::Arc;

/// Iterator over the merged samples of one series, built from every replica's segments.
///
/// Replica segments overlap, so samples are yielded in timestamp order with duplicate
/// timestamps collapsed; the first replica in the ID run wins. Single reader only.
///
/// Segments are decoded eagerly when the series is loaded at finalization, so a corrupt
/// replica excludes the ID at merge time instead of failing mid-iteration. The cost is that
/// finalization is O(total samples) and each iterator holds its merged samples in memory.
#[derive(Debug)]
pub struct SeriesIterator {
    id: Vec<u8>,
    tags: TagSet,
    segments: Vec<Bytes>,
    samples: Vec<(Timestamp, Value)>,
    pos: usize,
    decoder: Arc<dyn SegmentDecoder>,
}

impl SeriesIterator {
    pub fn new(decoder: Arc<dyn SegmentDecoder>) -> Self {
        Self {
            id: Vec::new(),
            tags: TagSet::new(),
            segments: Vec::new(),
            samples: Vec::new(),
            pos: 0,
            decoder,
        }
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Raw segments merged into this series, from every replica.
    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }

    /// All merged samples, independent of the iteration position.
    pub fn samples(&self) -> &[(Timestamp, Value)] {
        &self.samples
    }

    /// Rewinds iteration to the first sample.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Loads a new series, decoding and merging every segment. On error the iterator still
    /// owns `id` and `segments`; reclaim them with [`SeriesIterator::take_parts`].
    pub(crate) fn reset(&mut self, id: Vec<u8>, segments: Vec<Bytes>) -> Result<(), ClientError> {
        self.id = id;
        self.segments = segments;
        self.samples.clear();
        self.pos = 0;

        for seg in &self.segments {
            self.decoder.decode(seg, &mut self.samples)?;
        }
        self.samples.sort_by_key(|&(ts, _)| ts);
        self.samples.dedup_by_key(|&mut (ts, _)| ts);
        Ok(())
    }

    pub(crate) fn tags_mut(&mut self) -> &mut TagSet {
        &mut self.tags
    }

    /// Detaches the pooled parts, leaving the iterator empty and ready for its own pool.
    pub(crate) fn take_parts(&mut self) -> (Vec<u8>, Vec<Bytes>) {
        self.samples.clear();
        self.tags.clear();
        self.pos = 0;
        (std::mem::take(&mut self.id), std::mem::take(&mut self.segments))
    }
}

impl Iterator for SeriesIterator {
    type Item = (Timestamp, Value);

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.samples.get(self.pos).copied()?;
        self.pos += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.samples.len().saturating_sub(self.pos);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SeriesIterator {}

/// The pools a [`SeriesIterators`] returns its contents to.
#[derive(Clone)]
pub(crate) struct SeriesIteratorPools {
    pub series_iterator: Arc<dyn ObjectPool<SeriesIterator>>,
    pub series_iterators: Arc<dyn ObjectPool<Vec<SeriesIterator>>>,
    pub id: Arc<dyn ObjectPool<Vec<u8>>>,
    pub checked_bytes: Arc<dyn ObjectPool<Vec<Bytes>>>,
}

impl SeriesIteratorPools {
    pub fn from_pools(pools: &dyn FetchTaggedPools) -> Self {
        Self {
            series_iterator: pools.series_iterator(),
            series_iterators: pools.series_iterators(),
            id: pools.id(),
            checked_bytes: pools.checked_bytes(),
        }
    }

    /// Returns a loaded iterator and the parts it owns to their pools.
    pub fn recycle(&self, mut iter: SeriesIterator) {
        let (mut id, mut segments) = iter.take_parts();
        id.clear();
        segments.clear();
        self.id.put(id);
        self.checked_bytes.put(segments);
        self.series_iterator.put(iter);
    }
}

/// The merged series of one fetch-tagged query, sorted by ID.
///
/// Owns pooled iterators; everything goes back to the pools on [`SeriesIterators::close`] or
/// drop. Independent of the accumulator that produced it.
pub struct SeriesIterators {
    iters: Vec<SeriesIterator>,
    pools: Option<SeriesIteratorPools>,
}

impl std::fmt::Debug for SeriesIterators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesIterators")
            .field("len", &self.iters.len())
            .finish()
    }
}

impl SeriesIterators {
    pub(crate) fn acquire(pools: SeriesIteratorPools, capacity: usize) -> Result<Self, ClientError> {
        let mut iters = pools.series_iterators.get()?;
        iters.clear();
        iters.reserve(capacity);
        Ok(Self {
            iters,
            pools: Some(pools),
        })
    }

    pub(crate) fn push(&mut self, iter: SeriesIterator) {
        self.iters.push(iter);
    }

    pub fn len(&self) -> usize {
        self.iters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iters.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&SeriesIterator> {
        self.iters.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SeriesIterator> {
        self.iters.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, SeriesIterator> {
        self.iters.iter_mut()
    }

    /// Returns every iterator and the container to their pools.
    pub fn close(self) {}
}

impl<'a> IntoIterator for &'a mut SeriesIterators {
    type Item = &'a mut SeriesIterator;
    type IntoIter = std::slice::IterMut<'a, SeriesIterator>;

    fn into_iter(self) -> Self::IntoIter {
        self.iters.iter_mut()
    }
}

impl Drop for SeriesIterators {
    fn drop(&mut self) {
        let Some(pools) = self.pools.take() else {
            return;
        };
        let mut iters = std::mem::take(&mut self.iters);
        for iter in iters.drain(..) {
            pools.recycle(iter);
        }
        pools.series_iterators.put(iters);
    }
}

/// A de-duplicated series ID with its decoded tags.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedId {
    pub id: Bytes,
    pub tags: TagSet,
}

/// Iterator over the IDs of an index query result, sorted by ID.
#[derive(Debug)]
pub struct TaggedIdsIterator {
    inner: std::vec::IntoIter<TaggedId>,
}

impl TaggedIdsIterator {
    pub(crate) fn new(ids: Vec<TaggedId>) -> Self {
        Self {
            inner: ids.into_iter(),
        }
    }

    /// Remaining IDs.
    pub fn remaining(&self) -> usize {
        self.inner.len()
    }
}

impl Iterator for TaggedIdsIterator {
    type Item = TaggedId;

    fn next(&mut self) -> Option<TaggedId> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for TaggedIdsIterator {}

/// Result of finalizing an accumulator as an index query.
#[derive(Debug)]
pub struct IndexQueryResults {
    pub iterator: TaggedIdsIterator,
    /// No matching ID was dropped by a limit, a failed shard, or a decode error.
    pub exhaustive: bool,
}
