//! Object pool capabilities consumed by the accumulator.
//!
//! The accumulator never constructs its reusable containers itself; every container comes from
//! a caller-supplied [`FetchTaggedPools`] bundle and is returned on every exit path, either by
//! a [`Pooled`] guard or by the output iterator that took ownership of it.

use crate::encoding::{BincodeSegmentDecoder, SegmentDecoder, TagDecoder, TagDecoderOptions};
use crate::error::ClientError;
use crate::iterators::SeriesIterator;

use bytes::Bytes;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A thread-safe source of reusable values.
pub trait ObjectPool<T>: Send + Sync {
    /// Takes a value from the pool. Fails when the pool refuses to hand out more values.
    fn get(&self) -> Result<T, ClientError>;
    /// Returns a value previously obtained from [`ObjectPool::get`].
    fn put(&self, value: T);
}

/// Scoped acquisition: returns the value to its pool on drop unless released with
/// [`Pooled::into_inner`].
pub struct Pooled<T> {
    value: Option<T>,
    pool: Arc<dyn ObjectPool<T>>,
}

impl<T> Pooled<T> {
    pub fn acquire(pool: &Arc<dyn ObjectPool<T>>) -> Result<Self, ClientError> {
        let value = pool.get()?;
        Ok(Self {
            value: Some(value),
            pool: Arc::clone(pool),
        })
    }

    /// Detaches the value; the caller becomes responsible for returning it.
    pub fn into_inner(mut self) -> T {
        self.value.take().expect("pooled value present until released")
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("pooled value present until released")
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pooled value present until released")
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.put(value);
        }
    }
}

/// Sizing for [`SimplePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum number of idle values retained for reuse.
    pub size: usize,
    /// Maximum number of values handed out at once. `None` means unbounded.
    pub max_outstanding: Option<usize>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: 256,
            max_outstanding: None,
        }
    }
}

type Allocator<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Mutex-backed free list with an allocator fallback and an optional outstanding limit.
pub struct SimplePool<T> {
    name: &'static str,
    free: Mutex<Vec<T>>,
    alloc: Allocator<T>,
    opts: PoolOptions,
    outstanding: AtomicUsize,
}

impl<T> std::fmt::Debug for SimplePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimplePool")
            .field("name", &self.name)
            .field("opts", &self.opts)
            .field("outstanding", &self.outstanding.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Send + 'static> SimplePool<T> {
    pub fn new<F>(name: &'static str, opts: PoolOptions, alloc: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            name,
            free: Mutex::new(Vec::with_capacity(opts.size)),
            alloc: Box::new(alloc),
            opts,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Values currently handed out and not yet returned.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Idle values available for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().map(|f| f.len()).unwrap_or(0)
    }
}

impl<T: Send + 'static> ObjectPool<T> for SimplePool<T> {
    fn get(&self) -> Result<T, ClientError> {
        if let Some(max) = self.opts.max_outstanding {
            let reserved = self
                .outstanding
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < max).then_some(n + 1)
                });
            if reserved.is_err() {
                return Err(ClientError::PoolExhausted {
                    pool: self.name.to_string(),
                });
            }
        } else {
            self.outstanding.fetch_add(1, Ordering::AcqRel);
        }

        let recycled = match self.free.lock() {
            Ok(mut free) => free.pop(),
            Err(e) => {
                self.outstanding.fetch_sub(1, Ordering::AcqRel);
                return Err(e.into());
            }
        };
        Ok(recycled.unwrap_or_else(|| (self.alloc)()))
    }

    fn put(&self, value: T) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.opts.size {
                free.push(value);
            }
        }
    }
}

/// The pool capabilities needed to materialize fetch-tagged results.
pub trait FetchTaggedPools: Send + Sync {
    /// Multi-segment series iterators.
    fn series_iterator(&self) -> Arc<dyn ObjectPool<SeriesIterator>>;
    /// Containers for a query's series iterators. Callers reserve the needed capacity.
    fn series_iterators(&self) -> Arc<dyn ObjectPool<Vec<SeriesIterator>>>;
    /// Series ID buffers.
    fn id(&self) -> Arc<dyn ObjectPool<Vec<u8>>>;
    /// Tag payload decoders.
    fn tag_decoder(&self) -> Arc<dyn ObjectPool<TagDecoder>>;
    /// Containers for zero-copy segment handles.
    fn checked_bytes(&self) -> Arc<dyn ObjectPool<Vec<Bytes>>>;
}

/// In-memory [`FetchTaggedPools`] built from [`SimplePool`]s.
#[derive(Debug, Clone)]
pub struct DefaultFetchTaggedPools {
    pub series_iterator: Arc<SimplePool<SeriesIterator>>,
    pub series_iterators: Arc<SimplePool<Vec<SeriesIterator>>>,
    pub id: Arc<SimplePool<Vec<u8>>>,
    pub tag_decoder: Arc<SimplePool<TagDecoder>>,
    pub checked_bytes: Arc<SimplePool<Vec<Bytes>>>,
}

impl Default for DefaultFetchTaggedPools {
    fn default() -> Self {
        Self::new(
            PoolOptions::default(),
            Arc::new(BincodeSegmentDecoder),
            TagDecoderOptions::default(),
        )
    }
}

impl DefaultFetchTaggedPools {
    pub fn new(
        opts: PoolOptions,
        decoder: Arc<dyn SegmentDecoder>,
        tag_opts: TagDecoderOptions,
    ) -> Self {
        Self {
            series_iterator: Arc::new(SimplePool::new("series_iterator", opts, move || {
                SeriesIterator::new(Arc::clone(&decoder))
            })),
            series_iterators: Arc::new(SimplePool::new("series_iterators", opts, Vec::new)),
            id: Arc::new(SimplePool::new("id", opts, Vec::new)),
            tag_decoder: Arc::new(SimplePool::new("tag_decoder", opts, move || {
                TagDecoder::new(tag_opts)
            })),
            checked_bytes: Arc::new(SimplePool::new("checked_bytes", opts, Vec::new)),
        }
    }

    /// Total values handed out across all pools and not yet returned.
    pub fn outstanding(&self) -> usize {
        self.series_iterator.outstanding()
            + self.series_iterators.outstanding()
            + self.id.outstanding()
            + self.tag_decoder.outstanding()
            + self.checked_bytes.outstanding()
    }
}

impl FetchTaggedPools for DefaultFetchTaggedPools {
    fn series_iterator(&self) -> Arc<dyn ObjectPool<SeriesIterator>> {
        self.series_iterator.clone()
    }

    fn series_iterators(&self) -> Arc<dyn ObjectPool<Vec<SeriesIterator>>> {
        self.series_iterators.clone()
    }

    fn id(&self) -> Arc<dyn ObjectPool<Vec<u8>>> {
        self.id.clone()
    }

    fn tag_decoder(&self) -> Arc<dyn ObjectPool<TagDecoder>> {
        self.tag_decoder.clone()
    }

    fn checked_bytes(&self) -> Arc<dyn ObjectPool<Vec<Bytes>>> {
        self.checked_bytes.clone()
    }
}
