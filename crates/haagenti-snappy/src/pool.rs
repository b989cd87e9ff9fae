//! Reusable byte buffers.
//!
//! Frame writers and readers borrow their staging buffers from a
//! [`BufferPool`] for their whole lifetime. A [`PooledBuffer`] returns its
//! storage to the pool when dropped, so every exit path (including errors and
//! panics) releases exactly once.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::trace;

/// Default number of idle buffers a pool keeps.
pub const DEFAULT_MAX_RETAINED: usize = 16;

/// Buffers with more capacity than this are freed instead of retained.
pub const MAX_RETAINED_CAPACITY: usize = 1 << 20;

static SHARED: OnceLock<BufferPool> = OnceLock::new();

/// Internal pool state.
struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
}

impl PoolInner {
    fn free_list(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, len: usize) -> Option<Vec<u8>> {
        let mut free = self.free_list();
        // Best fit, so differently sized borrowers keep their own buffers.
        let (pos, _) = free
            .iter()
            .enumerate()
            .filter(|(_, buf)| buf.capacity() >= len)
            .min_by_key(|(_, buf)| buf.capacity())?;
        Some(free.swap_remove(pos))
    }

    fn give_back(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            trace!(capacity = buf.capacity(), "dropping oversized buffer");
            return;
        }

        let mut free = self.free_list();
        if free.len() < self.max_retained {
            buf.clear();
            free.push(buf);
        }
    }
}

/// A pool of reusable byte buffers.
///
/// Cloning is cheap; clones share the same free list.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool retaining up to [`DEFAULT_MAX_RETAINED`] idle buffers.
    pub fn new() -> Self {
        Self::with_max_retained(DEFAULT_MAX_RETAINED)
    }

    /// Create a pool retaining up to `max_retained` idle buffers.
    pub fn with_max_retained(max_retained: usize) -> Self {
        BufferPool {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                max_retained,
            }),
        }
    }

    /// The process-wide pool used when no pool is supplied.
    pub fn shared() -> &'static BufferPool {
        SHARED.get_or_init(BufferPool::new)
    }

    /// Borrow a zeroed buffer of exactly `len` bytes.
    pub fn acquire(&self, len: usize) -> PooledBuffer {
        let mut data = self
            .inner
            .take(len)
            .unwrap_or_else(|| Vec::with_capacity(len));
        data.resize(len, 0);

        PooledBuffer {
            data,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of idle buffers currently held.
    pub fn retained(&self) -> usize {
        self.inner.free_list().len()
    }

    /// Free every idle buffer.
    pub fn clear(&self) {
        self.inner.free_list().clear();
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("retained", &self.retained())
            .field("max_retained", &self.inner.max_retained)
            .finish()
    }
}

/// A buffer on loan from a [`BufferPool`].
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.give_back(data);
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}
