//! Lock-free buffer pool for per-read allocations

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free pool of read buffers backed by crossbeam's `ArrayQueue`.
///
/// Every read dispatch acquires one buffer and must release it on all exit
/// paths; the acquired/released counters make that invariant observable.
pub struct BufferPool {
    pool: ArrayQueue<BytesMut>,
    buffer_size: usize,
    acquired: AtomicU64,
    released: AtomicU64,
    hits: AtomicU64,
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub acquired: u64,
    pub released: u64,
    pub hits: u64,
    pub pooled: usize,
}

impl BufferPool {
    /// Create a pool retaining up to `capacity` idle buffers of `buffer_size`
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        Self {
            pool: ArrayQueue::new(capacity.max(1)),
            buffer_size,
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Get a buffer with at least `size` bytes of capacity (lock-free)
    pub fn acquire(&self, size: usize) -> BytesMut {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        if size <= self.buffer_size {
            if let Some(buf) = self.pool.pop() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return buf;
            }
        }
        BytesMut::with_capacity(size)
    }

    /// Return a buffer to the pool (lock-free)
    pub fn release(&self, mut buf: BytesMut) {
        self.released.fetch_add(1, Ordering::Relaxed);
        // Only retain buffers close to the pool's nominal size
        if buf.capacity() >= self.buffer_size / 2 && buf.capacity() <= self.buffer_size * 2 {
            buf.clear();
            let _ = self.pool.push(buf); // Ignore if full
        }
    }

    /// Snapshot the pool counters
    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            pooled: self.pool.len(),
        }
    }
}
