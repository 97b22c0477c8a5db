//! Pooled storage for tessellated geometry
//!
//! Tile conversion churns through thousands of short-lived vertex arrays per
//! second of panning. The pool hands out fixed-capacity chunks and takes
//! whole chains back in one splice, so steady-state tessellation does no
//! heap allocation at all.

mod buffer;

pub use buffer::{Chunk, Vertex, VertexBuffer, CHUNK_VERTICES};

use std::sync::{Arc, Mutex, PoisonError};

/// Pool accounting, readable at any time.
///
/// `allocated` counts every chunk ever created, so
/// `in_use == allocated - pooled - dropped` holds across any sequence of
/// acquire/release calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Chunks created over the pool lifetime
    pub allocated: u64,
    /// Acquires served from the free list instead of a fresh allocation
    pub reused: u64,
    /// Chunks freed because the free list was at its retain limit
    pub dropped: u64,
    /// Chunks currently sitting in the free list
    pub pooled: usize,
}

impl PoolStats {
    /// Chunks currently owned by live buffers
    pub fn in_use(&self) -> u64 {
        self.allocated - self.dropped - self.pooled as u64
    }
}

#[derive(Debug)]
struct PoolInner {
    free: Vec<Box<Chunk>>,
    retain_limit: usize,
    allocated: u64,
    reused: u64,
    dropped: u64,
}

/// Shared chunk pool, cloneable across loader threads.
///
/// Ownership of a chunk moves out on [`acquire`](BufferPool::acquire) and
/// moves back in on [`release`](BufferPool::release); a released chunk
/// cannot be touched again. The internal lock covers only the free-list
/// pop/push, never a tessellation pass.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl BufferPool {
    /// Create a pool retaining at most `retain_limit` chunks for reuse
    pub fn new(retain_limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                free: Vec::new(),
                retain_limit,
                allocated: 0,
                reused: 0,
                dropped: 0,
            })),
        }
    }

    /// Hand out a chunk with `used == 0`. Never fails: an empty free list
    /// falls back to allocation.
    pub fn acquire(&self) -> Box<Chunk> {
        let mut inner = self.lock();
        match inner.free.pop() {
            Some(mut chunk) => {
                inner.reused += 1;
                chunk.used = 0;
                chunk
            }
            None => {
                inner.allocated += 1;
                Box::new(Chunk::new())
            }
        }
    }

    /// Take back a whole chain of chunks in one critical section. Chunks
    /// beyond the retain limit are freed instead of pooled so tile churn
    /// spikes cannot grow the pool without bound.
    pub fn release<I>(&self, chunks: I)
    where
        I: IntoIterator<Item = Box<Chunk>>,
    {
        let mut inner = self.lock();
        for chunk in chunks {
            if inner.free.len() < inner.retain_limit {
                inner.free.push(chunk);
            } else {
                inner.dropped += 1;
                drop(chunk);
            }
        }
    }

    /// Number of chunks available for reuse
    pub fn pooled(&self) -> usize {
        self.lock().free.len()
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        PoolStats {
            allocated: inner.allocated,
            reused: inner.reused,
            dropped: inner.dropped,
            pooled: inner.free.len(),
        }
    }

    /// Drop all pooled chunks, e.g. on render-surface loss
    pub fn clear(&self) {
        let mut inner = self.lock();
        let n = inner.free.len() as u64;
        inner.free.clear();
        inner.dropped += n;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        // a poisoned free list is still a valid free list
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release_reuses() {
        let pool = BufferPool::new(16);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.stats().allocated, 2);

        pool.release([a, b]);
        assert_eq!(pool.pooled(), 2);

        let c = pool.acquire();
        assert_eq!(c.used, 0);
        let stats = pool.stats();
        assert_eq!(stats.allocated, 2);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.pooled, 1);
    }

    #[test]
    fn test_retain_limit_drops_excess() {
        let pool = BufferPool::new(2);
        let chunks: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        pool.release(chunks);

        let stats = pool.stats();
        assert_eq!(stats.pooled, 2);
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.allocated, 5);
        assert_eq!(stats.in_use(), 0);
    }

    #[test]
    fn test_conservation_across_mixed_traffic() {
        let pool = BufferPool::new(4);
        let mut held = Vec::new();
        for round in 0..10 {
            for _ in 0..round % 4 + 1 {
                held.push(pool.acquire());
            }
            if round % 2 == 0 {
                let half = held.len() / 2;
                pool.release(held.drain(half..));
            }
            let stats = pool.stats();
            assert_eq!(stats.in_use(), held.len() as u64);
        }
    }
}
