//! # Lookup Caches
//!
//! Two independent bounded tiers sit in front of the spatial index:
//!
//! * [`PointCache`] remembers the answer for exact block positions. Repeated
//!   queries from a stationary entity hit here.
//! * [`ChunkCache`] materializes the list of regions overlapping a whole grid
//!   cell. Many distinct positions inside one cell (area scans, viewport
//!   warm-up) hit here.
//!
//! Both evict least-recently-used entries once over capacity, both count hits,
//! misses and invalidations with relaxed atomics, and both share the
//! [`RecencyQueue`] bookkeeping defined below.

pub mod chunk;
pub mod point;

pub use chunk::ChunkCache;
pub use point::{PointCache, PointLookup};

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of one cache tier's counters and occupancy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently held
    pub size: usize,
    /// Configured upper bound on entries
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Invalidation calls that removed at least one entry
    pub invalidations: u64,
    /// Entries dropped to stay within capacity
    pub evictions: u64,
    /// `hits / (hits + misses)`, or 0.0 before the first lookup
    pub hit_rate: f64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={}/{}, hits={}, misses={}, hit_rate={:.1}%, invalidations={}, evictions={}",
            self.size,
            self.capacity,
            self.hits,
            self.misses,
            self.hit_rate * 100.0,
            self.invalidations,
            self.evictions
        )
    }
}

/// Lock-free statistics counters shared by both cache tiers.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, size: usize, capacity: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            size,
            capacity,
            hits,
            misses,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }
}

/// Access-order log for LRU eviction.
///
/// Every touch draws a fresh stamp from a monotonic clock, stores it on the
/// cache entry, and appends `(key, stamp)` to the queue. Older queue records for
/// the same key are left in place and skipped later: a record is live only
/// while its stamp still matches the entry's. The front-most live record is
/// therefore always the least recently used key.
#[derive(Debug)]
pub(crate) struct RecencyQueue<K> {
    clock: AtomicU64,
    queue: Mutex<VecDeque<(K, u64)>>,
}

impl<K: Copy> RecencyQueue<K> {
    pub(crate) fn new() -> Self {
        Self {
            clock: AtomicU64::new(1),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Draws the next stamp. The caller stores it on the entry, then calls
    /// [`RecencyQueue::record`].
    pub(crate) fn next_stamp(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Appends an access record.
    ///
    /// When dead records pile up past `compact_above`, the queue is rewritten
    /// keeping only records `is_live` accepts.
    pub(crate) fn record(&self, key: K, stamp: u64, compact_above: usize, is_live: impl Fn(&K, u64) -> bool) {
        let mut queue = self.queue.lock();
        queue.push_back((key, stamp));
        if queue.len() > compact_above {
            queue.retain(|(k, s)| is_live(k, *s));
        }
    }

    /// Pops records from the front until `evict` accepts one.
    ///
    /// `evict` must atomically remove the entry only if its stamp still equals
    /// the record's, and report whether it did. Returns the evicted key.
    pub(crate) fn evict_oldest(&self, mut evict: impl FnMut(&K, u64) -> bool) -> Option<K> {
        let mut queue = self.queue.lock();
        while let Some((key, stamp)) = queue.pop_front() {
            if evict(&key, stamp) {
                return Some(key);
            }
        }
        None
    }

    /// Number of records, live or dead.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.queue.lock().clear();
    }
}
