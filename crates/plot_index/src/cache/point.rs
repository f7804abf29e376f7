//! Point-granularity LRU cache: exact block position → resolved plot.
//!
//! Entries are re-validated on every hit. A cached region that no longer
//! contains the queried position is dropped and reported as a miss, and a
//! cached "no plot here" answer is only trusted while no invalidation has
//! happened since it was computed.

use super::{CacheCounters, CacheStats, RecencyQueue};
use crate::types::{BlockPos, Region};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Default number of positions remembered.
pub const DEFAULT_POINT_CACHE_CAPACITY: usize = 1000;

/// Result of a point cache lookup.
#[derive(Debug, Clone)]
pub enum PointLookup {
    /// The position was resolved to this region
    Hit(Arc<Region>),
    /// The position was resolved to "no region"
    Empty,
    /// Nothing usable is cached for this position
    Miss,
}

#[derive(Debug)]
struct PointEntry {
    /// `None` records an explicit "no region here"
    region: Option<Arc<Region>>,
    /// Invalidation generation the answer was computed under
    generation: u64,
    /// Last access stamp from the recency queue
    stamp: AtomicU64,
}

/// Bounded LRU map from exact positions to resolved regions.
#[derive(Debug)]
pub struct PointCache {
    capacity: usize,
    entries: DashMap<BlockPos, PointEntry>,
    recency: RecencyQueue<BlockPos>,
    /// Bumped by every invalidation; empty answers from older generations are stale
    generation: AtomicU64,
    counters: CacheCounters,
}

impl Default for PointCache {
    fn default() -> Self {
        Self::new(DEFAULT_POINT_CACHE_CAPACITY)
    }
}

impl PointCache {
    /// Creates a cache holding at most `capacity` positions (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!("PointCache initialized with capacity={}", capacity);
        Self {
            capacity,
            entries: DashMap::with_capacity(capacity),
            recency: RecencyQueue::new(),
            generation: AtomicU64::new(0),
            counters: CacheCounters::default(),
        }
    }

    /// Current invalidation generation.
    ///
    /// Read this before resolving a miss and pass it to [`PointCache::put_empty`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Looks up `pos`, refreshing its recency on a hit.
    pub fn get(&self, pos: BlockPos) -> PointLookup {
        let lookup = match self.entries.get(&pos) {
            None => None,
            Some(entry) => {
                let valid = match &entry.region {
                    Some(region) => region.contains(pos),
                    None => entry.generation == self.generation(),
                };
                if valid {
                    let stamp = self.recency.next_stamp();
                    entry.stamp.store(stamp, Ordering::Relaxed);
                    Some((entry.region.clone(), stamp))
                } else {
                    let stale_stamp = entry.stamp.load(Ordering::Relaxed);
                    drop(entry);
                    self.entries
                        .remove_if(&pos, |_, e| e.stamp.load(Ordering::Relaxed) == stale_stamp);
                    None
                }
            }
        };

        match lookup {
            Some((region, stamp)) => {
                self.counters.hit();
                self.touch(pos, stamp);
                match region {
                    Some(region) => PointLookup::Hit(region),
                    None => PointLookup::Empty,
                }
            }
            None => {
                self.counters.miss();
                PointLookup::Miss
            }
        }
    }

    /// Caches `region` as the answer for `pos` and marks it most recently used.
    pub fn put(&self, pos: BlockPos, region: Arc<Region>) {
        let generation = self.generation();
        self.insert(pos, Some(region), generation);
    }

    /// Caches "no region" for `pos`, computed under `generation`.
    ///
    /// Dropped when an invalidation has happened since `generation` was read.
    pub fn put_empty(&self, pos: BlockPos, generation: u64) {
        if generation != self.generation() {
            return;
        }
        self.insert(pos, None, generation);
    }

    /// Drops the entry for a single position.
    pub fn remove(&self, pos: BlockPos) -> bool {
        self.entries.remove(&pos).is_some()
    }

    /// Drops every entry resolved to region `id`.
    ///
    /// Scans the whole cache; only called on region mutation.
    pub fn invalidate_region(&self, id: &str) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.region.as_ref().map_or(true, |r| r.id().as_str() != id));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            self.counters.invalidation();
            debug!("PointCache: invalidated {} entries for region {}", removed, id);
        }
        removed
    }

    /// Drops every entry whose position lies inside `[min, max]`.
    pub fn invalidate_box(&self, min: BlockPos, max: BlockPos) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let before = self.entries.len();
        self.entries.retain(|pos, _| !pos.within(min, max));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            self.counters.invalidation();
            debug!("PointCache: invalidated {} entries in box {}..{}", removed, min, max);
        }
        removed
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
        self.recency.clear();
        debug!("PointCache cleared");
    }

    /// Number of cached positions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when `pos` has an entry, without touching recency or counters.
    pub fn contains(&self, pos: BlockPos) -> bool {
        self.entries.contains_key(&pos)
    }

    /// Counters and occupancy.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len(), self.capacity)
    }

    /// Zeroes hit/miss/invalidation counters without touching contents.
    pub fn reset_statistics(&self) {
        self.counters.reset();
    }

    fn insert(&self, pos: BlockPos, region: Option<Arc<Region>>, generation: u64) {
        let stamp = self.recency.next_stamp();
        self.entries.insert(
            pos,
            PointEntry {
                region,
                generation,
                stamp: AtomicU64::new(stamp),
            },
        );
        self.touch(pos, stamp);

        while self.entries.len() > self.capacity {
            let evicted = self.recency.evict_oldest(|key, stamp| {
                self.entries
                    .remove_if(key, |_, e| e.stamp.load(Ordering::Relaxed) == stamp)
                    .is_some()
            });
            match evicted {
                Some(key) => {
                    self.counters.eviction();
                    debug!("PointCache: evicted LRU position {}", key);
                }
                None => break,
            }
        }
    }

    fn touch(&self, pos: BlockPos, stamp: u64) {
        let compact_above = self.capacity.saturating_mul(4).max(64);
        self.recency.record(pos, stamp, compact_above, |key, s| {
            self.entries
                .get(key)
                .is_some_and(|e| e.stamp.load(Ordering::Relaxed) == s)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegionId;

    fn region(id: &str, min: (i32, i32, i32), max: (i32, i32, i32)) -> Arc<Region> {
        Arc::new(Region::new(RegionId::new(id), min.into(), max.into()).unwrap())
    }

    fn pos(x: i32) -> BlockPos {
        BlockPos::new(x, 64, 0)
    }

    #[test]
    fn test_put_and_get() {
        let cache = PointCache::new(10);
        let plot = region("plot1", (0, 0, 0), (100, 100, 100));
        cache.put(pos(5), plot.clone());

        assert!(matches!(cache.get(pos(5)), PointLookup::Hit(r) if Arc::ptr_eq(&r, &plot)));
        assert!(matches!(cache.get(pos(6)), PointLookup::Miss));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_stale_region_is_dropped() {
        let cache = PointCache::new(10);
        let plot = region("plot1", (0, 0, 0), (10, 100, 10));
        // Entry whose region does not contain the key position
        cache.put(pos(50), plot);

        assert!(matches!(cache.get(pos(50)), PointLookup::Miss));
        assert!(!cache.contains(pos(50)));
    }

    #[test]
    fn test_capacity_bound_and_lru_order() {
        let cache = PointCache::new(3);
        let plot = region("plot1", (0, 0, 0), (100, 100, 100));

        cache.put(pos(1), plot.clone());
        cache.put(pos(2), plot.clone());
        cache.put(pos(3), plot.clone());

        // 1 becomes most recently used, so 2 is now the oldest
        assert!(matches!(cache.get(pos(1)), PointLookup::Hit(_)));
        cache.put(pos(4), plot.clone());

        assert_eq!(cache.len(), 3);
        assert!(cache.contains(pos(1)));
        assert!(!cache.contains(pos(2)));
        assert!(cache.contains(pos(3)));
        assert!(cache.contains(pos(4)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_put_refreshes_recency() {
        let cache = PointCache::new(2);
        let plot = region("plot1", (0, 0, 0), (100, 100, 100));

        cache.put(pos(1), plot.clone());
        cache.put(pos(2), plot.clone());
        cache.put(pos(1), plot.clone());
        cache.put(pos(3), plot.clone());

        assert!(cache.contains(pos(1)));
        assert!(!cache.contains(pos(2)));
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let cache = PointCache::new(16);
        let plot = region("plot1", (0, 0, 0), (1000, 100, 0));
        for i in 0..500 {
            cache.put(pos(i), plot.clone());
            let _ = cache.get(pos(i / 2));
            assert!(cache.len() <= 16);
        }
    }

    #[test]
    fn test_invalidate_region() {
        let cache = PointCache::new(10);
        let a = region("a", (0, 0, 0), (10, 100, 10));
        let b = region("b", (20, 0, 0), (30, 100, 10));
        cache.put(pos(1), a.clone());
        cache.put(pos(2), a);
        cache.put(pos(25), b);

        assert_eq!(cache.invalidate_region("a"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(pos(25)));
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_invalidate_box() {
        let cache = PointCache::new(10);
        let plot = region("plot1", (0, 0, 0), (100, 100, 100));
        cache.put(pos(1), plot.clone());
        cache.put(pos(50), plot);

        let removed = cache.invalidate_box(BlockPos::new(0, 0, 0), BlockPos::new(10, 100, 10));
        assert_eq!(removed, 1);
        assert!(!cache.contains(pos(1)));
        assert!(cache.contains(pos(50)));
    }

    #[test]
    fn test_empty_answer_expires_on_invalidation() {
        let cache = PointCache::new(10);
        let generation = cache.generation();
        cache.put_empty(pos(1), generation);
        assert!(matches!(cache.get(pos(1)), PointLookup::Empty));

        // Any invalidation, even one that removes nothing, retires empty answers
        cache.invalidate_region("unrelated");
        assert!(matches!(cache.get(pos(1)), PointLookup::Miss));
    }

    #[test]
    fn test_put_empty_with_old_generation_is_ignored() {
        let cache = PointCache::new(10);
        let generation = cache.generation();
        cache.invalidate_box(BlockPos::new(0, 0, 0), BlockPos::new(1, 1, 1));
        cache.put_empty(pos(1), generation);
        assert!(!cache.contains(pos(1)));
    }

    #[test]
    fn test_clear_keeps_counters() {
        let cache = PointCache::new(10);
        let plot = region("plot1", (0, 0, 0), (100, 100, 100));
        cache.put(pos(1), plot);
        let _ = cache.get(pos(1));
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 1);

        cache.reset_statistics();
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_concurrent_access_stays_bounded() {
        let cache = PointCache::new(64);
        let plot = region("plot1", (0, 0, 0), (10_000, 100, 0));

        std::thread::scope(|scope| {
            for t in 0..4 {
                let cache = &cache;
                let plot = plot.clone();
                scope.spawn(move || {
                    for i in 0..2_000 {
                        let p = pos(t * 2_000 + i);
                        cache.put(p, plot.clone());
                        let _ = cache.get(p);
                    }
                });
            }
        });

        // Racing inserts may briefly overshoot; once quiescent the bound holds
        assert!(cache.len() <= 64 + 4);
    }
}
