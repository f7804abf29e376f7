//! Chunk-granularity materialized cache.
//!
//! Each entry is the full list of regions overlapping one [`GridCell`], loaded
//! from a [`RegionSource`] on first use. A reverse map from region id to the
//! cells listing it lets [`ChunkCache::invalidate_region`] touch only the
//! affected cells instead of scanning the whole cache.

use super::{CacheCounters, CacheStats, RecencyQueue};
use crate::store::RegionSource;
use crate::types::{BlockPos, CellRange, GridCell, Region, RegionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of materialized cells.
pub const DEFAULT_CHUNK_CACHE_CAPACITY: usize = 1000;

type CellRegions = Arc<[Arc<Region>]>;

#[derive(Debug)]
struct CachedCell {
    /// Regions overlapping the cell, in source order
    regions: CellRegions,
    stamp: AtomicU64,
}

/// Bounded LRU map from grid cells to the regions overlapping them.
#[derive(Debug)]
pub struct ChunkCache {
    max_cells: usize,
    cells: DashMap<GridCell, CachedCell>,
    /// Region id → cells whose cached list includes it
    region_cells: DashMap<RegionId, HashSet<GridCell>>,
    recency: RecencyQueue<GridCell>,
    generation: AtomicU64,
    counters: CacheCounters,
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_CACHE_CAPACITY)
    }
}

impl ChunkCache {
    /// Creates a cache holding at most `max_cells` cells (minimum 1).
    pub fn new(max_cells: usize) -> Self {
        let max_cells = max_cells.max(1);
        debug!("ChunkCache initialized with max_cells={}", max_cells);
        Self {
            max_cells,
            cells: DashMap::with_capacity(max_cells),
            region_cells: DashMap::new(),
            recency: RecencyQueue::new(),
            generation: AtomicU64::new(0),
            counters: CacheCounters::default(),
        }
    }

    /// Resolves `pos` through its cell's materialized region list.
    ///
    /// The cell is loaded from `source` on a miss. Regions are tested in list
    /// order and the first one containing `pos` is returned.
    pub fn get_or_load<S>(&self, pos: BlockPos, source: &S) -> Option<Arc<Region>>
    where
        S: RegionSource + ?Sized,
    {
        let cell = GridCell::of(pos);
        let regions = match self.lookup(cell) {
            Some(regions) => {
                self.counters.hit();
                regions
            }
            None => {
                self.counters.miss();
                self.load(cell, source)
            }
        };

        regions.iter().find(|region| region.contains(pos)).cloned()
    }

    /// Drops every cell listing region `id`, using the reverse map.
    ///
    /// Returns the number of cells removed.
    pub fn invalidate_region(&self, id: &str) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let Some((_, cells)) = self.region_cells.remove(id) else {
            return 0;
        };

        let mut removed = 0;
        for cell in cells {
            if let Some((_, entry)) = self.cells.remove(&cell) {
                self.unlink(cell, &entry.regions);
                removed += 1;
            }
        }

        if removed > 0 {
            self.counters.invalidation();
            debug!("ChunkCache: invalidated {} cells for region {}", removed, id);
        }
        removed
    }

    /// Drops every cell overlapping the block box `[min, max]`.
    pub fn invalidate_box(&self, min: BlockPos, max: BlockPos) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let range = CellRange::covering(min.min(max), min.max(max));
        // A box covering more cells than the cache holds is resolved by walking the cache.
        let doomed: Vec<GridCell> = match range.checked_len() {
            Some(cells) if cells <= self.cells.len() => range.iter().collect(),
            _ => self
                .cells
                .iter()
                .map(|entry| *entry.key())
                .filter(|cell| range.contains(*cell))
                .collect(),
        };

        let mut removed = 0;
        for cell in doomed {
            if let Some((_, entry)) = self.cells.remove(&cell) {
                self.unlink(cell, &entry.regions);
                removed += 1;
            }
        }

        if removed > 0 {
            self.counters.invalidation();
            debug!("ChunkCache: invalidated {} cells in box {}..{}", removed, min, max);
        }
        removed
    }

    /// Materializes every cell in the `(2 * radius + 1)^3` cube around the
    /// cell containing `center`, skipping cells already cached.
    ///
    /// Hit and miss counters are not touched. Returns the number of cells loaded.
    pub fn preload<S>(&self, center: BlockPos, radius: u32, source: &S) -> usize
    where
        S: RegionSource + ?Sized,
    {
        let range = CellRange::around(GridCell::of(center), radius);
        let mut loaded = 0;
        for cell in range.iter() {
            if self.cells.contains_key(&cell) {
                continue;
            }
            self.load(cell, source);
            loaded += 1;
        }

        info!(
            "📦 ChunkCache preloaded {} cells around {} (radius {}, {} cached)",
            loaded,
            center,
            radius,
            self.cells.len()
        );
        loaded
    }

    /// Drops every cell and the reverse map. Counters are kept.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cells.clear();
        self.region_cells.clear();
        self.recency.clear();
        debug!("ChunkCache cleared");
    }

    /// Number of cached cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_cells
    }

    /// True when `cell` is materialized, without touching recency or counters.
    pub fn contains_cell(&self, cell: GridCell) -> bool {
        self.cells.contains_key(&cell)
    }

    /// Cells currently recorded for region `id` in the reverse map.
    pub fn cells_for_region(&self, id: &str) -> HashSet<GridCell> {
        self.region_cells
            .get(id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Number of region ids present in the reverse map.
    pub fn tracked_regions(&self) -> usize {
        self.region_cells.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len(), self.max_cells)
    }

    pub fn reset_statistics(&self) {
        self.counters.reset();
    }

    fn lookup(&self, cell: GridCell) -> Option<CellRegions> {
        let (regions, stamp) = {
            let entry = self.cells.get(&cell)?;
            let stamp = self.recency.next_stamp();
            entry.stamp.store(stamp, Ordering::Relaxed);
            (entry.regions.clone(), stamp)
        };
        self.touch(cell, stamp);
        Some(regions)
    }

    fn load<S>(&self, cell: GridCell, source: &S) -> CellRegions
    where
        S: RegionSource + ?Sized,
    {
        let generation = self.generation.load(Ordering::SeqCst);
        let regions: CellRegions = source
            .regions_overlapping(cell.min_block(), cell.max_block())
            .into();

        // Reverse entries go in first so an invalidation can always find the cell.
        for region in regions.iter() {
            self.region_cells
                .entry(region.id().clone())
                .or_default()
                .insert(cell);
        }

        let stamp = self.recency.next_stamp();
        self.cells.insert(
            cell,
            CachedCell {
                regions: regions.clone(),
                stamp: AtomicU64::new(stamp),
            },
        );

        if self.generation.load(Ordering::SeqCst) != generation {
            // An invalidation overlapped the scan; the list may predate it.
            if self
                .cells
                .remove_if(&cell, |_, e| e.stamp.load(Ordering::Relaxed) == stamp)
                .is_some()
            {
                self.unlink(cell, &regions);
            }
            debug!("ChunkCache: discarded racing load of cell {}", cell);
            return regions;
        }

        debug!("ChunkCache: loaded cell {} with {} regions", cell, regions.len());
        self.touch(cell, stamp);
        self.evict_over_capacity();
        regions
    }

    fn evict_over_capacity(&self) {
        while self.cells.len() > self.max_cells {
            let mut evicted_regions = None;
            let evicted = self.recency.evict_oldest(|cell, stamp| {
                evicted_regions = self
                    .cells
                    .remove_if(cell, |_, e| e.stamp.load(Ordering::Relaxed) == stamp)
                    .map(|(_, entry)| entry.regions);
                evicted_regions.is_some()
            });

            match (evicted, evicted_regions) {
                (Some(cell), Some(regions)) => {
                    self.unlink(cell, &regions);
                    self.counters.eviction();
                    debug!("ChunkCache: evicted LRU cell {}", cell);
                }
                _ => break,
            }
        }
    }

    /// Removes `cell` from the reverse entries of every region in `regions`.
    fn unlink(&self, cell: GridCell, regions: &[Arc<Region>]) {
        for region in regions {
            if let Entry::Occupied(mut occupied) = self.region_cells.entry(region.id().clone()) {
                occupied.get_mut().remove(&cell);
                if occupied.get().is_empty() {
                    occupied.remove();
                }
            }
        }
    }

    fn touch(&self, cell: GridCell, stamp: u64) {
        let compact_above = self.max_cells.saturating_mul(4).max(64);
        self.recency.record(cell, stamp, compact_above, |key, s| {
            self.cells
                .get(key)
                .is_some_and(|e| e.stamp.load(Ordering::Relaxed) == s)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn region(id: &str, min: (i32, i32, i32), max: (i32, i32, i32)) -> Arc<Region> {
        Arc::new(Region::new(RegionId::new(id), min.into(), max.into()).unwrap())
    }

    /// Source that counts how often it is scanned.
    struct CountingSource {
        regions: Vec<Arc<Region>>,
        scans: AtomicUsize,
    }

    impl CountingSource {
        fn new(regions: Vec<Arc<Region>>) -> Self {
            Self {
                regions,
                scans: AtomicUsize::new(0),
            }
        }

        fn scans(&self) -> usize {
            self.scans.load(Ordering::Relaxed)
        }
    }

    impl RegionSource for CountingSource {
        fn regions_overlapping(&self, min: BlockPos, max: BlockPos) -> Vec<Arc<Region>> {
            self.scans.fetch_add(1, Ordering::Relaxed);
            self.regions.regions_overlapping(min, max)
        }
    }

    #[test]
    fn test_load_then_hit() {
        let source = CountingSource::new(vec![
            region("a", (0, 0, 0), (7, 15, 15)),
            region("b", (8, 0, 0), (40, 15, 15)),
        ]);
        let cache = ChunkCache::new(10);

        let found = cache.get_or_load(BlockPos::new(2, 2, 2), &source);
        assert_eq!(found.unwrap().id(), &"a");
        let found = cache.get_or_load(BlockPos::new(10, 2, 2), &source);
        assert_eq!(found.unwrap().id(), &"b");

        assert_eq!(source.scans(), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_empty_cell_is_cached() {
        let source = CountingSource::new(vec![region("a", (0, 0, 0), (7, 15, 15))]);
        let cache = ChunkCache::new(10);

        assert!(cache.get_or_load(BlockPos::new(100, 0, 0), &source).is_none());
        assert!(cache.get_or_load(BlockPos::new(101, 0, 0), &source).is_none());
        assert_eq!(source.scans(), 1);
        assert!(cache.contains_cell(GridCell::new(6, 0, 0)));
    }

    #[test]
    fn test_point_in_cell_but_outside_regions() {
        let source = vec![region("a", (0, 0, 0), (7, 15, 15))];
        let cache = ChunkCache::new(10);
        assert!(cache.get_or_load(BlockPos::new(12, 3, 3), &source).is_none());
    }

    #[test]
    fn test_invalidate_region_uses_reverse_map() {
        let wide = region("wide", (0, 0, 0), (47, 15, 15));
        let other = region("other", (100, 0, 0), (110, 15, 15));
        let source = vec![wide, other];
        let cache = ChunkCache::new(10);

        for x in [0, 16, 32, 100] {
            cache.get_or_load(BlockPos::new(x, 0, 0), &source);
        }
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.cells_for_region("wide").len(), 3);

        assert_eq!(cache.invalidate_region("wide"), 3);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_cell(GridCell::new(6, 0, 0)));
        assert!(cache.cells_for_region("wide").is_empty());
        assert_eq!(cache.tracked_regions(), 1);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_invalidate_box_removes_covered_cells() {
        let source: Vec<Arc<Region>> = Vec::new();
        let cache = ChunkCache::new(10);
        for x in [0, 16, 32] {
            cache.get_or_load(BlockPos::new(x, 0, 0), &source);
        }

        let removed = cache.invalidate_box(BlockPos::new(20, 0, 0), BlockPos::new(5, 3, 3));
        assert_eq!(removed, 2);
        assert!(!cache.contains_cell(GridCell::new(0, 0, 0)));
        assert!(!cache.contains_cell(GridCell::new(1, 0, 0)));
        assert!(cache.contains_cell(GridCell::new(2, 0, 0)));
    }

    #[test]
    fn test_invalidate_huge_box() {
        let source = vec![region("a", (0, 0, 0), (15, 15, 15))];
        let cache = ChunkCache::new(10);
        cache.get_or_load(BlockPos::new(0, 0, 0), &source);
        cache.get_or_load(BlockPos::new(-5000, 0, 0), &source);

        let removed = cache.invalidate_box(BlockPos::new(-10_000, -64, -10_000), BlockPos::new(10_000, 320, 10_000));
        assert_eq!(removed, 2);
        assert!(cache.is_empty());
        assert_eq!(cache.tracked_regions(), 0);
    }

    #[test]
    fn test_invalidate_whole_world_box() {
        let source = vec![region("a", (0, 0, 0), (15, 15, 15))];
        let cache = ChunkCache::new(10);
        cache.get_or_load(BlockPos::new(0, 0, 0), &source);
        cache.get_or_load(BlockPos::new(i32::MIN, i32::MIN, i32::MIN), &source);
        cache.get_or_load(BlockPos::new(i32::MAX, i32::MAX, i32::MAX), &source);

        let removed = cache.invalidate_box(
            BlockPos::new(i32::MIN, i32::MIN, i32::MIN),
            BlockPos::new(i32::MAX, i32::MAX, i32::MAX),
        );
        assert_eq!(removed, 3);
        assert!(cache.is_empty());
        assert_eq!(cache.tracked_regions(), 0);

        // Nothing cached: still no cell-by-cell walk of the box
        assert_eq!(
            cache.invalidate_box(BlockPos::new(i32::MIN, 0, i32::MIN), BlockPos::new(i32::MAX, 0, i32::MAX)),
            0
        );
    }

    #[test]
    fn test_lru_eviction_cleans_reverse_map() {
        let source = vec![
            region("a", (0, 0, 0), (15, 15, 15)),
            region("b", (16, 0, 0), (31, 15, 15)),
            region("c", (32, 0, 0), (47, 15, 15)),
        ];
        let cache = ChunkCache::new(2);

        cache.get_or_load(BlockPos::new(0, 0, 0), &source);
        cache.get_or_load(BlockPos::new(16, 0, 0), &source);
        // Touch cell 0 so cell 1 becomes least recently used
        cache.get_or_load(BlockPos::new(1, 0, 0), &source);
        cache.get_or_load(BlockPos::new(32, 0, 0), &source);

        assert_eq!(cache.len(), 2);
        assert!(cache.contains_cell(GridCell::new(0, 0, 0)));
        assert!(!cache.contains_cell(GridCell::new(1, 0, 0)));
        assert!(cache.contains_cell(GridCell::new(2, 0, 0)));
        assert!(cache.cells_for_region("b").is_empty());
        assert_eq!(cache.tracked_regions(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_preload_skips_cached_cells() {
        let source = CountingSource::new(vec![region("a", (0, 0, 0), (31, 31, 31))]);
        let cache = ChunkCache::new(100);

        cache.get_or_load(BlockPos::new(0, 0, 0), &source);
        let loaded = cache.preload(BlockPos::new(5, 5, 5), 1, &source);

        assert_eq!(loaded, 26);
        assert_eq!(cache.len(), 27);
        assert_eq!(source.scans(), 27);
        assert_eq!(cache.cells_for_region("a").len(), 8);

        // Preloaded cells serve hits without rescanning
        cache.reset_statistics();
        assert!(cache.get_or_load(BlockPos::new(-3, -3, -3), &source).is_none());
        assert_eq!(source.scans(), 27);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_capacity_bound_with_preload() {
        let source: Vec<Arc<Region>> = vec![region("a", (-100, -100, -100), (100, 100, 100))];
        let cache = ChunkCache::new(8);
        cache.preload(BlockPos::new(0, 0, 0), 2, &source);
        assert!(cache.len() <= 8);
        for x in -200..200 {
            cache.get_or_load(BlockPos::new(x * 7, 0, 0), &source);
            assert!(cache.len() <= 8);
        }
        assert!(cache.cells_for_region("a").len() <= 8);
    }

    #[test]
    fn test_clear() {
        let source = vec![region("a", (0, 0, 0), (15, 15, 15))];
        let cache = ChunkCache::new(10);
        cache.get_or_load(BlockPos::new(0, 0, 0), &source);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.tracked_regions(), 0);
        assert_eq!(cache.stats().misses, 1);
    }
}
