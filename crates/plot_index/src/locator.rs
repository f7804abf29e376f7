//! # Plot Locator
//!
//! The public façade over the region store, the spatial index and both cache
//! tiers. One `PlotLocator` is constructed per world and shared by reference
//! (typically behind an `Arc`) between the simulation tick and request handlers.
//!
//! ## Query path
//!
//! 1. [`PointCache`] for the exact position; hits are checked against the store.
//! 2. [`SpatialIndex`] candidates for the position's cell, each exact-tested.
//! 3. Linear scan of the store. A region found here was missed by the index,
//!    so it is re-indexed (self-heal) before being returned.
//!
//! ## Mutation path
//!
//! Mutations are serialized by a writer lock that queries never take. Each one
//! invalidates both caches for the affected id and box, updates the index and
//! the store, then invalidates again so that no cache entry computed while the
//! mutation was in flight survives it.

use crate::cache::{ChunkCache, PointCache, PointLookup};
use crate::config::LocatorConfig;
use crate::error::{PlotError, PlotResult};
use crate::persistence::RegionPersistence;
use crate::spatial::SpatialIndex;
use crate::stats::{LocatorCounters, LocatorHealth, LocatorStatistics};
use crate::store::RegionStore;
use crate::types::{BlockPos, Region, RegionId};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Prefix of automatically generated region ids.
pub const GENERATED_ID_PREFIX: &str = "plot_";

/// Outcome of a single point query.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Found through a cache or the spatial index
    Resolved(Arc<Region>),
    /// Found only by the fallback scan; the index has been repaired
    Repaired(Arc<Region>),
    /// No region contains the position
    Empty,
}

impl Resolution {
    /// The resolved region, if any.
    pub fn region(&self) -> Option<&Arc<Region>> {
        match self {
            Resolution::Resolved(region) | Resolution::Repaired(region) => Some(region),
            Resolution::Empty => None,
        }
    }

    pub fn into_region(self) -> Option<Arc<Region>> {
        match self {
            Resolution::Resolved(region) | Resolution::Repaired(region) => Some(region),
            Resolution::Empty => None,
        }
    }

    pub fn was_repaired(&self) -> bool {
        matches!(self, Resolution::Repaired(_))
    }
}

/// Spatial lookup service for one world's plots.
#[derive(Debug)]
pub struct PlotLocator {
    config: LocatorConfig,
    store: RegionStore,
    index: SpatialIndex,
    point_cache: PointCache,
    chunk_cache: ChunkCache,
    counters: LocatorCounters,
    /// Next candidate number for generated `plot_<n>` ids
    next_plot_number: AtomicU64,
    /// Serializes mutations and self-heals; never taken by queries
    write_lock: Mutex<()>,
    dirty: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl Default for PlotLocator {
    fn default() -> Self {
        Self::build(LocatorConfig::default())
    }
}

impl PlotLocator {
    /// Creates an empty locator.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidConfig`] when `config` fails validation.
    pub fn new(config: LocatorConfig) -> PlotResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: LocatorConfig) -> Self {
        info!(
            "🗺️ Plot locator initialized (point cache: {}, chunk cache: {}{})",
            config.point_cache_capacity,
            config.chunk_cache_capacity,
            if config.chunk_cache_enabled { "" } else { ", disabled" }
        );

        Self {
            point_cache: PointCache::new(config.point_cache_capacity),
            chunk_cache: ChunkCache::new(config.chunk_cache_capacity),
            config,
            store: RegionStore::new(),
            index: SpatialIndex::new(),
            counters: LocatorCounters::default(),
            next_plot_number: AtomicU64::new(1),
            write_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
            last_error: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns the region containing `pos`, if any.
    ///
    /// This is the hot-path query. It never fails: absence is `None`.
    pub fn get_region_at(&self, pos: BlockPos) -> Option<Arc<Region>> {
        self.resolve(pos).into_region()
    }

    /// Resolves `pos`, reporting whether the answer needed an index repair.
    pub fn resolve(&self, pos: BlockPos) -> Resolution {
        self.counters.query();

        match self.point_cache.get(pos) {
            PointLookup::Hit(region) if self.store.is_current(&region) => {
                return Resolution::Resolved(region);
            }
            PointLookup::Hit(stale) => {
                debug!("Dropping cached region {} at {}: no longer stored", stale.id(), pos);
                self.point_cache.remove(pos);
            }
            PointLookup::Empty => return Resolution::Empty,
            PointLookup::Miss => {}
        }

        // Read before computing so an invalidation during the lookup discards an empty answer.
        let generation = self.point_cache.generation();

        if let Some(region) = self.match_candidates(pos) {
            self.point_cache.put(pos, region.clone());
            return Resolution::Resolved(region);
        }

        self.counters.fallback_scan();
        match self.store.find_containing(pos) {
            Some(region) => {
                let repaired = self.self_heal(&region, pos);
                self.point_cache.put(pos, region.clone());
                if repaired {
                    Resolution::Repaired(region)
                } else {
                    Resolution::Resolved(region)
                }
            }
            None => {
                self.point_cache.put_empty(pos, generation);
                Resolution::Empty
            }
        }
    }

    /// Resolves `pos` through the chunk cache.
    ///
    /// Suited to many distinct positions inside the same few cells, such as an
    /// area scan. Falls back to [`PlotLocator::get_region_at`] when the chunk
    /// cache is disabled or hands back a region that is no longer stored.
    pub fn get_region_at_chunked(&self, pos: BlockPos) -> Option<Arc<Region>> {
        if !self.config.chunk_cache_enabled {
            return self.get_region_at(pos);
        }

        match self.chunk_cache.get_or_load(pos, &self.store) {
            Some(region) if self.store.is_current(&region) => Some(region),
            Some(stale) => {
                debug!("ChunkCache returned stale region {} at {}", stale.id(), pos);
                self.chunk_cache.invalidate_region(stale.id().as_str());
                self.get_region_at(pos)
            }
            None => None,
        }
    }

    /// Fetches a region by id.
    pub fn get_region(&self, id: &str) -> Option<Arc<Region>> {
        self.store.get(id)
    }

    pub fn has_region(&self, id: &str) -> bool {
        self.store.contains(id)
    }

    /// Every stored region, sorted by id.
    pub fn regions(&self) -> Vec<Arc<Region>> {
        let mut regions = self.store.snapshot();
        regions.sort_by(|a, b| a.id().cmp(b.id()));
        regions
    }

    pub fn region_count(&self) -> usize {
        self.store.len()
    }

    /// Sum of all region volumes in blocks.
    pub fn total_volume(&self) -> u64 {
        self.store.total_volume()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Creates and stores a region spanning two arbitrary opposite corners.
    ///
    /// # Arguments
    ///
    /// * `id` - Explicit id, or `None` to generate the next free `plot_<n>`
    /// * `corner_a`, `corner_b` - Any two opposite corners, in any order
    ///
    /// # Returns
    ///
    /// The stored region, or an error when the id is invalid or taken, or the
    /// region is too large.
    pub fn create_region(
        &self,
        id: Option<&str>,
        corner_a: BlockPos,
        corner_b: BlockPos,
    ) -> PlotResult<Arc<Region>> {
        let id = match id {
            Some(id) => RegionId::parse(id)?,
            None => self.next_region_id(),
        };
        self.add_region(Region::from_corners(id, corner_a, corner_b))
    }

    /// Stores a new region and indexes it.
    ///
    /// # Errors
    ///
    /// Fails with [`PlotError::InvalidId`], [`PlotError::RegionTooLarge`] or
    /// [`PlotError::DuplicateId`]; nothing is stored in that case.
    pub fn add_region(&self, region: Region) -> PlotResult<Arc<Region>> {
        self.check_region(&region)?;

        let _guard = self.write_lock.lock();
        if self.store.contains(region.id().as_str()) {
            return Err(PlotError::DuplicateId(region.id().to_string()));
        }

        let region = Arc::new(region);
        self.invalidate_footprint(&region);
        self.store.insert(region.clone())?;
        self.index.insert(&region);
        self.invalidate_footprint(&region);

        self.observe_id(region.id());
        self.mark_dirty();
        debug!("Added region {}", region);
        Ok(region)
    }

    /// Swaps in new bounds or attributes for an existing id, or adds it.
    ///
    /// Returns the previous region when there was one.
    pub fn replace_region(&self, region: Region) -> PlotResult<Option<Arc<Region>>> {
        self.check_region(&region)?;

        let _guard = self.write_lock.lock();
        let region = Arc::new(region);
        let id = region.id().as_str();
        let previous = self.store.get(id);

        if let Some(old) = &previous {
            self.invalidate_footprint(old);
        }
        self.invalidate_footprint(&region);
        self.index.remove(id);
        self.store.upsert(region.clone());
        self.index.insert(&region);
        if let Some(old) = &previous {
            self.invalidate_footprint(old);
        }
        self.invalidate_footprint(&region);

        self.observe_id(region.id());
        self.mark_dirty();
        debug!("Replaced region {}", region);
        Ok(previous)
    }

    /// Removes a region by id. Returns `false` when no such region exists.
    pub fn remove_region(&self, id: &str) -> bool {
        let _guard = self.write_lock.lock();
        let Some(region) = self.store.get(id) else {
            return false;
        };

        self.invalidate_footprint(&region);
        self.index.remove(id);
        self.store.remove(id);
        self.invalidate_footprint(&region);

        self.mark_dirty();
        debug!("Removed region {}", region);
        true
    }

    /// Removes whichever region contains `pos`.
    pub fn remove_region_at(&self, pos: BlockPos) -> bool {
        match self.get_region_at(pos) {
            Some(region) => self.remove_region(region.id().as_str()),
            None => false,
        }
    }

    /// Drops every region, index entry and cache entry, and restarts id
    /// generation at `plot_1`.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        let count = self.store.len();
        self.point_cache.clear();
        self.chunk_cache.clear();
        self.index.clear();
        self.store.clear();
        self.point_cache.clear();
        self.chunk_cache.clear();
        self.next_plot_number.store(1, Ordering::SeqCst);
        self.mark_dirty();
        info!("🧹 Cleared {} regions", count);
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Rebuilds the spatial index from the store and empties both caches.
    pub fn rebuild_index(&self) {
        let _guard = self.write_lock.lock();
        self.rebuild_locked();
    }

    fn rebuild_locked(&self) {
        self.point_cache.clear();
        self.chunk_cache.clear();
        self.index.rebuild(self.store.snapshot().iter());
        self.point_cache.clear();
        self.chunk_cache.clear();
    }

    /// Drops every cache entry referring to region `id`.
    ///
    /// Returns the number of point entries and chunk cells removed.
    pub fn invalidate(&self, id: &str) -> usize {
        self.point_cache.invalidate_region(id) + self.chunk_cache.invalidate_region(id)
    }

    /// Drops every cache entry for positions inside the box spanned by two corners.
    pub fn invalidate_box(&self, corner_a: BlockPos, corner_b: BlockPos) -> usize {
        let (min, max) = (corner_a.min(corner_b), corner_a.max(corner_b));
        self.point_cache.invalidate_box(min, max) + self.chunk_cache.invalidate_box(min, max)
    }

    /// Warms the chunk cache around `center`. Returns the number of cells loaded.
    pub fn preload(&self, center: BlockPos, radius: u32) -> usize {
        if !self.config.chunk_cache_enabled {
            return 0;
        }
        self.chunk_cache.preload(center, radius, &self.store)
    }

    /// Zeroes cache and query counters without touching contents.
    pub fn reset_statistics(&self) {
        self.point_cache.reset_statistics();
        self.chunk_cache.reset_statistics();
        self.counters.reset();
    }

    /// Counters for both caches, the index shape and the query path.
    pub fn cache_statistics(&self) -> LocatorStatistics {
        LocatorStatistics {
            point: self.point_cache.stats(),
            chunk: self.chunk_cache.stats(),
            index: self.index.stats(),
            locator: self.counters.snapshot(),
        }
    }

    pub fn health(&self) -> LocatorHealth {
        let last_error = self.last_error.read().clone();
        LocatorHealth {
            healthy: last_error.is_none(),
            last_error,
            regions: self.store.len(),
            point_hit_rate: self.point_cache.stats().hit_rate,
        }
    }

    /// True when regions changed since the last load or successful save.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Direct access to the spatial index, for diagnostics.
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn point_cache(&self) -> &PointCache {
        &self.point_cache
    }

    pub fn chunk_cache(&self) -> &ChunkCache {
        &self.chunk_cache
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Replaces all regions with those from `persistence` and rebuilds the index.
    ///
    /// Regions exceeding the extent limit are skipped with a warning. Generated
    /// ids resume after the highest stored `plot_<n>`.
    pub fn load_from(&self, persistence: &dyn RegionPersistence) -> PlotResult<usize> {
        let regions = persistence.load_all().inspect_err(|e| {
            error!("❌ Failed to load plots: {}", e);
            self.record_error(e);
        })?;

        let _guard = self.write_lock.lock();
        self.store.clear();
        self.next_plot_number.store(1, Ordering::SeqCst);

        let mut loaded = 0;
        for region in regions {
            if let Err(e) = self.check_region(&region) {
                warn!("⚠️ Skipping stored region {}: {}", region.id(), e);
                continue;
            }
            self.observe_id(region.id());
            self.store.upsert(Arc::new(region));
            loaded += 1;
        }

        self.rebuild_locked();
        self.mark_clean();
        *self.last_error.write() = None;
        info!("📂 Loaded {} plots", loaded);
        Ok(loaded)
    }

    /// Writes every region to `persistence` and clears the dirty flag.
    pub fn save_to(&self, persistence: &dyn RegionPersistence) -> PlotResult<usize> {
        // Cleared first so a mutation racing the save leaves the flag set.
        self.dirty.store(false, Ordering::SeqCst);
        let regions: Vec<Region> = self.regions().iter().map(|r| Region::clone(r)).collect();

        match persistence.save_all(&regions) {
            Ok(()) => {
                *self.last_error.write() = None;
                info!("💾 Saved {} plots", regions.len());
                Ok(regions.len())
            }
            Err(e) => {
                self.mark_dirty();
                error!("❌ Failed to save plots: {}", e);
                self.record_error(&e);
                Err(e)
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn match_candidates(&self, pos: BlockPos) -> Option<Arc<Region>> {
        self.index
            .candidates(pos)
            .iter()
            .filter_map(|id| self.store.get(id.as_str()))
            .find(|region| region.contains(pos))
    }

    /// Re-indexes a region the fallback scan found. Returns whether the index changed.
    fn self_heal(&self, region: &Arc<Region>, pos: BlockPos) -> bool {
        // A mutation in flight will index the region itself.
        let Some(_guard) = self.write_lock.try_lock() else {
            debug!("Skipping self-heal of {}: mutation in progress", region.id());
            return false;
        };
        if !self.store.is_current(region) {
            return false;
        }
        // Added after this query read the index; nothing was missed.
        if self
            .index
            .candidates(pos)
            .iter()
            .any(|id| id == region.id())
        {
            return false;
        }

        warn!(
            "⚠️ Spatial index missed region {} at {}; re-indexing",
            region.id(),
            pos
        );
        self.index.insert(region);

        let total = self.counters.self_heal();
        if total % self.config.self_heal_warn_threshold == 0 {
            warn!(
                "⚠️ {} self-heals since start; index and store keep diverging (missed invalidation?)",
                total
            );
        }
        true
    }

    fn invalidate_footprint(&self, region: &Region) {
        let id = region.id().as_str();
        self.point_cache.invalidate_region(id);
        self.point_cache.invalidate_box(region.min(), region.max());
        self.chunk_cache.invalidate_region(id);
        self.chunk_cache.invalidate_box(region.min(), region.max());
    }

    fn check_region(&self, region: &Region) -> PlotResult<()> {
        RegionId::parse(region.id().as_str())?;

        let (axis, extent) = region.largest_extent();
        if extent > self.config.max_region_extent {
            return Err(PlotError::RegionTooLarge {
                axis,
                extent,
                limit: self.config.max_region_extent,
            });
        }
        Ok(())
    }

    fn next_region_id(&self) -> RegionId {
        loop {
            let n = self.next_plot_number.fetch_add(1, Ordering::SeqCst);
            let candidate = format!("{}{}", GENERATED_ID_PREFIX, n);
            if !self.store.contains(&candidate) {
                return RegionId::new(candidate);
            }
        }
    }

    /// Keeps generated ids ahead of any explicit `plot_<n>` id.
    fn observe_id(&self, id: &RegionId) {
        if let Some(n) = generated_number(id.as_str()) {
            self.next_plot_number
                .fetch_max(n.saturating_add(1), Ordering::SeqCst);
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn record_error(&self, e: &PlotError) {
        *self.last_error.write() = Some(e.to_string());
    }
}

fn generated_number(id: &str) -> Option<u64> {
    id.strip_prefix(GENERATED_ID_PREFIX)?.parse().ok()
}
