//! # Region Store
//!
//! The canonical authority for region existence and bounds. The spatial index
//! and both caches only ever hold ids or shared snapshots of what is stored
//! here; when they disagree with the store, the store wins.

use crate::error::{PlotError, PlotResult};
use crate::types::{BlockPos, Region, RegionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Anything that can enumerate regions overlapping a block box.
///
/// The chunk cache materializes cells from a `RegionSource` rather than from
/// the spatial index, so a materialized cell is always built from full data.
pub trait RegionSource {
    /// Returns every region whose box intersects `[min, max]`.
    fn regions_overlapping(&self, min: BlockPos, max: BlockPos) -> Vec<Arc<Region>>;
}

impl RegionSource for [Arc<Region>] {
    fn regions_overlapping(&self, min: BlockPos, max: BlockPos) -> Vec<Arc<Region>> {
        self.iter()
            .filter(|region| region.overlaps_box(min, max))
            .cloned()
            .collect()
    }
}

impl RegionSource for Vec<Arc<Region>> {
    fn regions_overlapping(&self, min: BlockPos, max: BlockPos) -> Vec<Arc<Region>> {
        self.as_slice().regions_overlapping(min, max)
    }
}

/// Concurrent id → region map.
///
/// Reads and writes are sharded by `DashMap`, so a reader on the simulation
/// thread never waits on a writer touching a different shard.
#[derive(Debug, Default)]
pub struct RegionStore {
    regions: DashMap<RegionId, Arc<Region>>,
}

impl RegionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            regions: DashMap::new(),
        }
    }

    /// Inserts a region whose id is not yet present.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::DuplicateId`] when the id is already stored.
    pub fn insert(&self, region: Arc<Region>) -> PlotResult<()> {
        match self.regions.entry(region.id().clone()) {
            Entry::Occupied(occupied) => Err(PlotError::DuplicateId(occupied.key().to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(region);
                Ok(())
            }
        }
    }

    /// Inserts or replaces a region, returning the previous value.
    pub fn upsert(&self, region: Arc<Region>) -> Option<Arc<Region>> {
        self.regions.insert(region.id().clone(), region)
    }

    /// Fetches a region by id.
    pub fn get(&self, id: &str) -> Option<Arc<Region>> {
        self.regions.get(id).map(|entry| entry.value().clone())
    }

    /// True when `candidate` is the exact instance currently stored under its id.
    ///
    /// Cached snapshots are checked with this before being handed out, so an
    /// entry for a removed or replaced region is never returned.
    pub fn is_current(&self, candidate: &Arc<Region>) -> bool {
        self.regions
            .get(candidate.id().as_str())
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), candidate))
    }

    /// True when a region with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.regions.contains_key(id)
    }

    /// Removes a region by id.
    pub fn remove(&self, id: &str) -> Option<Arc<Region>> {
        self.regions.remove(id).map(|(_, region)| region)
    }

    /// Linear scan for a region containing `pos`.
    ///
    /// Used only as the locator's fallback path. When regions overlap, the
    /// lowest id wins so the answer does not depend on shard iteration order.
    pub fn find_containing(&self, pos: BlockPos) -> Option<Arc<Region>> {
        self.regions
            .iter()
            .filter(|entry| entry.value().contains(pos))
            .min_by(|a, b| a.key().cmp(b.key()))
            .map(|entry| entry.value().clone())
    }

    /// Point-in-time copy of every stored region.
    pub fn snapshot(&self) -> Vec<Arc<Region>> {
        self.regions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Every stored id.
    pub fn ids(&self) -> Vec<RegionId> {
        self.regions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of stored regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sum of all region volumes in blocks.
    pub fn total_volume(&self) -> u64 {
        self.regions.iter().map(|entry| entry.value().volume()).sum()
    }

    /// Drops every region.
    pub fn clear(&self) {
        self.regions.clear();
    }
}

impl RegionSource for RegionStore {
    fn regions_overlapping(&self, min: BlockPos, max: BlockPos) -> Vec<Arc<Region>> {
        let mut found: Vec<Arc<Region>> = self
            .regions
            .iter()
            .filter(|entry| entry.value().overlaps_box(min, max))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.id().cmp(b.id()));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: &str, min: (i32, i32, i32), max: (i32, i32, i32)) -> Arc<Region> {
        Arc::new(Region::new(RegionId::new(id), min.into(), max.into()).unwrap())
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let store = RegionStore::new();
        store.insert(region("a", (0, 0, 0), (1, 1, 1))).unwrap();
        let err = store.insert(region("a", (5, 5, 5), (6, 6, 6)));
        assert!(matches!(err, Err(PlotError::DuplicateId(id)) if id == "a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_is_current_detects_replacement() {
        let store = RegionStore::new();
        let old = region("a", (0, 0, 0), (1, 1, 1));
        store.insert(old.clone()).unwrap();
        assert!(store.is_current(&old));

        let new = region("a", (0, 0, 0), (2, 2, 2));
        store.upsert(new.clone());
        assert!(!store.is_current(&old));
        assert!(store.is_current(&new));

        store.remove("a");
        assert!(!store.is_current(&new));
    }

    #[test]
    fn test_find_containing() {
        let store = RegionStore::new();
        store.insert(region("a", (0, 0, 0), (9, 9, 9))).unwrap();
        store.insert(region("b", (20, 0, 0), (29, 9, 9))).unwrap();

        assert_eq!(store.find_containing(BlockPos::new(25, 5, 5)).unwrap().id(), &"b");
        assert!(store.find_containing(BlockPos::new(15, 5, 5)).is_none());
    }

    #[test]
    fn test_regions_overlapping_is_sorted() {
        let store = RegionStore::new();
        store.insert(region("b", (0, 0, 0), (9, 9, 9))).unwrap();
        store.insert(region("a", (5, 0, 0), (12, 9, 9))).unwrap();
        store.insert(region("c", (100, 0, 0), (110, 9, 9))).unwrap();

        let found = store.regions_overlapping(BlockPos::new(0, 0, 0), BlockPos::new(15, 15, 15));
        let ids: Vec<&str> = found.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_total_volume() {
        let store = RegionStore::new();
        store.insert(region("a", (0, 0, 0), (1, 1, 1))).unwrap();
        store.insert(region("b", (10, 0, 0), (10, 0, 0))).unwrap();
        assert_eq!(store.total_volume(), 9);
    }
}
