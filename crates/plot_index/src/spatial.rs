//! # Chunk-Grid Spatial Index
//!
//! An exhaustive inverted index from [`GridCell`] to the ids of every region
//! whose box overlaps that cell. There is no eviction: the index always holds
//! an entry for each occupied cell and nothing for empty ones.
//!
//! ## Guarantees
//!
//! - **No false negatives**: the candidate set for a cell is a superset of the
//!   regions containing any point in that cell.
//! - **Idempotent insert**: inserting an id that is already indexed first drops
//!   its previous cells.
//! - **Order independence**: [`SpatialIndex::rebuild`] yields the same cell map
//!   for any permutation of the input.
//!
//! Candidates are only hints. The locator performs the exact containment test
//! against the store before trusting any id returned from here.

use crate::types::{BlockPos, CellRange, GridCell, Region, RegionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Point-in-time shape of the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    /// Number of regions with recorded cells
    pub region_count: usize,
    /// Number of occupied cells
    pub cell_count: usize,
    /// Total (cell, id) pairs
    pub total_entries: usize,
    /// `total_entries / region_count`
    pub avg_cells_per_region: f64,
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SpatialIndex[regions={}, cells={}, entries={}, avg_cells_per_region={:.1}]",
            self.region_count, self.cell_count, self.total_entries, self.avg_cells_per_region
        )
    }
}

/// Grid cell → candidate region ids, plus the reverse record of which cells
/// each region was filed under.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    /// Occupied cells and the ids overlapping them
    cells: DashMap<GridCell, HashSet<RegionId>>,
    /// Cells each region was filed under, so removal never scans the grid
    region_cells: DashMap<RegionId, CellRange>,
}

impl SpatialIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
            region_cells: DashMap::new(),
        }
    }

    /// Files `region` under every cell its box overlaps.
    ///
    /// Any cells previously recorded for the same id are dropped first, so
    /// re-inserting a region with new bounds leaves no trace at the old ones.
    pub fn insert(&self, region: &Region) {
        self.remove(region.id().as_str());

        let range = region.cells();
        for cell in range.iter() {
            self.cells
                .entry(cell)
                .or_default()
                .insert(region.id().clone());
        }
        self.region_cells.insert(region.id().clone(), range);

        debug!("Indexed region {} across {} cells", region.id(), range.len());
    }

    /// Removes every entry for `id`, dropping cells that become empty.
    ///
    /// Returns `false` when the id was not indexed.
    pub fn remove(&self, id: &str) -> bool {
        let Some((_, range)) = self.region_cells.remove(id) else {
            return false;
        };

        for cell in range.iter() {
            if let Entry::Occupied(mut occupied) = self.cells.entry(cell) {
                occupied.get_mut().remove(id);
                if occupied.get().is_empty() {
                    occupied.remove();
                }
            }
        }

        true
    }

    /// Clears the index and re-inserts every region.
    pub fn rebuild<'a, I>(&self, regions: I)
    where
        I: IntoIterator<Item = &'a Arc<Region>>,
    {
        self.clear();

        let mut count = 0usize;
        for region in regions {
            self.insert(region);
            count += 1;
        }

        info!("Spatial index rebuilt: {} regions, {} cells", count, self.cells.len());
    }

    /// Candidate ids for the cell containing `pos`, sorted by id.
    ///
    /// Returns an empty vector when the cell is unmapped.
    pub fn candidates(&self, pos: BlockPos) -> Vec<RegionId> {
        self.candidates_in_cell(GridCell::of(pos))
    }

    /// Candidate ids filed under `cell`, sorted by id.
    pub fn candidates_in_cell(&self, cell: GridCell) -> Vec<RegionId> {
        let mut ids: Vec<RegionId> = self
            .cells
            .get(&cell)
            .map(|entry| entry.value().iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Cells recorded for `id`, if it is indexed.
    pub fn cells_of(&self, id: &str) -> Option<CellRange> {
        self.region_cells.get(id).map(|entry| *entry.value())
    }

    /// True when `id` has recorded cells.
    pub fn contains_region(&self, id: &str) -> bool {
        self.region_cells.contains_key(id)
    }

    /// Ordered copy of the whole cell map, for comparing index states.
    pub fn snapshot(&self) -> BTreeMap<GridCell, BTreeSet<RegionId>> {
        self.cells
            .iter()
            .map(|entry| (*entry.key(), entry.value().iter().cloned().collect()))
            .collect()
    }

    /// Current shape of the index.
    pub fn stats(&self) -> IndexStats {
        let region_count = self.region_cells.len();
        let total_entries: usize = self.cells.iter().map(|entry| entry.value().len()).sum();
        let avg_cells_per_region = if region_count == 0 {
            0.0
        } else {
            total_entries as f64 / region_count as f64
        };

        IndexStats {
            region_count,
            cell_count: self.cells.len(),
            total_entries,
            avg_cells_per_region,
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.cells.clear();
        self.region_cells.clear();
    }
}
