//! # Plot Index
//!
//! Answers "which plot contains this block?" fast enough to ask it for every
//! active entity on every simulation tick, while plots are created, resized and
//! deleted underneath.
//!
//! ## Architecture
//!
//! - [`RegionStore`] - canonical id → region map; the single source of truth
//! - [`SpatialIndex`] - exhaustive 16³ grid-cell → candidate-id index
//! - [`PointCache`] - bounded LRU of exact positions → answers
//! - [`ChunkCache`] - bounded LRU of grid cells → materialized region lists
//! - [`PlotLocator`] - the façade composing all of the above, with a linear-scan
//!   fallback that repairs the index whenever it misses a stored region
//!
//! Everything is safe to share between threads. Queries take no locks beyond
//! the shard locks inside `DashMap` and a short critical section for LRU order.
//!
//! ## Example
//!
//! ```rust
//! use plot_index::{BlockPos, LocatorConfig, PlotLocator};
//!
//! let locator = PlotLocator::new(LocatorConfig::default()).unwrap();
//! let plot = locator
//!     .create_region(None, BlockPos::new(0, 60, 0), BlockPos::new(31, 70, 31))
//!     .unwrap();
//!
//! assert_eq!(plot.id().as_str(), "plot_1");
//! assert!(locator.get_region_at(BlockPos::new(16, 65, 16)).is_some());
//! assert!(locator.get_region_at(BlockPos::new(32, 65, 16)).is_none());
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod locator;
pub mod persistence;
pub mod spatial;
pub mod stats;
pub mod store;
pub mod types;

pub use cache::{CacheStats, ChunkCache, PointCache, PointLookup};
pub use config::LocatorConfig;
pub use error::{PlotError, PlotResult};
pub use locator::{PlotLocator, Resolution};
pub use persistence::{JsonRegionFile, MemoryRegions, RegionPersistence};
pub use spatial::{IndexStats, SpatialIndex};
pub use stats::{LocatorHealth, LocatorStatistics, LocatorStats};
pub use store::{RegionSource, RegionStore};
pub use types::{grid_cell_of, BlockPos, CellRange, GridCell, PlotKind, Region, RegionId, CELL_SIZE};
