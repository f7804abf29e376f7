//! Locator tuning knobs.
//!
//! Every field has a serde default so a partial `[locator]` table in a host's
//! TOML file is enough.

use crate::error::{PlotError, PlotResult};
use serde::{Deserialize, Serialize};

fn default_point_cache_capacity() -> usize {
    1000
}

fn default_chunk_cache_capacity() -> usize {
    1000 // ~4 million blocks of footprint per layer of cells
}

fn default_chunk_cache_enabled() -> bool {
    true
}

fn default_max_region_extent() -> u32 {
    10_000
}

fn default_self_heal_warn_threshold() -> u64 {
    10
}

/// Configuration for a [`PlotLocator`](crate::PlotLocator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Maximum number of exact positions remembered by the point cache
    #[serde(default = "default_point_cache_capacity")]
    pub point_cache_capacity: usize,
    /// Maximum number of materialized grid cells held by the chunk cache
    #[serde(default = "default_chunk_cache_capacity")]
    pub chunk_cache_capacity: usize,
    /// Whether chunk-granularity lookups go through the chunk cache
    #[serde(default = "default_chunk_cache_enabled")]
    pub chunk_cache_enabled: bool,
    /// Largest accepted `max - min` on any axis, in blocks
    #[serde(default = "default_max_region_extent")]
    pub max_region_extent: u32,
    /// Log a warning every time this many additional self-heals have happened
    #[serde(default = "default_self_heal_warn_threshold")]
    pub self_heal_warn_threshold: u64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            point_cache_capacity: default_point_cache_capacity(),
            chunk_cache_capacity: default_chunk_cache_capacity(),
            chunk_cache_enabled: default_chunk_cache_enabled(),
            max_region_extent: default_max_region_extent(),
            self_heal_warn_threshold: default_self_heal_warn_threshold(),
        }
    }
}

impl LocatorConfig {
    /// Checks the configuration for values that would make the locator unusable.
    pub fn validate(&self) -> PlotResult<()> {
        if self.point_cache_capacity == 0 {
            return Err(PlotError::InvalidConfig(
                "point_cache_capacity must be greater than 0".to_string(),
            ));
        }
        if self.chunk_cache_capacity == 0 {
            return Err(PlotError::InvalidConfig(
                "chunk_cache_capacity must be greater than 0".to_string(),
            ));
        }
        if self.max_region_extent == 0 {
            return Err(PlotError::InvalidConfig(
                "max_region_extent must be greater than 0".to_string(),
            ));
        }
        if self.self_heal_warn_threshold == 0 {
            return Err(PlotError::InvalidConfig(
                "self_heal_warn_threshold must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
