//! Error types for region construction, mutation and persistence.
//!
//! Lookups never produce errors: a position outside every plot resolves to
//! `None`. Errors are reserved for rejected input and failed I/O.

use crate::types::BlockPos;

/// Errors that can occur while building, storing or persisting regions.
#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    /// `min` exceeds `max` on at least one axis
    #[error("Invalid region bounds: min {min} is not <= max {max}")]
    InvalidBounds { min: BlockPos, max: BlockPos },

    /// Region id failed validation
    #[error("Invalid region id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    /// A region with this id is already stored
    #[error("Region already exists: {0}")]
    DuplicateId(String),

    /// Region exceeds the configured per-axis extent limit
    #[error("Region too large: {axis} extent {extent} exceeds limit {limit}")]
    RegionTooLarge { axis: char, extent: u32, limit: u32 },

    /// Locator configuration is inconsistent
    #[error("Invalid locator configuration: {0}")]
    InvalidConfig(String),

    /// Stored region data could not be loaded or saved
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Underlying file system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type PlotResult<T> = Result<T, PlotError>;
