//! # Core Type Definitions
//!
//! This module contains the geometric and identity types shared by every
//! component of the plot index.
//!
//! ## Key Types
//!
//! - [`BlockPos`] - Integer block coordinate in world space
//! - [`GridCell`] - A 16×16×16 cube of world space addressed by floor-divided coordinates
//! - [`CellRange`] - Inclusive box of grid cells
//! - [`RegionId`] - Cheaply clonable, immutable region identifier
//! - [`Region`] - An axis-aligned claimed box with an opaque attribute payload
//!
//! ## Design Principles
//!
//! - **Floor division**: negative coordinates map to negative cells (`-1 → -1`, not `0`)
//! - **Immutability**: a [`Region`] has no setters; bound changes produce a new value
//!   that must go through the locator's replace cycle
//! - **Serialization**: regions round-trip through JSON and are re-validated on the way in

use crate::error::{PlotError, PlotResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Edge length of a grid cell in blocks.
pub const CELL_SIZE: i32 = 16;

/// Longest accepted region id, in characters.
pub const MAX_REGION_ID_LENGTH: usize = 64;

/// Maps a single block coordinate onto its grid cell coordinate.
///
/// Uses Euclidean (floor) division so that blocks `-16..=-1` land in cell `-1`.
///
/// ```rust
/// use plot_index::grid_cell_of;
///
/// assert_eq!(grid_cell_of(-1), -1);
/// assert_eq!(grid_cell_of(16), 1);
/// ```
#[inline]
pub fn grid_cell_of(coord: i32) -> i32 {
    coord.div_euclid(CELL_SIZE)
}

// ============================================================================
// Positions and cells
// ============================================================================

/// Integer block coordinate in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    /// X coordinate (east-west)
    pub x: i32,
    /// Y coordinate (vertical)
    pub y: i32,
    /// Z coordinate (north-south)
    pub z: i32,
}

impl BlockPos {
    /// Creates a new block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Componentwise minimum of two positions.
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Componentwise maximum of two positions.
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// Returns true when `self <= other` on every axis.
    pub fn le_all(self, other: Self) -> bool {
        self.x <= other.x && self.y <= other.y && self.z <= other.z
    }

    /// The grid cell this block belongs to.
    pub fn cell(self) -> GridCell {
        GridCell::of(self)
    }

    /// Returns a copy shifted by the given deltas, saturating at the i32 range.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.z.saturating_add(dz),
        )
    }

    /// True when this position lies inside the inclusive box `[min, max]`.
    #[inline]
    pub fn within(self, min: BlockPos, max: BlockPos) -> bool {
        min.le_all(self) && self.le_all(max)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<(i32, i32, i32)> for BlockPos {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self::new(x, y, z)
    }
}

/// A fixed-size cube of world space, `CELL_SIZE` blocks on each edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub cx: i32,
    pub cy: i32,
    pub cz: i32,
}

impl GridCell {
    /// Creates a cell from raw cell coordinates.
    pub const fn new(cx: i32, cy: i32, cz: i32) -> Self {
        Self { cx, cy, cz }
    }

    /// The cell containing a block position.
    #[inline]
    pub fn of(pos: BlockPos) -> Self {
        Self::new(grid_cell_of(pos.x), grid_cell_of(pos.y), grid_cell_of(pos.z))
    }

    /// Lowest block corner covered by this cell.
    pub fn min_block(self) -> BlockPos {
        BlockPos::new(
            self.cx.saturating_mul(CELL_SIZE),
            self.cy.saturating_mul(CELL_SIZE),
            self.cz.saturating_mul(CELL_SIZE),
        )
    }

    /// Highest block corner covered by this cell.
    pub fn max_block(self) -> BlockPos {
        self.min_block().offset(CELL_SIZE - 1, CELL_SIZE - 1, CELL_SIZE - 1)
    }

    /// Neighbouring cell at the given cell offset.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(
            self.cx.saturating_add(dx),
            self.cy.saturating_add(dy),
            self.cz.saturating_add(dz),
        )
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.cx, self.cy, self.cz)
    }
}

/// Inclusive box of grid cells, as covered by a block-space box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub min: GridCell,
    pub max: GridCell,
}

impl CellRange {
    /// Cell range covering the block box `[min, max]`.
    ///
    /// The caller guarantees `min <= max` componentwise.
    pub fn covering(min: BlockPos, max: BlockPos) -> Self {
        Self {
            min: GridCell::of(min),
            max: GridCell::of(max),
        }
    }

    /// Cube of cells `(2 * radius + 1)^3` centred on `center`.
    pub fn around(center: GridCell, radius: u32) -> Self {
        let r = i32::try_from(radius).unwrap_or(i32::MAX);
        Self {
            min: center.offset(-r, -r, -r),
            max: center.offset(r, r, r),
        }
    }

    /// Number of cells in the range, or `None` when it does not fit in `usize`.
    ///
    /// A box spanning most of the `i32` world on every axis has more than
    /// 2^64 cells.
    pub fn checked_len(&self) -> Option<usize> {
        let span = |lo: i32, hi: i32| usize::try_from((i64::from(hi) - i64::from(lo) + 1).max(0)).ok();
        span(self.min.cx, self.max.cx)?
            .checked_mul(span(self.min.cy, self.max.cy)?)?
            .checked_mul(span(self.min.cz, self.max.cz)?)
    }

    /// Number of cells in the range, saturating at `usize::MAX`.
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    /// True when the range holds no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `cell` lies inside the range.
    pub fn contains(&self, cell: GridCell) -> bool {
        (self.min.cx..=self.max.cx).contains(&cell.cx)
            && (self.min.cy..=self.max.cy).contains(&cell.cy)
            && (self.min.cz..=self.max.cz).contains(&cell.cz)
    }

    /// Iterates cells in x-major, then y, then z order.
    pub fn iter(&self) -> impl Iterator<Item = GridCell> {
        let (min, max) = (self.min, self.max);
        (min.cx..=max.cx).flat_map(move |cx| {
            (min.cy..=max.cy)
                .flat_map(move |cy| (min.cz..=max.cz).map(move |cz| GridCell::new(cx, cy, cz)))
        })
    }
}

// ============================================================================
// Region identity
// ============================================================================

/// Immutable region identifier.
///
/// Backed by an `Arc<str>` so that the index and both caches can hold copies
/// without reallocating. Hashing and ordering follow the underlying string, so
/// maps keyed by `RegionId` can be queried with a plain `&str`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(Arc<str>);

impl RegionId {
    /// Creates an id without validation. Use [`RegionId::parse`] for user input.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Validates and creates an id.
    ///
    /// Accepts letters, digits, space, `-`, `_` and `.`; rejects blank ids and ids
    /// longer than [`MAX_REGION_ID_LENGTH`] characters.
    pub fn parse(id: &str) -> PlotResult<Self> {
        let invalid = |reason: &str| PlotError::InvalidId {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        if id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if id.chars().count() > MAX_REGION_ID_LENGTH {
            return Err(invalid("id is longer than 64 characters"));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.')))
        {
            return Err(invalid(&format!("id contains invalid character '{bad}'")));
        }

        Ok(Self::new(id))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RegionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RegionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for RegionId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for RegionId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl Serialize for RegionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RegionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RegionId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Regions
// ============================================================================

/// Business category of a plot.
///
/// Carried for collaborators; the index never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    #[default]
    Residential,
    Commercial,
    Shop,
    Public,
    Government,
}

/// An axis-aligned claimed box of world space.
///
/// `min <= max` holds on every axis for every constructed value. Fields are
/// private: a region stored in the locator can never be moved in place, so
/// the index never holds cells for bounds that no longer exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RegionRecord")]
pub struct Region {
    id: RegionId,
    min: BlockPos,
    max: BlockPos,
    #[serde(default)]
    kind: PlotKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

/// Unvalidated wire shape of a [`Region`].
#[derive(Deserialize)]
struct RegionRecord {
    id: RegionId,
    min: BlockPos,
    max: BlockPos,
    #[serde(default)]
    kind: PlotKind,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

impl TryFrom<RegionRecord> for Region {
    type Error = PlotError;

    fn try_from(record: RegionRecord) -> Result<Self, Self::Error> {
        let mut region = Region::new(record.id, record.min, record.max)?;
        region.kind = record.kind;
        region.attributes = record.attributes;
        Ok(region)
    }
}

impl Region {
    /// Creates a region from explicit bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidBounds`] when `min > max` on any axis.
    pub fn new(id: RegionId, min: BlockPos, max: BlockPos) -> PlotResult<Self> {
        if !min.le_all(max) {
            return Err(PlotError::InvalidBounds { min, max });
        }

        Ok(Self {
            id,
            min,
            max,
            kind: PlotKind::default(),
            attributes: BTreeMap::new(),
        })
    }

    /// Creates a region spanning two arbitrary opposite corners.
    pub fn from_corners(id: RegionId, a: BlockPos, b: BlockPos) -> Self {
        Self {
            id,
            min: a.min(b),
            max: a.max(b),
            kind: PlotKind::default(),
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the plot kind.
    pub fn with_kind(mut self, kind: PlotKind) -> Self {
        self.kind = kind;
        self
    }

    /// Adds an opaque attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns a copy of this region with new bounds and the same id and payload.
    ///
    /// The copy is detached; to apply it, hand it to
    /// [`PlotLocator::replace_region`](crate::PlotLocator::replace_region).
    pub fn with_bounds(&self, min: BlockPos, max: BlockPos) -> PlotResult<Self> {
        if !min.le_all(max) {
            return Err(PlotError::InvalidBounds { min, max });
        }
        Ok(Self {
            min,
            max,
            ..self.clone()
        })
    }

    pub fn id(&self) -> &RegionId {
        &self.id
    }

    pub fn min(&self) -> BlockPos {
        self.min
    }

    pub fn max(&self) -> BlockPos {
        self.max
    }

    pub fn kind(&self) -> PlotKind {
        self.kind
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Exact containment test, inclusive on both ends.
    #[inline]
    pub fn contains(&self, pos: BlockPos) -> bool {
        pos.within(self.min, self.max)
    }

    /// True when this region's box intersects the box `[min, max]`.
    #[inline]
    pub fn overlaps_box(&self, min: BlockPos, max: BlockPos) -> bool {
        self.min.le_all(max) && min.le_all(self.max)
    }

    /// True when this region's box intersects the block bounds of `cell`.
    #[inline]
    pub fn overlaps_cell(&self, cell: GridCell) -> bool {
        self.overlaps_box(cell.min_block(), cell.max_block())
    }

    /// Grid cells overlapped by this region.
    pub fn cells(&self) -> CellRange {
        CellRange::covering(self.min, self.max)
    }

    /// Largest per-axis extent as `(axis, max - min)`.
    pub fn largest_extent(&self) -> (char, u32) {
        let extent = |lo: i32, hi: i32| hi.abs_diff(lo);
        [
            ('x', extent(self.min.x, self.max.x)),
            ('y', extent(self.min.y, self.max.y)),
            ('z', extent(self.min.z, self.max.z)),
        ]
        .into_iter()
        .max_by_key(|(_, e)| *e)
        .unwrap_or(('x', 0))
    }

    /// Number of blocks enclosed by the region.
    pub fn volume(&self) -> u64 {
        let side = |lo: i32, hi: i32| u64::from(hi.abs_diff(lo)) + 1;
        side(self.min.x, self.max.x) * side(self.min.y, self.max.y) * side(self.min.z, self.max.z)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}..{}", self.id, self.min, self.max)
    }
}
