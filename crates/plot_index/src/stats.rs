//! Statistics and health snapshots reported by the locator.

use crate::cache::CacheStats;
use crate::spatial::IndexStats;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Query-path counters for the locator itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocatorStats {
    /// Calls to `get_region_at`
    pub queries: u64,
    /// Queries that fell through to the linear scan
    pub fallback_scans: u64,
    /// Fallback scans that found a region the index missed and re-indexed it
    pub self_heals: u64,
}

/// Everything `cache_statistics` reports, in one serializable value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocatorStatistics {
    pub point: CacheStats,
    pub chunk: CacheStats,
    pub index: IndexStats,
    pub locator: LocatorStats,
}

impl fmt::Display for LocatorStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PointCache[{}]", self.point)?;
        writeln!(f, "ChunkCache[{}]", self.chunk)?;
        writeln!(f, "{}", self.index)?;
        write!(
            f,
            "Locator[queries={}, fallback_scans={}, self_heals={}]",
            self.locator.queries, self.locator.fallback_scans, self.locator.self_heals
        )
    }
}

/// Coarse health summary for host monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocatorHealth {
    /// False after a persistence failure, until the next successful load or save
    pub healthy: bool,
    pub last_error: Option<String>,
    pub regions: usize,
    pub point_hit_rate: f64,
}

#[derive(Debug, Default)]
pub(crate) struct LocatorCounters {
    queries: AtomicU64,
    fallback_scans: AtomicU64,
    self_heals: AtomicU64,
}

impl LocatorCounters {
    pub(crate) fn query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fallback_scan(&self) {
        self.fallback_scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a self-heal and returns the running total.
    pub(crate) fn self_heal(&self) -> u64 {
        self.self_heals.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn reset(&self) {
        self.queries.store(0, Ordering::Relaxed);
        self.fallback_scans.store(0, Ordering::Relaxed);
        self.self_heals.store(0, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LocatorStats {
        LocatorStats {
            queries: self.queries.load(Ordering::Relaxed),
            fallback_scans: self.fallback_scans.load(Ordering::Relaxed),
            self_heals: self.self_heals.load(Ordering::Relaxed),
        }
    }
}
