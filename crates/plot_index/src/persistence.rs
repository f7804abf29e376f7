//! # Region Persistence
//!
//! The locator never touches the file system on its own. Hosts hand it a
//! [`RegionPersistence`] implementation at startup ([`PlotLocator::load_from`])
//! and whenever they want a snapshot written ([`PlotLocator::save_to`]).
//!
//! [`JsonRegionFile`] stores all regions in one pretty-printed JSON object keyed
//! by region id. Saves go through a temporary file and a rename, keeping a
//! configurable number of numbered backups. A file that fails to parse is
//! copied aside and the newest readable backup is used instead.
//!
//! [`PlotLocator::load_from`]: crate::PlotLocator::load_from
//! [`PlotLocator::save_to`]: crate::PlotLocator::save_to

use crate::error::{PlotError, PlotResult};
use crate::types::Region;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Storage backend for the full region set.
pub trait RegionPersistence: Send + Sync {
    /// Loads every stored region. An absent store yields an empty list.
    fn load_all(&self) -> PlotResult<Vec<Region>>;

    /// Replaces the stored region set with `regions`.
    fn save_all(&self, regions: &[Region]) -> PlotResult<()>;
}

/// JSON file backend with rotating backups.
#[derive(Debug, Clone)]
pub struct JsonRegionFile {
    path: PathBuf,
    backup_count: usize,
}

impl JsonRegionFile {
    /// # Arguments
    ///
    /// * `path` - Target file, created on first save
    /// * `backup_count` - Number of `<file>.bak.<n>` generations to keep (0 disables backups)
    pub fn new(path: impl Into<PathBuf>, backup_count: usize) -> Self {
        Self {
            path: path.into(),
            backup_count,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of backup generation `n`; 1 is the newest.
    pub fn backup_path(&self, n: usize) -> PathBuf {
        self.sibling(&format!(".bak.{n}"))
    }

    fn tmp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn read(path: &Path) -> PlotResult<Vec<Region>> {
        let text = fs::read_to_string(path)?;
        let stored: BTreeMap<String, Region> = serde_json::from_str(&text)?;

        let mut regions = Vec::with_capacity(stored.len());
        for (key, region) in stored {
            if region.id().as_str() != key {
                return Err(PlotError::Persistence(format!(
                    "entry '{}' holds region with id '{}'",
                    key,
                    region.id()
                )));
            }
            regions.push(region);
        }
        Ok(regions)
    }

    /// Copies an unreadable file aside as `<file>.CORRUPT_<unix_ts>`.
    fn quarantine(&self) -> PlotResult<PathBuf> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let target = self.sibling(&format!(".CORRUPT_{timestamp}"));
        fs::copy(&self.path, &target)?;
        Ok(target)
    }

    /// Puts a good backup back in place of an unreadable primary file, so the
    /// next save rotates readable data into the backups.
    fn restore_from(&self, backup: &Path) -> PlotResult<()> {
        let tmp = self.tmp_path();
        fs::copy(backup, &tmp)?;
        fs::rename(&tmp, &self.path)?;
        info!("Restored {} from {}", self.path.display(), backup.display());
        Ok(())
    }

    fn rotate_backups(&self) -> PlotResult<()> {
        if self.backup_count == 0 || !self.path.exists() {
            return Ok(());
        }

        let oldest = self.backup_path(self.backup_count);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.backup_count).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        fs::copy(&self.path, self.backup_path(1))?;
        Ok(())
    }
}

impl RegionPersistence for JsonRegionFile {
    fn load_all(&self) -> PlotResult<Vec<Region>> {
        if !self.path.exists() {
            info!("No plot file at {}, starting empty", self.path.display());
            return Ok(Vec::new());
        }

        let primary_error = match Self::read(&self.path) {
            Ok(regions) => {
                debug!("Read {} plots from {}", regions.len(), self.path.display());
                return Ok(regions);
            }
            Err(e) => e,
        };

        warn!("⚠️ Plot file {} is unreadable: {}", self.path.display(), primary_error);
        let quarantined = self.quarantine()?;
        warn!("Copied unreadable plot file to {}", quarantined.display());

        for n in 1..=self.backup_count {
            let backup = self.backup_path(n);
            if !backup.exists() {
                continue;
            }
            match Self::read(&backup) {
                Ok(regions) => {
                    warn!(
                        "⚠️ Recovered {} plots from backup {}",
                        regions.len(),
                        backup.display()
                    );
                    self.restore_from(&backup)?;
                    return Ok(regions);
                }
                Err(e) => warn!("Backup {} is unreadable too: {}", backup.display(), e),
            }
        }

        error!("❌ No usable plot data at {}", self.path.display());
        Err(PlotError::Persistence(format!(
            "{} is unreadable ({}) and no backup could be loaded; original kept at {}",
            self.path.display(),
            primary_error,
            quarantined.display()
        )))
    }

    fn save_all(&self, regions: &[Region]) -> PlotResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let stored: BTreeMap<&str, &Region> = regions
            .iter()
            .map(|region| (region.id().as_str(), region))
            .collect();
        let json = serde_json::to_string_pretty(&stored)?;

        let tmp = self.tmp_path();
        fs::write(&tmp, json)?;
        self.rotate_backups()?;
        fs::rename(&tmp, &self.path)?;

        debug!("Wrote {} plots to {}", stored.len(), self.path.display());
        Ok(())
    }
}

/// Volatile backend holding the last saved set in memory.
///
/// Useful for hosts that manage storage elsewhere, and for tests.
#[derive(Debug, Default)]
pub struct MemoryRegions {
    regions: Mutex<Vec<Region>>,
}

impl MemoryRegions {
    pub fn new(regions: Vec<Region>) -> Self {
        Self {
            regions: Mutex::new(regions),
        }
    }

    pub fn len(&self) -> usize {
        self.regions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.lock().is_empty()
    }
}

impl RegionPersistence for MemoryRegions {
    fn load_all(&self) -> PlotResult<Vec<Region>> {
        Ok(self.regions.lock().clone())
    }

    fn save_all(&self, regions: &[Region]) -> PlotResult<()> {
        *self.regions.lock() = regions.to_vec();
        Ok(())
    }
}
