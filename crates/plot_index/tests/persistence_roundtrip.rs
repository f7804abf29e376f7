//! Locator load/save through the JSON file backend.

use plot_index::{
    BlockPos, JsonRegionFile, MemoryRegions, PlotError, PlotKind, PlotLocator, PlotResult, Region,
    RegionId, RegionPersistence,
};
use std::fs;
use tempfile::TempDir;

fn pos(x: i32, y: i32, z: i32) -> BlockPos {
    BlockPos::new(x, y, z)
}

/// Backend whose saves always fail.
struct ReadOnlyDisk;

impl RegionPersistence for ReadOnlyDisk {
    fn load_all(&self) -> PlotResult<Vec<Region>> {
        Ok(Vec::new())
    }

    fn save_all(&self, _regions: &[Region]) -> PlotResult<()> {
        Err(PlotError::Persistence("disk is read-only".to_string()))
    }
}

#[test]
fn test_save_and_reload_into_fresh_locator() {
    let dir = TempDir::new().unwrap();
    let file = JsonRegionFile::new(dir.path().join("plots.json"), 3);

    let locator = PlotLocator::default();
    locator.create_region(None, pos(0, 60, 0), pos(31, 70, 31)).unwrap();
    locator.create_region(None, pos(100, 60, 0), pos(120, 70, 20)).unwrap();
    locator
        .add_region(
            Region::new(RegionId::new("market"), pos(-50, 0, -50), pos(-10, 20, -10))
                .unwrap()
                .with_kind(PlotKind::Commercial)
                .with_attribute("owner", "guild"),
        )
        .unwrap();
    assert!(locator.is_dirty());

    assert_eq!(locator.save_to(&file).unwrap(), 3);
    assert!(!locator.is_dirty());

    let restored = PlotLocator::default();
    assert_eq!(restored.load_from(&file).unwrap(), 3);
    assert!(!restored.is_dirty());
    assert_eq!(restored.index().snapshot(), locator.index().snapshot());

    let market = restored.get_region_at(pos(-20, 5, -20)).unwrap();
    assert_eq!(market.kind(), PlotKind::Commercial);
    assert_eq!(market.attributes().get("owner").map(String::as_str), Some("guild"));

    // Generated ids continue after the highest stored plot_<n>
    let next = restored.create_region(None, pos(500, 0, 0), pos(501, 1, 1)).unwrap();
    assert_eq!(next.id().as_str(), "plot_3");
}

#[test]
fn test_load_replaces_existing_regions() {
    let memory = MemoryRegions::new(vec![
        Region::new(RegionId::new("plot_7"), pos(0, 0, 0), pos(5, 5, 5)).unwrap(),
    ]);

    let locator = PlotLocator::default();
    locator.create_region(Some("old"), pos(100, 0, 0), pos(110, 10, 10)).unwrap();
    assert!(locator.get_region_at(pos(105, 5, 5)).is_some());

    assert_eq!(locator.load_from(&memory).unwrap(), 1);
    assert!(!locator.has_region("old"));
    assert!(locator.get_region_at(pos(105, 5, 5)).is_none());
    assert!(locator.get_region_at(pos(2, 2, 2)).is_some());

    let next = locator.create_region(None, pos(20, 0, 0), pos(21, 1, 1)).unwrap();
    assert_eq!(next.id().as_str(), "plot_8");
}

#[test]
fn test_oversized_stored_region_is_skipped() {
    let memory = MemoryRegions::new(vec![
        Region::new(RegionId::new("huge"), pos(0, 0, 0), pos(20_000, 1, 1)).unwrap(),
        Region::new(RegionId::new("fine"), pos(0, 10, 0), pos(5, 15, 5)).unwrap(),
    ]);

    let locator = PlotLocator::default();
    assert_eq!(locator.load_from(&memory).unwrap(), 1);
    assert!(locator.has_region("fine"));
    assert!(!locator.has_region("huge"));
}

#[test]
fn test_corrupt_file_marks_locator_unhealthy() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plots.json");
    fs::write(&path, "definitely not json").unwrap();

    let locator = PlotLocator::default();
    let result = locator.load_from(&JsonRegionFile::new(&path, 2));
    assert!(matches!(result, Err(PlotError::Persistence(_))));

    let health = locator.health();
    assert!(!health.healthy);
    assert!(health.last_error.is_some());

    // A later successful load clears the error
    let empty = MemoryRegions::default();
    locator.load_from(&empty).unwrap();
    assert!(locator.health().healthy);
}

#[test]
fn test_failed_save_keeps_dirty_flag() {
    let locator = PlotLocator::default();
    locator.create_region(None, pos(0, 0, 0), pos(1, 1, 1)).unwrap();

    assert!(locator.save_to(&ReadOnlyDisk).is_err());
    assert!(locator.is_dirty());
    assert!(!locator.health().healthy);

    let memory = MemoryRegions::default();
    locator.save_to(&memory).unwrap();
    assert!(!locator.is_dirty());
    assert!(locator.health().healthy);
    assert_eq!(memory.len(), 1);
}
