//! Synthetic lookup workload.
//!
//! Stands in for the simulation thread of a game server: a population of
//! entities random-walks around the origin and every tick each one asks the
//! locator which plot it is standing in. One entity per tick also sweeps a
//! 32×32 area through the chunk cache, the locality-heavy pattern of a viewport
//! or protection pre-scan.

use crate::config::ProbeSettings;
use plot_index::{BlockPos, PlotLocator, PlotResult, RegionId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// Ground level the entities walk on.
const GROUND_Y: i32 = 64;

/// Spacing of the demo plot grid, in blocks.
const SEED_TILE: i32 = 48;

/// Ticks between workload summaries.
const SUMMARY_EVERY: u64 = 200;

/// A simulated entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SimEntity {
    pub id: u32,
    pub pos: BlockPos,
    /// Plot the entity stood in after its last move
    pub current_plot: Option<RegionId>,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Point lookups performed
    pub lookups: usize,
    /// Entities standing inside a plot
    pub inside: usize,
    /// Entities that entered, left or switched plots
    pub transitions: usize,
    /// Blocks of the area sweep that resolved to a plot
    pub area_hits: usize,
}

/// Drives simulated entities against a shared locator.
pub struct Probe {
    locator: Arc<PlotLocator>,
    settings: ProbeSettings,
    entities: Vec<SimEntity>,
    rng: StdRng,
    ticks: u64,
}

impl Probe {
    /// Spawns `settings.entities` entities at random positions within `±spread`.
    pub fn new(locator: Arc<PlotLocator>, settings: ProbeSettings, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let spread = settings.spread.max(1);
        let entities = (0..settings.entities)
            .map(|i| SimEntity {
                id: i as u32,
                pos: BlockPos::new(
                    rng.gen_range(-spread..=spread),
                    GROUND_Y,
                    rng.gen_range(-spread..=spread),
                ),
                current_plot: None,
            })
            .collect();

        Self {
            locator,
            settings,
            entities,
            rng,
            ticks: 0,
        }
    }

    pub fn entities(&self) -> &[SimEntity] {
        &self.entities
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Preloads chunk cells around the origin ahead of the first tick.
    pub fn warm_up(&self) -> usize {
        self.locator
            .preload(BlockPos::new(0, GROUND_Y, 0), self.settings.preload_radius)
    }

    /// Moves every entity one step and resolves its plot.
    pub fn tick(&mut self) -> TickReport {
        let spread = self.settings.spread.max(1);
        let mut report = TickReport::default();

        for entity in &mut self.entities {
            let dx = self.rng.gen_range(-2..=2);
            let dz = self.rng.gen_range(-2..=2);
            let moved = entity.pos.offset(dx, 0, dz);
            entity.pos = BlockPos::new(
                moved.x.clamp(-spread, spread),
                GROUND_Y,
                moved.z.clamp(-spread, spread),
            );

            let plot = self
                .locator
                .get_region_at(entity.pos)
                .map(|region| region.id().clone());
            report.lookups += 1;

            if plot.is_some() {
                report.inside += 1;
            }
            if plot != entity.current_plot {
                report.transitions += 1;
                trace!(
                    "Entity {} at {}: {:?} -> {:?}",
                    entity.id,
                    entity.pos,
                    entity.current_plot.as_ref().map(RegionId::as_str),
                    plot.as_ref().map(RegionId::as_str)
                );
                entity.current_plot = plot;
            }
        }

        if !self.entities.is_empty() {
            let anchor = self.entities[self.rng.gen_range(0..self.entities.len())].pos;
            for dx in -16..16 {
                for dz in -16..16 {
                    if self
                        .locator
                        .get_region_at_chunked(anchor.offset(dx, 0, dz))
                        .is_some()
                    {
                        report.area_hits += 1;
                    }
                }
            }
        }

        self.ticks += 1;
        report
    }

    /// Ticks forever at the configured interval. Stop it by aborting the task.
    pub async fn run(mut self) {
        let loaded = self.warm_up();
        info!(
            "🚶 Probe started: {} entities, ±{} blocks, {}ms ticks ({} cells preloaded)",
            self.entities().len(),
            self.settings.spread,
            self.settings.tick_interval_ms,
            loaded
        );

        let mut interval =
            tokio::time::interval(Duration::from_millis(self.settings.tick_interval_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut transitions = 0usize;
        loop {
            interval.tick().await;
            let report = self.tick();
            transitions += report.transitions;

            if self.ticks() % SUMMARY_EVERY == 0 {
                debug!(
                    "Probe tick {}: {} of {} entities inside plots, {} plot transitions since last summary",
                    self.ticks(),
                    report.inside,
                    report.lookups,
                    transitions
                );
                transitions = 0;
            }
        }
    }
}

/// Fills an empty world with demo plots on a 48-block grid within `±spread`.
///
/// Plots never overlap. Returns the number created.
pub fn seed_plots(locator: &PlotLocator, count: usize, spread: i32, seed: u64) -> PlotResult<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let tiles_per_axis = ((spread.max(1) * 2) / SEED_TILE).max(1);
    let tile_count = (tiles_per_axis as usize).saturating_mul(tiles_per_axis as usize);

    let mut created = 0;
    for tile in 0..count.min(tile_count) {
        let tx = (tile % tiles_per_axis as usize) as i32;
        let tz = (tile / tiles_per_axis as usize) as i32;
        let corner = BlockPos::new(
            -spread + tx * SEED_TILE + rng.gen_range(0..8),
            GROUND_Y - rng.gen_range(0..8),
            -spread + tz * SEED_TILE + rng.gen_range(0..8),
        );
        let opposite = corner.offset(
            rng.gen_range(8..SEED_TILE - 8),
            rng.gen_range(8..24),
            rng.gen_range(8..SEED_TILE - 8),
        );
        locator.create_region(None, corner, opposite)?;
        created += 1;
    }

    info!("🌱 Seeded {} demo plots", created);
    Ok(created)
}
