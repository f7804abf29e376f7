//! Plot daemon entry point.
//!
//! Loads configuration, restores the plot set from disk into a [`PlotLocator`],
//! runs the synthetic lookup workload, reports cache health every minute,
//! autosaves changed plots and saves once more on shutdown.

mod cli;
mod config;
mod logging;
mod probe;
mod signals;

use anyhow::{anyhow, Context, Result};
use cli::CliArgs;
use config::AppConfig;
use plot_index::{JsonRegionFile, LocatorStatistics, PlotLocator};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Seconds between statistics reports.
const MONITOR_INTERVAL_SECS: u64 = 60;

// ============================================================================
// Application
// ============================================================================

/// Owns the locator and its storage for the lifetime of the process.
pub struct Application {
    config: AppConfig,
    locator: Arc<PlotLocator>,
    storage: Arc<JsonRegionFile>,
}

impl Application {
    /// Builds the locator and restores plots from disk.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let locator = Arc::new(PlotLocator::new(config.locator.clone())?);
        let storage = Arc::new(JsonRegionFile::new(
            config.storage.plots_file.clone(),
            config.storage.backup_count,
        ));

        let loaded = {
            let locator = locator.clone();
            let storage = storage.clone();
            tokio::task::spawn_blocking(move || locator.load_from(&*storage)).await??
        };

        if loaded == 0 && config.probe.enabled && config.probe.seed_plots > 0 {
            probe::seed_plots(&locator, config.probe.seed_plots, config.probe.spread, 0x5eed)?;
        }

        info!(
            "📂 Plots: {} ({} loaded)",
            config.storage.plots_file.display(),
            loaded
        );

        Ok(Self {
            config,
            locator,
            storage,
        })
    }

    /// Runs until a shutdown signal arrives, then saves and reports.
    pub async fn run(self) -> Result<()> {
        info!("📋 Configuration Summary:");
        info!(
            "  🗺️ Point cache: {} | Chunk cache: {} ({})",
            self.config.locator.point_cache_capacity,
            self.config.locator.chunk_cache_capacity,
            if self.config.locator.chunk_cache_enabled { "enabled" } else { "disabled" }
        );
        info!("  📏 Max region extent: {} blocks", self.config.locator.max_region_extent);
        info!(
            "  💾 Autosave: {}",
            match self.config.storage.autosave_interval_secs {
                0 => "disabled".to_string(),
                secs => format!("every {}s", secs),
            }
        );

        let probe_handle = if self.config.probe.enabled {
            let probe = probe::Probe::new(self.locator.clone(), self.config.probe.clone(), rand::random());
            Some(tokio::spawn(probe.run()))
        } else {
            info!("🚶 Probe disabled");
            None
        };

        let monitoring_handle = {
            let locator = self.locator.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(MONITOR_INTERVAL_SECS));
                interval.tick().await;
                let mut last_queries = 0u64;

                loop {
                    interval.tick().await;
                    let stats = locator.cache_statistics();
                    let queries_this_period = stats.locator.queries.saturating_sub(last_queries);
                    last_queries = stats.locator.queries;
                    log_statistics(&stats);
                    info!("📊 {} lookups/min", queries_this_period);
                }
            })
        };

        let autosave_handle = match self.config.storage.autosave_interval_secs {
            0 => None,
            secs => {
                let locator = self.locator.clone();
                let storage = self.storage.clone();
                Some(tokio::spawn(async move {
                    let mut interval = tokio::time::interval(Duration::from_secs(secs));
                    interval.tick().await;
                    loop {
                        interval.tick().await;
                        if locator.is_dirty() {
                            if let Err(e) = save(&locator, &storage).await {
                                warn!("⚠️ Autosave failed: {}", e);
                            }
                        }
                    }
                }))
            }
        };

        info!("✅ plotd is now running with {} plots", self.locator.region_count());
        info!("🔍 Health monitoring active - stats every {} seconds", MONITOR_INTERVAL_SECS);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let signal = signals::wait_for_shutdown().await?;
        info!("🛑 {} received, initiating graceful shutdown...", signal);

        monitoring_handle.abort();
        if let Some(handle) = autosave_handle {
            handle.abort();
        }
        if let Some(handle) = probe_handle {
            handle.abort();
        }

        if self.locator.is_dirty() {
            save(&self.locator, &self.storage)
                .await
                .context("final save failed")?;
        }

        info!("📊 Final Statistics:");
        log_statistics(&self.locator.cache_statistics());
        let health = self.locator.health();
        if !health.healthy {
            warn!("⚠️ Locator unhealthy at shutdown: {:?}", health.last_error);
        }

        info!("👋 plotd shutdown complete");
        Ok(())
    }
}

/// Reads the config file and applies command-line overrides.
async fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    config.apply_overrides(args);
    config
        .validate()
        .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;
    Ok(config)
}

/// Saves on the blocking pool so file I/O never stalls the runtime.
async fn save(locator: &Arc<PlotLocator>, storage: &Arc<JsonRegionFile>) -> Result<usize> {
    let locator = locator.clone();
    let storage = storage.clone();
    let saved = tokio::task::spawn_blocking(move || locator.save_to(&*storage)).await??;
    Ok(saved)
}

fn log_statistics(stats: &LocatorStatistics) {
    info!("📊 PointCache: {}", stats.point);
    info!("📊 ChunkCache: {}", stats.chunk);
    info!("📊 {}", stats.index);
    info!(
        "📊 Lookups: {} | fallback scans: {} | self-heals: {}",
        stats.locator.queries, stats.locator.fallback_scans, stats.locator.self_heals
    );
    if stats.locator.self_heals > 0 {
        warn!(
            "⚠️ {} index repairs so far; check for missed invalidations",
            stats.locator.self_heals
        );
    }
}

/// Display startup banner using proper logging
fn display_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("╔══════════════════════════════════════════╗");
    info!("║              🗺️  PLOTD v{:<8}          ║", version);
    info!("║                                          ║");
    info!("║  Chunk-grid plot index                   ║");
    info!("║  Point + chunk LRU caches                ║");
    info!("║  Self-healing lookups                    ║");
    info!("╚══════════════════════════════════════════╝");
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    let config = match load_config(&args).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {:?}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = logging::setup_logging(&config.logging) {
        eprintln!("❌ Failed to initialize logging: {:?}", e);
        std::process::exit(1);
    }
    display_banner();
    info!("📂 Config: {}", args.config_path.display());

    match Application::new(config).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plot_index::{BlockPos, RegionPersistence};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_helper_writes_plots() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonRegionFile::new(dir.path().join("plots.json"), 1));
        let locator = Arc::new(PlotLocator::default());
        locator
            .create_region(None, BlockPos::new(0, 0, 0), BlockPos::new(9, 9, 9))
            .unwrap();

        assert_eq!(save(&locator, &storage).await.unwrap(), 1);
        assert!(!locator.is_dirty());
        assert_eq!(storage.load_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_application_restores_plots() {
        let dir = TempDir::new().unwrap();
        let plots_file = dir.path().join("plots.json");
        JsonRegionFile::new(&plots_file, 0)
            .save_all(&[plot_index::Region::new(
                plot_index::RegionId::new("plot_4"),
                BlockPos::new(0, 0, 0),
                BlockPos::new(10, 10, 10),
            )
            .unwrap()])
            .unwrap();

        let args = CliArgs {
            config_path: dir.path().join("plotd.toml"),
            plots_file: Some(plots_file),
            log_level: Some("warn".to_string()),
            json_logs: false,
            no_probe: true,
            entities: None,
        };

        let config = load_config(&args).await.unwrap();
        assert!(args.config_path.exists());
        let app = Application::new(config).await.unwrap();
        assert_eq!(app.locator.region_count(), 1);
        assert!(app.locator.get_region_at(BlockPos::new(5, 5, 5)).is_some());
        assert!(!app.locator.is_dirty());
        assert!(!app.config.probe.enabled);
        assert_eq!(app.config.storage.plots_file, dir.path().join("plots.json"));
    }
}
