//! Configuration management for the plot daemon.
//!
//! Settings are loaded from a TOML file (written with defaults on first run)
//! and then overridden by command-line flags.

use crate::cli::CliArgs;
use anyhow::{Context, Result};
use plot_index::LocatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// World border distance; entities never roam further from the origin.
pub const MAX_PROBE_SPREAD: i32 = 30_000_000;

fn default_plots_file() -> PathBuf {
    PathBuf::from("data/plots.json")
}

fn default_backup_count() -> usize {
    3
}

fn default_autosave_interval() -> u64 {
    300 // 5 minutes
}

fn default_probe_enabled() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    50 // 20 ticks per second
}

fn default_entities() -> usize {
    100
}

fn default_spread() -> i32 {
    512
}

fn default_preload_radius() -> u32 {
    2
}

fn default_seed_plots() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache sizes and region limits for the locator
    #[serde(default)]
    pub locator: LocatorConfig,
    /// Where and how plots are persisted
    #[serde(default)]
    pub storage: StorageSettings,
    /// Synthetic lookup workload
    #[serde(default)]
    pub probe: ProbeSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Plot persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// JSON file holding every plot
    #[serde(default = "default_plots_file")]
    pub plots_file: PathBuf,
    /// Number of rotated backups kept next to the plot file
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,
    /// Seconds between autosave checks (0 disables autosave)
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            plots_file: default_plots_file(),
            backup_count: default_backup_count(),
            autosave_interval_secs: default_autosave_interval(),
        }
    }
}

/// Simulated entity workload settings.
///
/// Entities random-walk inside `±spread` blocks of the origin and resolve the
/// plot under them every tick, the way a protection or HUD system would.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(default = "default_probe_enabled")]
    pub enabled: bool,
    /// Milliseconds between simulation ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Number of simulated entities
    #[serde(default = "default_entities")]
    pub entities: usize,
    /// Half-width of the square the entities roam, in blocks
    #[serde(default = "default_spread")]
    pub spread: i32,
    /// Chunk cache warm-up radius around the origin, in cells
    #[serde(default = "default_preload_radius")]
    pub preload_radius: u32,
    /// Demo plots generated when the plot file holds none (0 disables)
    #[serde(default = "default_seed_plots")]
    pub seed_plots: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            enabled: default_probe_enabled(),
            tick_interval_ms: default_tick_interval(),
            entities: default_entities(),
            spread: default_spread(),
            preload_radius: default_preload_radius(),
            seed_plots: default_seed_plots(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

/// Cells in the `(2r + 1)^3` warm-up cube, or `None` on overflow.
fn preload_cells(radius: u32) -> Option<usize> {
    let edge = usize::try_from(radius).ok()?.checked_mul(2)?.checked_add(1)?;
    edge.checked_mul(edge)?.checked_mul(edge)
}

impl AppConfig {
    /// Loads configuration from `path`.
    ///
    /// When the file does not exist a default configuration is written there
    /// and returned.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of file values.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(plots_file) = &args.plots_file {
            self.storage.plots_file = plots_file.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
        if args.no_probe {
            self.probe.enabled = false;
        }
        if let Some(entities) = args.entities {
            self.probe.entities = entities;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.locator.validate().map_err(|e| e.to_string())?;

        if self.storage.plots_file.as_os_str().is_empty() {
            return Err("Plot file path cannot be empty".to_string());
        }

        if self.probe.enabled {
            if self.probe.tick_interval_ms == 0 {
                return Err("Probe tick interval must be greater than 0".to_string());
            }
            if !(1..=MAX_PROBE_SPREAD).contains(&self.probe.spread) {
                return Err(format!(
                    "Probe spread must be between 1 and {MAX_PROBE_SPREAD}, got {}",
                    self.probe.spread
                ));
            }
            if self.locator.chunk_cache_enabled {
                let capacity = self.locator.chunk_cache_capacity;
                let fits = preload_cells(self.probe.preload_radius).is_some_and(|cells| cells <= capacity);
                if !fits {
                    return Err(format!(
                        "Probe preload radius {} covers more cells than the chunk cache holds ({capacity})",
                        self.probe.preload_radius
                    ));
                }
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.locator.point_cache_capacity, 1000);
        assert_eq!(config.storage.plots_file, PathBuf::from("data/plots.json"));
        assert_eq!(config.storage.backup_count, 3);
        assert_eq!(config.probe.tick_interval_ms, 50);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("plotd.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        // The written file parses back to the same configuration
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[locator]
point_cache_capacity = 4096
chunk_cache_enabled = false

[storage]
plots_file = "/var/lib/plotd/plots.json"
autosave_interval_secs = 60

[probe]
enabled = false
entities = 10

[logging]
level = "debug"
json_format = true
"#;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plotd.toml");
        tokio::fs::write(&path, toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.locator.point_cache_capacity, 4096);
        assert_eq!(config.locator.chunk_cache_capacity, 1000);
        assert!(!config.locator.chunk_cache_enabled);
        assert_eq!(config.storage.plots_file, PathBuf::from("/var/lib/plotd/plots.json"));
        assert_eq!(config.storage.backup_count, 3);
        assert_eq!(config.storage.autosave_interval_secs, 60);
        assert!(!config.probe.enabled);
        assert_eq!(config.probe.entities, 10);
        assert_eq!(config.probe.spread, 512);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plotd.toml");
        tokio::fs::write(&path, "[locator\npoint_cache_capacity = ").await.unwrap();
        assert!(AppConfig::load_from_file(&path).await.is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            config_path: PathBuf::from("plotd.toml"),
            plots_file: Some(PathBuf::from("other.json")),
            log_level: Some("warn".to_string()),
            json_logs: true,
            no_probe: true,
            entities: Some(7),
        };
        config.apply_overrides(&args);

        assert_eq!(config.storage.plots_file, PathBuf::from("other.json"));
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.json_format);
        assert!(!config.probe.enabled);
        assert_eq!(config.probe.entities, 7);
    }

    #[test]
    fn test_validation_preload_radius_bounded_by_chunk_cache() {
        let mut config = AppConfig::default();
        config.locator.chunk_cache_capacity = 125;
        config.probe.preload_radius = 2;
        assert!(config.validate().is_ok());

        config.probe.preload_radius = 3;
        assert!(config.validate().is_err());

        config.probe.preload_radius = u32::MAX;
        assert!(config.validate().is_err());

        // Nothing is preloaded without the chunk cache or the probe
        config.locator.chunk_cache_enabled = false;
        assert!(config.validate().is_ok());
        config.locator.chunk_cache_enabled = true;
        config.probe.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_locator() {
        let mut config = AppConfig::default();
        config.locator.point_cache_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_probe_settings() {
        let mut config = AppConfig::default();
        config.probe.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        // Ignored when the probe is off
        config.probe.enabled = false;
        assert!(config.validate().is_ok());

        config.probe.enabled = true;
        config.probe.tick_interval_ms = 50;
        config.probe.spread = 0;
        assert!(config.validate().is_err());
    }
}
