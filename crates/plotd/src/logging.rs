//! Logging system setup.
//!
//! Installs a global `tracing` subscriber. `RUST_LOG` takes precedence over the
//! configured level, so a single module can be turned up without editing the
//! config file (e.g. `RUST_LOG=info,plot_index=debug`).

use crate::config::LoggingSettings;
use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Builds the filter: `RUST_LOG` if set and valid, otherwise `level`.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the logging system
///
/// # Arguments
/// * `settings` - Level and output format
///
/// # Returns
/// * `Result<()>` - Fails if a global subscriber is already installed
pub fn setup_logging(settings: &LoggingSettings) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(&settings.level));

    if settings.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", settings.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_level() {
        // Only meaningful without an ambient RUST_LOG
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(build_filter("warn").to_string(), "warn");
        }
    }

    #[test]
    fn test_second_init_fails_cleanly() {
        let settings = LoggingSettings::default();
        let _ = setup_logging(&settings);
        assert!(setup_logging(&settings).is_err());
    }
}
