//! Command-line interface for the plot daemon.
//!
//! Every flag is optional and overrides the matching value from the TOML
//! configuration file.

use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the plot data file
    pub plots_file: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Disable the synthetic lookup workload
    pub no_probe: bool,
    /// Optional override for the number of simulated entities
    pub entities: Option<usize>,
}

/// Builds the clap command definition.
pub fn command() -> Command {
    Command::new("plotd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Plot lookup daemon: owns one world's plot index, persists it and reports cache health")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("plotd.toml"),
        )
        .arg(
            Arg::new("plots")
                .short('p')
                .long("plots")
                .value_name("FILE")
                .help("Plot data file (JSON)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-probe")
                .long("no-probe")
                .help("Do not run the simulated entity workload")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("entities")
                .short('e')
                .long("entities")
                .value_name("COUNT")
                .help("Number of simulated entities")
                .value_parser(clap::value_parser!(usize)),
        )
}

impl CliArgs {
    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::try_parse_from(std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    /// Parses an explicit argument list.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("plotd.toml")),
            plots_file: matches.get_one::<String>("plots").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            no_probe: matches.get_flag("no-probe"),
            entities: matches.get_one::<usize>("entities").copied(),
        }
    }
}
