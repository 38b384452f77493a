//! CLI argument definitions for tracefold-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use tracefold_core::config::TracefoldConfig;

/// Multi-line stack trace folding daemon.
///
/// Reads newline-delimited log records from stdin, groups the lines of
/// each exception stack trace into a single record, and writes the
/// result to stdout.
#[derive(Parser, Debug, Default)]
#[command(name = "tracefold-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to tracefold.toml configuration file.
    ///
    /// When omitted, built-in defaults are used (environment overrides still apply).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override input format (text, json).
    #[arg(long)]
    pub input_format: Option<String>,

    /// Validate configuration file and exit without reading input.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut TracefoldConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(format) = &self.input_format {
            config.detector.input_format = format.clone();
        }
    }
}
