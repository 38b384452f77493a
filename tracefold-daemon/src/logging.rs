//! stderr tracing setup.
//!
//! stdout is reserved for processed records, so every subscriber layer
//! built here writes to stderr.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tracefold_core::config::GeneralConfig;

/// Log line layout selected by `general.log_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line human-readable events.
    Pretty,
}

impl LogFormat {
    /// Parse the configured format name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            )),
        }
    }
}

/// `RUST_LOG` wins over `general.log_level` when it is set and parses.
fn level_filter(config: &GeneralConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Install the process-wide subscriber. Call once, before the first event.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let format = LogFormat::parse(&config.log_format)?;
    let registry = tracing_subscriber::registry().with(level_filter(config));

    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("failed to install {:?} log subscriber: {}", format, e))
}
