//! Prometheus scrape endpoint for the detector counters.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracefold_core::config::MetricsConfig;
use tracefold_core::metrics as m;

/// Path served by the exporter's built-in listener.
const SCRAPE_PATH: &str = "/metrics";

/// Resolve `listen_addr:port`, refusing any path other than [`SCRAPE_PATH`].
pub fn scrape_address(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != SCRAPE_PATH {
        return Err(anyhow::anyhow!(
            "metrics endpoint '{}' is not served, use '{}'",
            config.endpoint,
            SCRAPE_PATH
        ));
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Install the global recorder and bind the scrape listener.
///
/// Fails when a recorder is already installed, so run it once per process.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = scrape_address(config)?;
    if addr.ip().is_unspecified() {
        tracing::warn!(listen_addr = %addr, "metrics endpoint bound to every interface");
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    m::describe_all();
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    tracing::info!(listen_addr = %addr, "prometheus metrics endpoint active");
    Ok(())
}
