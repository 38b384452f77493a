use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;

use tracefold_core::config::TracefoldConfig;
use tracefold_daemon::cli::DaemonCli;
use tracefold_daemon::runner::{self, Daemon};
use tracefold_daemon::{logging, metrics_server};
use tracefold_detector::AccumulatorConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // Config: file -> env -> CLI -> validate
    let mut config = match &cli.config {
        Some(path) => TracefoldConfig::from_file(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?,
        None => TracefoldConfig::default(),
    };
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    AccumulatorConfig::from_core(&config.detector)
        .validate()
        .map_err(|e| anyhow::anyhow!("detector config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration is valid");
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tracefold-daemon starting");

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    let daemon = Daemon::build_from_config(config)?;
    let shutdown = async {
        match runner::wait_for_shutdown_signal().await {
            Ok(signal) => tracing::info!(signal, "shutdown signal received"),
            Err(e) => {
                tracing::error!(error = %e, "signal handler unavailable, running until eof");
                std::future::pending::<()>().await;
            }
        }
    };

    let outcome = daemon
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown)
        .await?;

    tracing::info!(
        lines_read = outcome.stats.lines_read,
        records_written = outcome.stats.records_written,
        "tracefold-daemon shut down"
    );
    Ok(())
}
