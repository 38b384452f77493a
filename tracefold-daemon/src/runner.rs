//! Daemon assembly and the stdin -> detector -> stdout loop.
//!
//! The [`Daemon`] owns the accumulator manager and its output channel.
//! [`Daemon::run`] spawns a writer task draining the channel, feeds
//! every input line to the manager, and on EOF or shutdown stops the
//! manager so that buffered traces are flushed before the writer exits.
//!
//! # Shutdown Order
//!
//! 1. Stop reading input
//! 2. Stop the manager (cancel sweep, force-flush every stream)
//! 3. Drop the manager, closing the output channel
//! 4. Wait for the writer task to drain and flush

use std::borrow::Cow;
use std::future::Future;
use std::time::SystemTime;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tracefold_core::config::TracefoldConfig;
use tracefold_core::metrics as m;
use tracefold_core::pipeline::Pipeline;
use tracefold_core::types::OutputRecord;
use tracefold_detector::{AccumulatorConfig, AccumulatorManager, AccumulatorManagerBuilder};

use crate::io::{self, InputFormat};

/// Counters reported when a run completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Input lines read.
    pub lines_read: u64,
    /// Records written to the output.
    pub records_written: u64,
}

/// Result of [`Daemon::run`]: the output sink handed back plus counters.
#[derive(Debug)]
pub struct RunOutcome<W> {
    pub output: W,
    pub stats: RunStats,
}

/// Assembled daemon: one manager fed from a single input source.
pub struct Daemon {
    config: TracefoldConfig,
    format: InputFormat,
    manager: AccumulatorManager,
    output_rx: mpsc::Receiver<OutputRecord>,
}

impl Daemon {
    /// Validate the configuration and build the accumulator manager.
    pub fn build_from_config(config: TracefoldConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let accumulator_config = AccumulatorConfig::from_core(&config.detector);
        let (manager, output_rx) = AccumulatorManagerBuilder::new()
            .config(accumulator_config)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build accumulator manager: {}", e))?;
        let output_rx =
            output_rx.ok_or_else(|| anyhow::anyhow!("accumulator manager has no output channel"))?;

        let format = InputFormat::from_config(&config.detector.input_format);
        tracing::info!(
            source = %config.detector.source,
            input_format = format.as_str(),
            languages = ?config.detector.languages,
            "daemon initialized"
        );

        Ok(Self {
            config,
            format,
            manager,
            output_rx,
        })
    }

    /// Loaded configuration.
    pub fn config(&self) -> &TracefoldConfig {
        &self.config
    }

    /// Process `input` until EOF or until `shutdown` resolves.
    ///
    /// Returns the output sink once every buffered trace has been written.
    pub async fn run<R, W, S>(self, input: R, output: W, shutdown: S) -> Result<RunOutcome<W>>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        let Self {
            config,
            format,
            mut manager,
            output_rx,
        } = self;
        let source = config.detector.source;

        let writer = spawn_writer(output_rx, output);
        manager
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start accumulator manager: {}", e))?;

        let read_result = read_loop(&manager, &source, format, input, shutdown).await;

        // Flush buffered traces however reading ended.
        let stop_result = manager.stop().await;
        drop(manager);

        let (output, records_written) = writer
            .await
            .map_err(|e| anyhow::anyhow!("output writer task failed: {}", e))??;

        let lines_read = read_result?;
        stop_result.map_err(|e| anyhow::anyhow!("failed to stop accumulator manager: {}", e))?;

        let stats = RunStats {
            lines_read,
            records_written,
        };
        tracing::info!(
            lines_read = stats.lines_read,
            records_written = stats.records_written,
            "input processing finished"
        );
        Ok(RunOutcome { output, stats })
    }
}

async fn read_loop<R, S>(
    manager: &AccumulatorManager,
    source: &str,
    format: InputFormat,
    mut input: R,
    shutdown: S,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut buf = Vec::new();
    let mut lines_read = 0;

    loop {
        buf.clear();
        let read = tokio::select! {
            result = input.read_until(b'\n', &mut buf) => result?,
            () = &mut shutdown => {
                tracing::info!("shutdown requested, stopping input");
                break;
            }
        };
        if read == 0 {
            tracing::debug!("input reached eof");
            break;
        }

        lines_read += 1;
        let line = decode_line(&buf);
        let record = io::parse_line(&line, format);
        manager
            .process(source, SystemTime::now(), record)
            .await
            .map_err(|e| anyhow::anyhow!("failed to process record: {}", e))?;
    }

    Ok(lines_read)
}

/// Invalid UTF-8 is replaced with U+FFFD so one bad byte never stops the input.
fn decode_line(buf: &[u8]) -> Cow<'_, str> {
    let line = String::from_utf8_lossy(buf);
    if let Cow::Owned(_) = line {
        tracing::debug!(bytes = buf.len(), "input line is not valid utf-8, replacing invalid bytes");
        metrics::counter!(m::DAEMON_INPUT_DECODE_ERRORS_TOTAL).increment(1);
    }
    line
}

fn spawn_writer<W>(
    mut output_rx: mpsc::Receiver<OutputRecord>,
    mut output: W,
) -> JoinHandle<Result<(W, u64)>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut written: u64 = 0;
        while let Some(record) = output_rx.recv().await {
            output.write_all(io::render(&record).as_bytes()).await?;
            written += 1;
            if output_rx.is_empty() {
                output.flush().await?;
            }
        }
        output.flush().await?;
        tracing::debug!(records = written, "output writer finished");
        Ok::<_, anyhow::Error>((output, written))
    })
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl_c")
}
