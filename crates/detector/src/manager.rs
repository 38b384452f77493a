//! 누적기 매니저 -- 스트림별 누적기 관리와 타임아웃 스윕
//!
//! [`AccumulatorManager`]는 `(source, stream)` 키마다 [`TraceAccumulator`]를 지연 생성하고,
//! 내보낸 레코드를 bounded `mpsc` 채널로 전달합니다.
//! core의 [`Pipeline`] trait을 구현하여 `tracefold-daemon`에서 같은 생명주기로 관리됩니다.
//!
//! # 동시성
//! 모든 누적기는 하나의 `tokio::sync::Mutex` 뒤에 있습니다. 레코드 처리와 스윕의
//! 강제 플러시는 같은 락을 잡고, 채널 전송도 락을 쥔 채 수행하므로
//! 스트림별 출력 순서가 유지되고 누적기당 플러시는 한 번에 하나만 진행됩니다.
//!
//! ```text
//! process() --+
//!             +--> Mutex<HashMap<StreamKey, TraceAccumulator>> --> mpsc::Sender<OutputRecord>
//! sweep task -+        (timeout 설정 시에만 실행)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use tracefold_core::error::{PipelineError, TracefoldError};
use tracefold_core::metrics as m;
use tracefold_core::pipeline::{HealthStatus, Pipeline};
use tracefold_core::types::{OutputRecord, Record};

use crate::accumulator::{FlushReason, TraceAccumulator};
use crate::config::AccumulatorConfig;
use crate::detector::TraceDetector;
use crate::error::DetectorError;
use crate::rule::RuleSet;

/// 스트림 식별자
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    /// 호스트가 지정한 입력 출처
    pub source: String,
    /// 스트림 필드 값 (없으면 빈 문자열)
    pub stream: String,
}

impl StreamKey {
    pub fn new(source: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            stream: stream.into(),
        }
    }
}

/// 매니저 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManagerState {
    Initialized,
    Running,
    Stopped,
}

/// 처리 경로와 스윕 태스크가 공유하는 상태
struct Shared {
    config: AccumulatorConfig,
    rules: Arc<RuleSet>,
    accumulators: Mutex<HashMap<StreamKey, TraceAccumulator>>,
    output_tx: mpsc::Sender<OutputRecord>,
}

impl Shared {
    fn stream_key(&self, source: &str, record: &Record) -> StreamKey {
        let stream = match (&self.config.stream_field, record) {
            (Some(field), Record::Structured(fields)) => match fields.get(field) {
                Some(Value::String(value)) => value.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            },
            _ => String::new(),
        };
        StreamKey::new(source, stream)
    }

    async fn process(
        &self,
        source: &str,
        timestamp: SystemTime,
        record: Record,
    ) -> Result<(), DetectorError> {
        let key = self.stream_key(source, &record);
        let mut emitted = Vec::new();

        let mut accumulators = self.accumulators.lock().await;
        let mut created = false;
        let accumulator = accumulators.entry(key).or_insert_with_key(|key| {
            created = true;
            tracing::debug!(source = %key.source, stream = %key.stream, "created accumulator");
            TraceAccumulator::from_config(
                &self.config,
                TraceDetector::with_rules(Arc::clone(&self.rules)),
            )
        });
        accumulator.push(timestamp, record, &mut emitted);
        if created {
            metrics::gauge!(m::DETECTOR_ACTIVE_STREAMS).set(accumulators.len() as f64);
        }

        self.send_all(emitted).await
    }

    async fn flush_stale(&self, now: Instant, timeout: Duration) -> Result<usize, DetectorError> {
        let mut emitted = Vec::new();
        let mut flushed = 0;

        let mut accumulators = self.accumulators.lock().await;
        for (key, accumulator) in accumulators.iter_mut() {
            if accumulator.is_stale(now, timeout) {
                tracing::debug!(
                    source = %key.source,
                    stream = %key.stream,
                    lines = accumulator.buffered_lines(),
                    "flushing stale trace"
                );
                accumulator.force_flush(FlushReason::Timeout, &mut emitted);
                flushed += 1;
            }
        }

        self.send_all(emitted).await?;
        Ok(flushed)
    }

    async fn force_flush_all(&self) -> Result<(), DetectorError> {
        let mut emitted = Vec::new();
        let mut accumulators = self.accumulators.lock().await;
        for accumulator in accumulators.values_mut() {
            accumulator.force_flush(FlushReason::Shutdown, &mut emitted);
        }
        if !emitted.is_empty() {
            tracing::info!(records = emitted.len(), "flushed buffered traces");
        }
        self.send_all(emitted).await
    }

    async fn send_all(&self, records: Vec<OutputRecord>) -> Result<(), DetectorError> {
        for record in records {
            self.output_tx
                .send(record)
                .await
                .map_err(|e| DetectorError::Channel(e.to_string()))?;
        }
        Ok(())
    }
}

async fn run_sweep(
    shared: Arc<Shared>,
    timeout: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("timeout sweep cancelled");
                break;
            }
            _ = ticker.tick() => {
                match shared.flush_stale(Instant::now(), timeout).await {
                    Ok(0) => {}
                    Ok(flushed) => tracing::debug!(flushed, "timeout sweep flushed streams"),
                    Err(e) => {
                        tracing::error!(error = %e, "timeout sweep failed, stopping sweep");
                        break;
                    }
                }
            }
        }
    }
}

/// 스트림별 누적기 매니저
///
/// # 사용 예시
/// ```ignore
/// use tracefold_detector::{AccumulatorConfig, AccumulatorManagerBuilder};
///
/// let (mut manager, rx) = AccumulatorManagerBuilder::new()
///     .config(config)
///     .build()?;
///
/// manager.start().await?;
/// manager.process("stdin", SystemTime::now(), record).await?;
/// ```
pub struct AccumulatorManager {
    shared: Arc<Shared>,
    state: ManagerState,
    cancel: CancellationToken,
    sweep_task: Option<JoinHandle<()>>,
}

impl AccumulatorManager {
    /// 레코드를 해당 스트림의 누적기로 전달합니다.
    ///
    /// 내보낸 레코드는 출력 채널로 전송되며, 수신측이 닫혔으면
    /// [`DetectorError::Channel`]을 반환합니다.
    pub async fn process(
        &self,
        source: &str,
        timestamp: SystemTime,
        record: Record,
    ) -> Result<(), DetectorError> {
        self.shared.process(source, timestamp, record).await
    }

    /// 스윕 한 번을 수행합니다. 플러시된 스트림 수를 반환합니다.
    ///
    /// 타임아웃이 설정되지 않았으면 아무것도 하지 않습니다.
    pub async fn flush_stale(&self, now: Instant) -> Result<usize, DetectorError> {
        match self.shared.config.flush_timeout {
            Some(timeout) => self.shared.flush_stale(now, timeout).await,
            None => Ok(0),
        }
    }

    /// 모든 누적기를 강제 플러시합니다.
    pub async fn force_flush_all(&self) -> Result<(), DetectorError> {
        self.shared.force_flush_all().await
    }

    /// 관리 중인 스트림 수
    pub async fn stream_count(&self) -> usize {
        self.shared.accumulators.lock().await.len()
    }

    /// 스트림 키 목록 (정렬됨)
    pub async fn stream_keys(&self) -> Vec<StreamKey> {
        let mut keys: Vec<_> = self.shared.accumulators.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// 설정
    pub fn config(&self) -> &AccumulatorConfig {
        &self.shared.config
    }

    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            ManagerState::Initialized => "initialized",
            ManagerState::Running => "running",
            ManagerState::Stopped => "stopped",
        }
    }
}

impl Pipeline for AccumulatorManager {
    async fn start(&mut self) -> Result<(), TracefoldError> {
        if self.state == ManagerState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        tracing::info!("starting accumulator manager");

        self.cancel = CancellationToken::new();
        let config = &self.shared.config;
        if let (Some(timeout), Some(interval)) = (config.flush_timeout, config.sweep_interval()) {
            tracing::info!(
                timeout_ms = timeout.as_millis() as u64,
                interval_ms = interval.as_millis() as u64,
                "spawning timeout sweep"
            );
            self.sweep_task = Some(tokio::spawn(run_sweep(
                Arc::clone(&self.shared),
                timeout,
                interval,
                self.cancel.clone(),
            )));
        }

        self.state = ManagerState::Running;
        tracing::info!("accumulator manager started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TracefoldError> {
        if self.state != ManagerState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping accumulator manager");

        // 1. 스윕 중단
        self.cancel.cancel();
        if let Some(task) = self.sweep_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "timeout sweep task ended abnormally");
            }
        }

        // 2. 남은 버퍼 플러시
        self.state = ManagerState::Stopped;
        self.shared.force_flush_all().await?;

        tracing::info!("accumulator manager stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ManagerState::Running => {
                if self.shared.output_tx.is_closed() {
                    HealthStatus::Degraded("output channel closed".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            ManagerState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ManagerState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

impl Drop for AccumulatorManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// 누적기 매니저 빌더
///
/// 매니저를 구성하고 필요한 출력 채널을 생성합니다.
pub struct AccumulatorManagerBuilder {
    config: AccumulatorConfig,
    output_tx: Option<mpsc::Sender<OutputRecord>>,
}

impl AccumulatorManagerBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: AccumulatorConfig::default(),
            output_tx: None,
        }
    }

    /// 매니저 설정을 지정합니다.
    pub fn config(mut self, config: AccumulatorConfig) -> Self {
        self.config = config;
        self
    }

    /// 외부 출력 채널을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 `output_channel_capacity` 용량의 새 채널을 생성합니다.
    pub fn output_sender(mut self, tx: mpsc::Sender<OutputRecord>) -> Self {
        self.output_tx = Some(tx);
        self
    }

    /// 매니저를 빌드합니다.
    ///
    /// # Returns
    /// - `AccumulatorManager`: 매니저 인스턴스
    /// - `Option<mpsc::Receiver<OutputRecord>>`: 출력 수신 채널 (외부 채널 사용 시 `None`)
    pub fn build(
        self,
    ) -> Result<(AccumulatorManager, Option<mpsc::Receiver<OutputRecord>>), DetectorError> {
        self.config.validate()?;
        let rules = Arc::new(RuleSet::for_languages(&self.config.parsed_languages()?)?);

        let (output_tx, output_rx) = match self.output_tx {
            Some(tx) => (tx, None),
            None => {
                let (tx, rx) = mpsc::channel(self.config.output_channel_capacity);
                (tx, Some(rx))
            }
        };

        tracing::debug!(
            languages = ?rules.languages(),
            max_lines = self.config.max_lines,
            max_bytes = self.config.max_bytes,
            "built accumulator manager"
        );

        let shared = Arc::new(Shared {
            config: self.config,
            rules,
            accumulators: Mutex::new(HashMap::new()),
            output_tx,
        });

        Ok((
            AccumulatorManager {
                shared,
                state: ManagerState::Initialized,
                cancel: CancellationToken::new(),
                sweep_task: None,
            },
            output_rx,
        ))
    }
}

impl Default for AccumulatorManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
