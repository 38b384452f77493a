//! 누적기 설정
//!
//! [`AccumulatorConfig`]는 core의 [`DetectorConfig`](tracefold_core::config::DetectorConfig)에서
//! 파생되며, 라이브러리 직접 사용 시에는 [`AccumulatorConfigBuilder`]로 구성합니다.
//!
//! # 사용 예시
//! ```ignore
//! use tracefold_core::config::TracefoldConfig;
//! use tracefold_detector::config::AccumulatorConfig;
//!
//! let core_config = TracefoldConfig::default();
//! let config = AccumulatorConfig::from_core(&core_config.detector);
//! config.validate()?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::accumulator::{BufferOptions, MessageField};
use crate::error::DetectorError;
use crate::rule::Language;

/// 타임아웃 스윕 최소 주기
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

const MAX_LINES_LIMIT: usize = 1_000_000;
const MAX_FLUSH_TIMEOUT: Duration = Duration::from_secs(3600);
const MAX_CHANNEL_CAPACITY: usize = 1_000_000;

/// 누적기 및 매니저 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorConfig {
    /// 메시지 필드 지정 방식
    pub message_field: MessageField,
    /// 탐지 대상 언어 이름 (비어 있으면 전체)
    pub languages: Vec<String>,
    /// 최대 버퍼 줄 수 (0 = 무제한)
    pub max_lines: usize,
    /// 최대 버퍼 바이트 수 (0 = 무제한)
    pub max_bytes: usize,
    /// 개행 없는 조각 앞에 개행 삽입
    pub force_line_breaks: bool,
    /// 미완결 트레이스 강제 플러시 타임아웃 (`None`이면 스윕 없음)
    pub flush_timeout: Option<Duration>,
    /// 스트림 구분 필드 이름
    pub stream_field: Option<String>,
    /// 출력 채널 용량 (외부 채널 미사용 시)
    pub output_channel_capacity: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            message_field: MessageField::None,
            languages: Vec::new(),
            max_lines: 0,
            max_bytes: 0,
            force_line_breaks: false,
            flush_timeout: None,
            stream_field: None,
            output_channel_capacity: 1024,
        }
    }
}

impl AccumulatorConfig {
    /// 빌더를 반환합니다.
    pub fn builder() -> AccumulatorConfigBuilder {
        AccumulatorConfigBuilder::new()
    }

    /// core의 `DetectorConfig`에서 설정을 생성합니다.
    pub fn from_core(core: &tracefold_core::config::DetectorConfig) -> Self {
        let structured = core.is_structured_input();
        let stream_field = core.stream_field.trim();
        Self {
            message_field: MessageField::from_config(structured, &core.message_field),
            languages: core.languages.clone(),
            max_lines: core.max_lines,
            max_bytes: core.max_bytes,
            force_line_breaks: core.force_line_breaks,
            flush_timeout: (core.flush_timeout_ms > 0)
                .then(|| Duration::from_millis(core.flush_timeout_ms)),
            stream_field: (structured && !stream_field.is_empty())
                .then(|| stream_field.to_owned()),
            output_channel_capacity: core.output_channel_capacity,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DetectorError> {
        self.parsed_languages()?;

        if let MessageField::Named(name) = &self.message_field {
            if name.trim().is_empty() {
                return Err(config_error("message_field", "must not be blank"));
            }
        }

        if self.max_lines > MAX_LINES_LIMIT {
            return Err(config_error(
                "max_lines",
                format!("must be at most {MAX_LINES_LIMIT}"),
            ));
        }

        if let Some(timeout) = self.flush_timeout {
            if timeout.is_zero() || timeout > MAX_FLUSH_TIMEOUT {
                return Err(config_error(
                    "flush_timeout",
                    format!("must be between 1ms and {}s", MAX_FLUSH_TIMEOUT.as_secs()),
                ));
            }
        }

        if let Some(field) = &self.stream_field {
            if field.trim().is_empty() {
                return Err(config_error("stream_field", "must not be blank"));
            }
            if self.message_field == MessageField::None {
                return Err(config_error(
                    "stream_field",
                    "requires structured records (message_field must not be none)",
                ));
            }
        }

        if self.output_channel_capacity == 0 || self.output_channel_capacity > MAX_CHANNEL_CAPACITY
        {
            return Err(config_error(
                "output_channel_capacity",
                format!("must be 1-{MAX_CHANNEL_CAPACITY}"),
            ));
        }

        Ok(())
    }

    /// 언어 이름을 파싱합니다. 알 수 없는 이름이 있으면 에러입니다.
    pub fn parsed_languages(&self) -> Result<Vec<Language>, DetectorError> {
        self.languages
            .iter()
            .map(|name| name.parse::<Language>())
            .collect()
    }

    /// 누적기 버퍼 옵션
    pub fn buffer_options(&self) -> BufferOptions {
        BufferOptions {
            max_lines: self.max_lines,
            max_bytes: self.max_bytes,
            force_line_breaks: self.force_line_breaks,
        }
    }

    /// 타임아웃 스윕 주기: `max(timeout * 0.1, 1s)`
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.flush_timeout
            .map(|timeout| (timeout / 10).max(MIN_SWEEP_INTERVAL))
    }
}

fn config_error(field: &str, reason: impl Into<String>) -> DetectorError {
    DetectorError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 누적기 설정 빌더
#[derive(Debug, Default)]
pub struct AccumulatorConfigBuilder {
    config: AccumulatorConfig,
}

impl AccumulatorConfigBuilder {
    /// 기본값으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_field(mut self, field: MessageField) -> Self {
        self.config.message_field = field;
        self
    }

    pub fn languages(mut self, languages: Vec<String>) -> Self {
        self.config.languages = languages;
        self
    }

    pub fn max_lines(mut self, max_lines: usize) -> Self {
        self.config.max_lines = max_lines;
        self
    }

    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.config.max_bytes = max_bytes;
        self
    }

    pub fn force_line_breaks(mut self, enabled: bool) -> Self {
        self.config.force_line_breaks = enabled;
        self
    }

    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.flush_timeout = Some(timeout);
        self
    }

    pub fn stream_field(mut self, field: impl Into<String>) -> Self {
        self.config.stream_field = Some(field.into());
        self
    }

    pub fn output_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.output_channel_capacity = capacity;
        self
    }

    /// 검증 후 설정을 반환합니다.
    pub fn build(self) -> Result<AccumulatorConfig, DetectorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
