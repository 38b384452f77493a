//! 설정 관리 -- tracefold.toml 파싱 및 런타임 설정
//!
//! [`TracefoldConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TRACEFOLD_DETECTOR_MAX_LINES=500` 형식)
//! 3. 설정 파일 (`tracefold.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), tracefold_core::error::TracefoldError> {
//! use tracefold_core::config::TracefoldConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TracefoldConfig::load("tracefold.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TracefoldConfig::parse("[detector]\nlanguages = [\"java\"]")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TracefoldError};

/// 버퍼 최대 줄 수 상한
const MAX_LINES_LIMIT: usize = 1_000_000;
/// 플러시 타임아웃 상한 (1시간)
const MAX_FLUSH_TIMEOUT_MS: u64 = 3_600_000;
/// 출력 채널 용량 상한
const MAX_CHANNEL_CAPACITY: usize = 1_000_000;

/// tracefold 통합 설정
///
/// `tracefold.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TracefoldConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 트레이스 탐지 설정
    #[serde(default)]
    pub detector: DetectorConfig,
    /// 메트릭 노출 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl TracefoldConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TracefoldError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TracefoldError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TracefoldError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TracefoldError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TracefoldError> {
        toml::from_str(toml_str).map_err(|e| {
            TracefoldError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TRACEFOLD_{SECTION}_{FIELD}`
    /// 예: `TRACEFOLD_DETECTOR_LANGUAGES=java,python`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TRACEFOLD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TRACEFOLD_GENERAL_LOG_FORMAT");

        // Detector
        override_string(&mut self.detector.source, "TRACEFOLD_DETECTOR_SOURCE");
        override_string(
            &mut self.detector.input_format,
            "TRACEFOLD_DETECTOR_INPUT_FORMAT",
        );
        override_string(
            &mut self.detector.message_field,
            "TRACEFOLD_DETECTOR_MESSAGE_FIELD",
        );
        override_csv(&mut self.detector.languages, "TRACEFOLD_DETECTOR_LANGUAGES");
        override_usize(&mut self.detector.max_lines, "TRACEFOLD_DETECTOR_MAX_LINES");
        override_usize(&mut self.detector.max_bytes, "TRACEFOLD_DETECTOR_MAX_BYTES");
        override_bool(
            &mut self.detector.force_line_breaks,
            "TRACEFOLD_DETECTOR_FORCE_LINE_BREAKS",
        );
        override_u64(
            &mut self.detector.flush_timeout_ms,
            "TRACEFOLD_DETECTOR_FLUSH_TIMEOUT_MS",
        );
        override_string(
            &mut self.detector.stream_field,
            "TRACEFOLD_DETECTOR_STREAM_FIELD",
        );
        override_usize(
            &mut self.detector.output_channel_capacity,
            "TRACEFOLD_DETECTOR_OUTPUT_CHANNEL_CAPACITY",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "TRACEFOLD_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "TRACEFOLD_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "TRACEFOLD_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TracefoldError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.detector.validate()?;

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(invalid("metrics.port", "must not be 0 when enabled"));
            }
            if !self.metrics.endpoint.starts_with('/') {
                return Err(invalid("metrics.endpoint", "must start with '/'"));
            }
        }

        Ok(())
    }
}

// Default는 derive 매크로로 자동 생성 (각 필드가 Default를 구현하므로)

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 트레이스 탐지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// 입력 소스 이름 (스트림 키의 일부)
    pub source: String,
    /// 입력 형식 (text, json)
    pub input_format: String,
    /// 메시지 필드 이름 (빈 문자열이면 첫 레코드에서 자동 감지)
    pub message_field: String,
    /// 탐지 대상 언어 (비어 있으면 전체)
    pub languages: Vec<String>,
    /// 한 그룹의 최대 줄 수 (0 = 무제한)
    pub max_lines: usize,
    /// 한 그룹의 최대 바이트 수 (0 = 무제한)
    pub max_bytes: usize,
    /// 줄바꿈이 없는 조각 뒤에 줄바꿈을 삽입할지 여부
    pub force_line_breaks: bool,
    /// 미완결 트레이스 강제 플러시 타임아웃 (밀리초, 0 = 비활성)
    pub flush_timeout_ms: u64,
    /// 스트림 구분 필드 이름 (빈 문자열이면 구분 안 함)
    pub stream_field: String,
    /// 출력 채널 용량
    pub output_channel_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            source: "stdin".to_owned(),
            input_format: "text".to_owned(),
            message_field: String::new(),
            languages: Vec::new(),
            max_lines: 1000,
            max_bytes: 0,
            force_line_breaks: false,
            flush_timeout_ms: 0,
            stream_field: String::new(),
            output_channel_capacity: 1024,
        }
    }
}

impl DetectorConfig {
    /// 구조화(JSON) 입력인지 확인합니다.
    pub fn is_structured_input(&self) -> bool {
        self.input_format == "json"
    }

    /// 탐지 설정의 유효성을 검증합니다.
    ///
    /// 언어 이름은 룰 카탈로그를 가진 detector 크레이트에서 추가로 검증합니다.
    pub fn validate(&self) -> Result<(), TracefoldError> {
        let valid_inputs = ["text", "json"];
        if !valid_inputs.contains(&self.input_format.as_str()) {
            return Err(invalid(
                "detector.input_format",
                format!("must be one of: {}", valid_inputs.join(", ")),
            ));
        }

        if !self.is_structured_input() {
            if !self.message_field.is_empty() {
                return Err(invalid(
                    "detector.message_field",
                    "requires input_format = \"json\"",
                ));
            }
            if !self.stream_field.is_empty() {
                return Err(invalid(
                    "detector.stream_field",
                    "requires input_format = \"json\"",
                ));
            }
        }

        if self.languages.iter().any(|lang| lang.trim().is_empty()) {
            return Err(invalid(
                "detector.languages",
                "language names must not be empty",
            ));
        }

        if self.max_lines > MAX_LINES_LIMIT {
            return Err(invalid(
                "detector.max_lines",
                format!("must be 0-{MAX_LINES_LIMIT}"),
            ));
        }

        if self.flush_timeout_ms > MAX_FLUSH_TIMEOUT_MS {
            return Err(invalid(
                "detector.flush_timeout_ms",
                format!("must be 0-{MAX_FLUSH_TIMEOUT_MS}"),
            ));
        }

        if self.output_channel_capacity == 0 || self.output_channel_capacity > MAX_CHANNEL_CAPACITY
        {
            return Err(invalid(
                "detector.output_channel_capacity",
                format!("must be 1-{MAX_CHANNEL_CAPACITY}"),
            ));
        }

        Ok(())
    }
}

/// 메트릭 노출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9108,
            endpoint: "/metrics".to_owned(),
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> TracefoldError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = TracefoldConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.detector.input_format, "text");
        assert!(config.detector.languages.is_empty());
        assert_eq!(config.detector.max_lines, 1000);
        assert_eq!(config.detector.max_bytes, 0);
        assert_eq!(config.detector.flush_timeout_ms, 0);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        let config = TracefoldConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = TracefoldConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.detector.output_channel_capacity, 1024);
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[detector]
input_format = "json"
languages = ["java", "python"]
flush_timeout_ms = 5000
"#;
        let config = TracefoldConfig::parse(toml).unwrap();
        assert!(config.detector.is_structured_input());
        assert_eq!(config.detector.languages, vec!["java", "python"]);
        assert_eq!(config.detector.flush_timeout_ms, 5000);
        // 나머지는 기본값 유지
        assert_eq!(config.detector.max_lines, 1000);
        assert_eq!(config.general.log_format, "json");
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "pretty"

[detector]
source = "app"
input_format = "json"
message_field = "log"
languages = ["go"]
max_lines = 50
max_bytes = 65536
force_line_breaks = true
flush_timeout_ms = 2000
stream_field = "stream"
output_channel_capacity = 64

[metrics]
enabled = true
listen_addr = "0.0.0.0"
port = 9200
endpoint = "/metrics"
"#;
        let config = TracefoldConfig::parse(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.detector.source, "app");
        assert_eq!(config.detector.message_field, "log");
        assert_eq!(config.detector.max_bytes, 65536);
        assert!(config.detector.force_line_breaks);
        assert_eq!(config.detector.stream_field, "stream");
        assert_eq!(config.metrics.port, 9200);
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let err = TracefoldConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            TracefoldError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = TracefoldConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_unknown_input_format() {
        let mut config = TracefoldConfig::default();
        config.detector.input_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("input_format"));
    }

    #[test]
    fn validate_rejects_message_field_for_text_input() {
        let mut config = TracefoldConfig::default();
        config.detector.message_field = "message".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("message_field"));
    }

    #[test]
    fn validate_rejects_blank_language() {
        let mut config = TracefoldConfig::default();
        config.detector.languages = vec!["java".to_owned(), " ".to_owned()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_channel_capacity() {
        let mut config = TracefoldConfig::default();
        config.detector.output_channel_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("output_channel_capacity"));
    }

    #[test]
    fn validate_rejects_oversized_timeout() {
        let mut config = TracefoldConfig::default();
        config.detector.flush_timeout_ms = MAX_FLUSH_TIMEOUT_MS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_checks_metrics_only_when_enabled() {
        let mut config = TracefoldConfig::default();
        config.metrics.port = 0;
        config.validate().unwrap();
        config.metrics.enabled = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("metrics.port"));
    }

    #[test]
    #[serial]
    fn env_override_detector_fields() {
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe {
            std::env::set_var("TRACEFOLD_DETECTOR_MAX_LINES", "25");
            std::env::set_var("TRACEFOLD_DETECTOR_LANGUAGES", "java, ruby");
            std::env::set_var("TRACEFOLD_DETECTOR_FORCE_LINE_BREAKS", "true");
        }
        let mut config = TracefoldConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("TRACEFOLD_DETECTOR_MAX_LINES");
            std::env::remove_var("TRACEFOLD_DETECTOR_LANGUAGES");
            std::env::remove_var("TRACEFOLD_DETECTOR_FORCE_LINE_BREAKS");
        }
        assert_eq!(config.detector.max_lines, 25);
        assert_eq!(config.detector.languages, vec!["java", "ruby"]);
        assert!(config.detector.force_line_breaks);
    }

    #[test]
    #[serial]
    fn env_override_invalid_value_keeps_original() {
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("TRACEFOLD_TEST_BAD_USIZE", "many") };
        let mut val = 7usize;
        override_usize(&mut val, "TRACEFOLD_TEST_BAD_USIZE");
        unsafe { std::env::remove_var("TRACEFOLD_TEST_BAD_USIZE") };
        assert_eq!(val, 7);
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TRACEFOLD_TEST_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let mut config = TracefoldConfig::default();
        config.detector.languages = vec!["dart".to_owned()];
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = TracefoldConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.detector.languages, config.detector.languages);
        assert_eq!(parsed.metrics.endpoint, config.metrics.endpoint);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = TracefoldConfig::from_file("/nonexistent/path/tracefold.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TracefoldError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
