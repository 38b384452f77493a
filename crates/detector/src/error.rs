//! 트레이스 탐지 에러 타입
//!
//! [`DetectorError`]는 규칙 카탈로그, 설정 검증, 출력 채널에서 발생하는 에러를 표현합니다.
//! `From<DetectorError> for TracefoldError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use tracefold_core::error::{ConfigError, PipelineError, TracefoldError};

/// 트레이스 탐지 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// 지원하지 않는 언어 이름
    #[error("unknown language: {0}")]
    UnknownLanguage(String),

    /// 규칙 카탈로그 컴파일 실패
    #[error("rule catalog error: {0}")]
    Catalog(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 출력 채널 에러
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<DetectorError> for TracefoldError {
    fn from(err: DetectorError) -> Self {
        match err {
            DetectorError::UnknownLanguage(name) => ConfigError::InvalidValue {
                field: "detector.languages".to_owned(),
                reason: format!("unknown language: {name}"),
            }
            .into(),
            DetectorError::Config { field, reason } => {
                ConfigError::InvalidValue { field, reason }.into()
            }
            DetectorError::Catalog(reason) => PipelineError::InitFailed(reason).into(),
            DetectorError::Channel(reason) => PipelineError::ChannelSend(reason).into(),
        }
    }
}
