//! 파이프라인 trait -- 모듈 생명주기 확장 포인트 정의

use std::fmt;
use std::future::Future;

use crate::error::TracefoldError;

/// 모듈 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 정상 동작
    Healthy,
    /// 동작은 하지만 일부 기능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 저하 상태인지 확인합니다.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 장기 실행 모듈의 생명주기 trait
///
/// 백그라운드 태스크를 가진 모듈은 이 trait을 구현하여
/// `tracefold-daemon`에서 동일한 방식으로 시작/정지/점검됩니다.
pub trait Pipeline: Send {
    /// 모듈을 시작합니다. 이미 실행 중이면 에러를 반환합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), TracefoldError>> + Send;

    /// 모듈을 정지합니다. 실행 중이 아니면 에러를 반환합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), TracefoldError>> + Send;

    /// 현재 헬스 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
