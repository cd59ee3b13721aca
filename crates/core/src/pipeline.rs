//! 파이프라인 trait -- 외부 협력자 경계와 생명주기 정의
//!
//! 엔진은 로그/알림을 직접 저장하지 않습니다. 저장소 협력자가
//! [`LogSink`]와 [`AlertSink`]를 구현하여 주입하며, 각 호출은 성공/실패를 반환합니다.
//!
//! # 생명주기
//! ```text
//! Initialized → start() → Running → stop() → Stopped
//! ```

use std::fmt;
use std::future::Future;

use crate::error::{FirewallxError, PersistenceError};
use crate::types::{Alert, LogRecord, RejectedPacket};

/// 로그 저장 협력자
///
/// 평가된 패킷마다 [`LogRecord`]를, 거부된 패킷마다 [`RejectedPacket`]을 받습니다.
pub trait LogSink: Send + Sync + 'static {
    /// 로그 레코드를 저장합니다.
    fn persist_log(
        &self,
        record: &LogRecord,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// 거부된 패킷 레코드를 저장합니다.
    fn persist_rejection(
        &self,
        record: &RejectedPacket,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// 알림 저장 협력자
pub trait AlertSink: Send + Sync + 'static {
    /// 알림을 저장합니다.
    fn persist_alert(
        &self,
        alert: &Alert,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// 장기 실행 컴포넌트의 생명주기 trait
pub trait Pipeline: Send + Sync {
    /// 컴포넌트를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), FirewallxError>> + Send;

    /// 컴포넌트를 정지합니다.
    ///
    /// 새 입력 수신을 중단하고 처리 중인 작업이 끝날 때까지 기다립니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), FirewallxError>> + Send;

    /// 현재 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// 컴포넌트 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하
    Degraded(String),
    /// 비정상
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
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
