//! 정책 엔진 에러 타입
//!
//! [`EngineError`]는 엔진 구성(규칙 파일 로딩, 규칙/알림 조회, 설정)에서 발생하는 에러를 표현합니다.
//! 패킷 평가 경로의 에러는 core의 [`IngestionError`](firewallx_core::IngestionError),
//! [`RuleValidationError`](firewallx_core::RuleValidationError),
//! [`PersistenceError`](firewallx_core::PersistenceError)로 보고됩니다.
//!
//! `From<EngineError> for FirewallxError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use firewallx_core::error::{ConfigError, FirewallxError, PipelineError};

/// 정책 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 규칙 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 규칙을 찾을 수 없음
    #[error("rule not found: tenant '{tenant_id}', rule '{rule_id}'")]
    RuleNotFound {
        /// 테넌트 ID
        tenant_id: String,
        /// 규칙 ID
        rule_id: String,
    },

    /// 같은 ID의 규칙이 이미 존재
    #[error("duplicate rule id: tenant '{tenant_id}', rule '{rule_id}'")]
    DuplicateRule {
        /// 테넌트 ID
        tenant_id: String,
        /// 규칙 ID
        rule_id: String,
    },

    /// 알림을 찾을 수 없음
    #[error("alert not found: tenant '{tenant_id}', alert '{alert_id}'")]
    AlertNotFound {
        /// 테넌트 ID
        tenant_id: String,
        /// 알림 ID
        alert_id: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<EngineError> for FirewallxError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config { field, reason } => {
                FirewallxError::Config(ConfigError::InvalidValue { field, reason })
            }
            other => FirewallxError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
