//! 에러 타입 -- 도메인별 에러 정의
//!
//! 평가 경로의 에러는 서로 다른 방식으로 처리됩니다:
//! - [`RuleValidationError`]: 해당 규칙만 제외하고 나머지 규칙은 적용
//! - [`IngestionError`]: 패킷을 거부하고 거부 레코드를 남김
//! - [`PersistenceError`]: 결정과 함께 호출자에게 보고 (재시도 없음)

use serde::{Deserialize, Serialize};

/// FirewallX 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum FirewallxError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 규칙 검증 에러
    #[error("rule validation error: {0}")]
    RuleValidation(#[from] RuleValidationError),

    /// 패킷 수집 에러
    #[error("ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    /// 영속화 에러
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,
}

/// 규칙 검증 에러
///
/// 잘못된 규칙은 정책 갱신 시점에 한 번만 보고되며,
/// 해당 규칙은 어떤 패킷에도 매칭되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("rule '{rule_id}' has invalid {field}: {reason}")]
pub struct RuleValidationError {
    /// 문제가 있는 규칙 ID
    pub rule_id: String,
    /// 문제가 있는 필드명 (source, destination, port, protocol 등)
    pub field: String,
    /// 사유
    pub reason: String,
}

impl RuleValidationError {
    /// 새 검증 에러를 생성합니다.
    pub fn new(
        rule_id: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 패킷 수집(검증) 에러
///
/// 필수 필드가 없거나 값이 잘못된 패킷 디스크립터는 평가되지 않고 거부됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum IngestionError {
    /// 필수 필드 누락
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    /// 유효하지 않은 필드 값
    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

impl IngestionError {
    /// 필드 누락 에러를 생성합니다.
    pub fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_owned(),
        }
    }

    /// 필드 값 에러를 생성합니다.
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}

/// 영속화 에러
///
/// 로그/알림 저장 협력자가 레코드를 받지 못했을 때 발생합니다.
/// 엔진은 재시도하지 않고 결정과 함께 호출자에게 보고합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PersistenceError {
    /// 로그 레코드 저장 실패
    #[error("failed to persist log record: {reason}")]
    Log { reason: String },

    /// 알림 저장 실패
    #[error("failed to persist alert: {reason}")]
    Alert { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_validation_error_display() {
        let err = RuleValidationError::new("r-1", "source", "invalid CIDR '10.0.0.0/33'");
        let msg = err.to_string();
        assert!(msg.contains("r-1"));
        assert!(msg.contains("source"));
        assert!(msg.contains("10.0.0.0/33"));
    }

    #[test]
    fn ingestion_error_display() {
        assert_eq!(
            IngestionError::missing("source_ip").to_string(),
            "missing required field 'source_ip'"
        );
        let err = IngestionError::invalid("protocol", "must not be 'any'");
        assert!(err.to_string().contains("protocol"));
    }

    #[test]
    fn errors_convert_into_top_level() {
        let err: FirewallxError = IngestionError::missing("port").into();
        assert!(matches!(err, FirewallxError::Ingestion(_)));

        let err: FirewallxError = PersistenceError::Log {
            reason: "closed".to_owned(),
        }
        .into();
        assert!(err.to_string().contains("closed"));

        let err: FirewallxError = PipelineError::AlreadyRunning.into();
        assert!(matches!(
            err,
            FirewallxError::Pipeline(PipelineError::AlreadyRunning)
        ));
    }

    #[test]
    fn rule_validation_error_serializes() {
        let err = RuleValidationError::new("r-2", "port", "inverted range");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"field\":\"port\""));
    }
}
