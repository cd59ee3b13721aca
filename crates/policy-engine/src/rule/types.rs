//! 방화벽 규칙 데이터 타입
//!
//! 관리 인터페이스(외부 협력자)나 규칙 파일에서 전달되는 규칙 정의입니다.
//! 패턴 필드는 문자열로 보관되며, 정책 테이블 갱신 시점에 컴파일됩니다.

use serde::{Deserialize, Deserializer, Serialize};

use firewallx_core::error::RuleValidationError;
use firewallx_core::types::Action;

/// 규칙 ID 최대 길이
const MAX_RULE_ID_LEN: usize = 256;

/// 규칙 이름 최대 길이
const MAX_RULE_NAME_LEN: usize = 256;

/// 기본 우선순위
pub const DEFAULT_PRIORITY: i32 = 100;

/// 방화벽 규칙
///
/// # TOML 스키마
/// ```toml
/// [[rules]]
/// id = "block-admin-host"
/// name = "Block admin host"
/// action = "block"
/// source = "any"
/// destination = "10.0.0.5"
/// port = "22, 3389"
/// protocol = "tcp"
/// priority = 10
/// enabled = true
/// description = "Admin host is reachable only through the bastion"
/// ```
///
/// 생략된 패턴 필드는 `any`, 우선순위는 100, 활성화 여부는 `true`입니다.
/// 관리 인터페이스의 필드 이름(`rule_type`, `source_ip`, `destination_ip`,
/// `is_enabled`)도 받아들입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    /// 규칙 고유 ID (테넌트 내에서 유일해야 함)
    pub id: String,
    /// 규칙 이름
    #[serde(default)]
    pub name: String,
    /// 매칭 시 적용할 동작
    #[serde(alias = "rule_type")]
    pub action: Action,
    /// 출발지 주소 패턴
    #[serde(default = "wildcard", alias = "source_ip")]
    pub source: String,
    /// 목적지 주소 패턴
    #[serde(default = "wildcard", alias = "destination_ip")]
    pub destination: String,
    /// 포트 패턴 (숫자로 적어도 됨)
    #[serde(default = "wildcard", deserialize_with = "port_from_string_or_number")]
    pub port: String,
    /// 프로토콜 (`tcp`, `udp`, `icmp`, `any`)
    #[serde(default = "wildcard")]
    pub protocol: String,
    /// 우선순위 (낮을수록 먼저 평가)
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// 활성화 여부
    #[serde(default = "default_enabled", alias = "is_enabled")]
    pub enabled: bool,
    /// 설명
    #[serde(default)]
    pub description: String,
}

fn wildcard() -> String {
    "any".to_owned()
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_enabled() -> bool {
    true
}

fn port_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortField {
        Number(i64),
        Text(String),
    }

    Ok(match PortField::deserialize(deserializer)? {
        PortField::Number(n) => n.to_string(),
        PortField::Text(s) => s,
    })
}

impl FirewallRule {
    /// 모든 패턴이 `any`인 규칙을 생성합니다.
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            action,
            source: wildcard(),
            destination: wildcard(),
            port: wildcard(),
            protocol: wildcard(),
            priority: DEFAULT_PRIORITY,
            enabled: true,
            description: String::new(),
        }
    }

    /// 이름을 설정합니다.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 출발지 패턴을 설정합니다.
    pub fn with_source(mut self, pattern: impl Into<String>) -> Self {
        self.source = pattern.into();
        self
    }

    /// 목적지 패턴을 설정합니다.
    pub fn with_destination(mut self, pattern: impl Into<String>) -> Self {
        self.destination = pattern.into();
        self
    }

    /// 포트 패턴을 설정합니다.
    pub fn with_port(mut self, pattern: impl Into<String>) -> Self {
        self.port = pattern.into();
        self
    }

    /// 프로토콜을 설정합니다.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// 우선순위를 설정합니다.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// 활성화 여부를 설정합니다.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 설명을 설정합니다.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 패턴 외 메타데이터(ID, 이름)의 유효성을 검증합니다.
    ///
    /// 패턴 필드는 [`CompiledRule::compile`](super::CompiledRule::compile)에서 검증합니다.
    pub fn validate(&self) -> Result<(), RuleValidationError> {
        if self.id.trim().is_empty() {
            return Err(RuleValidationError::new(
                "(empty)",
                "id",
                "rule id must not be empty",
            ));
        }

        if self.id.len() > MAX_RULE_ID_LEN {
            return Err(RuleValidationError::new(
                self.id.clone(),
                "id",
                format!("rule id must not exceed {MAX_RULE_ID_LEN} characters"),
            ));
        }

        if self.name.len() > MAX_RULE_NAME_LEN {
            return Err(RuleValidationError::new(
                self.id.clone(),
                "name",
                format!("rule name must not exceed {MAX_RULE_NAME_LEN} characters"),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rule_uses_wildcards_and_defaults() {
        let rule = FirewallRule::new("r-1", Action::Block);
        assert_eq!(rule.name, "r-1");
        assert_eq!(rule.source, "any");
        assert_eq!(rule.destination, "any");
        assert_eq!(rule.port, "any");
        assert_eq!(rule.protocol, "any");
        assert_eq!(rule.priority, DEFAULT_PRIORITY);
        assert!(rule.enabled);
    }

    #[test]
    fn builder_methods_set_fields() {
        let rule = FirewallRule::new("r-2", Action::Allow)
            .with_name("web")
            .with_destination("10.0.0.0/24")
            .with_port("80, 443")
            .with_protocol("tcp")
            .with_priority(5)
            .with_enabled(false)
            .with_description("public web tier");
        assert_eq!(rule.name, "web");
        assert_eq!(rule.destination, "10.0.0.0/24");
        assert_eq!(rule.port, "80, 443");
        assert_eq!(rule.priority, 5);
        assert!(!rule.enabled);
    }

    #[test]
    fn valid_rule_passes_validation() {
        FirewallRule::new("ok", Action::Allow).validate().unwrap();
    }

    #[test]
    fn empty_id_fails_validation() {
        let err = FirewallRule::new("  ", Action::Allow).validate().unwrap_err();
        assert_eq!(err.field, "id");
    }

    #[test]
    fn overlong_id_fails_validation() {
        let err = FirewallRule::new("x".repeat(300), Action::Allow)
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "id");
    }

    #[test]
    fn deserialize_applies_defaults() {
        let rule: FirewallRule = serde_json::from_str(r#"{"id":"r","action":"block"}"#).unwrap();
        assert_eq!(rule.action, Action::Block);
        assert_eq!(rule.port, "any");
        assert_eq!(rule.priority, 100);
        assert!(rule.enabled);
    }

    #[test]
    fn deserialize_accepts_numeric_port() {
        let rule: FirewallRule =
            serde_json::from_str(r#"{"id":"r","action":"allow","port":443}"#).unwrap();
        assert_eq!(rule.port, "443");
    }

    #[test]
    fn deserialize_accepts_management_field_names() {
        let rule: FirewallRule = serde_json::from_str(
            r#"{"id":"r","name":"ssh","rule_type":"block","source_ip":"","destination_ip":"10.0.0.5","port":"22","protocol":"tcp","priority":10,"is_enabled":false}"#,
        )
        .unwrap();
        assert_eq!(rule.action, Action::Block);
        assert_eq!(rule.source, "");
        assert_eq!(rule.destination, "10.0.0.5");
        assert!(!rule.enabled);
    }

    #[test]
    fn deserialize_rejects_unknown_action() {
        let result: Result<FirewallRule, _> =
            serde_json::from_str(r#"{"id":"r","action":"blocked"}"#);
        assert!(result.is_err());
    }
}
