//! 규칙 매칭 로직 -- 패턴 컴파일 및 패킷 매칭
//!
//! [`CompiledRule`]은 규칙의 문자열 패턴을 한 번만 파싱해 두고,
//! 평가 시에는 파싱 없이 네 가지 조건(출발지, 목적지, 포트, 프로토콜)만 확인합니다.

use firewallx_core::error::RuleValidationError;
use firewallx_core::types::{Action, Packet, Protocol};

use super::pattern::{AddressPattern, PortPattern};
use super::types::FirewallRule;

/// 컴파일된 규칙
///
/// 정책 스냅샷에 들어가는 불변 값입니다. `sequence`는 생성 순서로,
/// 우선순위가 같을 때의 정렬 기준입니다.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: FirewallRule,
    sequence: u64,
    source: AddressPattern,
    destination: AddressPattern,
    port: PortPattern,
    protocol: Protocol,
}

impl CompiledRule {
    /// 규칙의 패턴을 파싱하여 컴파일합니다.
    ///
    /// 잘못된 패턴이 하나라도 있으면 해당 필드를 담은 검증 에러를 반환합니다.
    pub fn compile(rule: FirewallRule, sequence: u64) -> Result<Self, RuleValidationError> {
        rule.validate()?;

        let source = AddressPattern::parse(&rule.source)
            .map_err(|e| RuleValidationError::new(rule.id.clone(), "source", e.to_string()))?;
        let destination = AddressPattern::parse(&rule.destination).map_err(|e| {
            RuleValidationError::new(rule.id.clone(), "destination", e.to_string())
        })?;
        let port = PortPattern::parse(&rule.port)
            .map_err(|e| RuleValidationError::new(rule.id.clone(), "port", e.to_string()))?;
        let protocol = Protocol::from_str_loose(&rule.protocol).ok_or_else(|| {
            RuleValidationError::new(
                rule.id.clone(),
                "protocol",
                format!(
                    "'{}' is not one of tcp, udp, icmp, any",
                    rule.protocol
                ),
            )
        })?;

        Ok(Self {
            rule,
            sequence,
            source,
            destination,
            port,
            protocol,
        })
    }

    /// 규칙이 패킷에 매칭되는지 확인합니다.
    ///
    /// 규칙이 활성화되어 있고 네 가지 조건이 모두 참일 때만 매칭됩니다.
    pub fn matches(&self, packet: &Packet) -> bool {
        self.rule.enabled
            && (self.protocol == Protocol::Any || self.protocol == packet.protocol)
            && self.port.matches(packet.port)
            && self.destination.matches(packet.destination_ip)
            && self.source.matches(packet.source_ip)
    }

    /// 원본 규칙을 반환합니다.
    pub fn rule(&self) -> &FirewallRule {
        &self.rule
    }

    /// 규칙 ID를 반환합니다.
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    /// 동작을 반환합니다.
    pub fn action(&self) -> Action {
        self.rule.action
    }

    /// 우선순위를 반환합니다.
    pub fn priority(&self) -> i32 {
        self.rule.priority
    }

    /// 생성 순서를 반환합니다.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// 정렬 키 `(priority, sequence)`를 반환합니다.
    pub fn order_key(&self) -> (i32, u64) {
        (self.rule.priority, self.sequence)
    }

    /// 컴파일된 출발지 패턴
    pub fn source(&self) -> &AddressPattern {
        &self.source
    }

    /// 컴파일된 목적지 패턴
    pub fn destination(&self) -> &AddressPattern {
        &self.destination
    }

    /// 컴파일된 포트 패턴
    pub fn port(&self) -> &PortPattern {
        &self.port
    }

    /// 컴파일된 프로토콜
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}
