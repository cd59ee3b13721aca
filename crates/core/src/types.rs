//! 도메인 타입 -- 엔진과 협력자가 공유하는 공통 타입
//!
//! 모든 문자열 표현(`allow`, `block`, `tcp`, `udp`, `icmp`, `any`,
//! `low`, `medium`, `high`, `critical`)은 기존 레코드 스키마와의 호환을 위해
//! 소문자 리터럴로 고정됩니다.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestionError;

// ─── Severity ────────────────────────────────────────────────────────

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 낮은 심각도
    #[default]
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적, 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 와이어 리터럴을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Action ──────────────────────────────────────────────────────────

/// 규칙이 패킷에 적용하는 동작
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// 허용
    #[default]
    Allow,
    /// 차단
    Block,
}

impl Action {
    /// 문자열에서 동작을 파싱합니다 (대소문자 무시).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Some(Self::Allow),
            "block" => Some(Self::Block),
            _ => None,
        }
    }

    /// 와이어 리터럴을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Protocol ────────────────────────────────────────────────────────

/// 프로토콜
///
/// `Any`는 규칙 패턴에서만 의미가 있으며, 관측된 패킷은 항상 구체적인 프로토콜을 가집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP
    Tcp,
    /// UDP
    Udp,
    /// ICMP
    Icmp,
    /// 와일드카드
    Any,
}

impl Protocol {
    /// 문자열에서 프로토콜을 파싱합니다 (대소문자 무시).
    ///
    /// 빈 문자열과 `*`는 `any`로 취급합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "icmp" => Some(Self::Icmp),
            "any" | "*" | "" => Some(Self::Any),
            _ => None,
        }
    }

    /// 와이어 리터럴을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── TenantContext ───────────────────────────────────────────────────

/// 테넌트(소유자) 컨텍스트
///
/// 모든 엔진 호출에 명시적으로 전달됩니다.
/// 정책 테이블, 탐지 카운터, 알림 중복 제거 상태는 모두 테넌트별로 분리됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantContext {
    tenant_id: String,
}

impl TenantContext {
    /// 새 테넌트 컨텍스트를 생성합니다.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
        }
    }

    /// 테넌트 ID를 반환합니다.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}

impl fmt::Display for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tenant_id)
    }
}

// ─── PacketDescriptor / Packet ───────────────────────────────────────

/// 관측된 패킷 디스크립터 (수집 협력자가 전달한 원본 형태)
///
/// 누락 필드를 감지할 수 있도록 모든 필드가 선택적입니다.
/// 평가 전에 [`Packet`]으로 검증됩니다. 엔진은 이 값을 저장하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketDescriptor {
    /// 관측 시각
    pub timestamp: Option<DateTime<Utc>>,
    /// 출발지 주소
    pub source_ip: Option<String>,
    /// 목적지 주소
    pub destination_ip: Option<String>,
    /// 목적지 포트
    pub port: Option<i64>,
    /// 프로토콜 (`tcp`, `udp`, `icmp`)
    pub protocol: Option<String>,
    /// 패킷 크기 (바이트)
    pub packet_size: Option<i64>,
}

impl PacketDescriptor {
    /// 모든 필드가 채워진 디스크립터를 생성합니다.
    pub fn new(
        timestamp: DateTime<Utc>,
        source_ip: IpAddr,
        destination_ip: IpAddr,
        port: u16,
        protocol: Protocol,
        packet_size: u64,
    ) -> Self {
        Self {
            timestamp: Some(timestamp),
            source_ip: Some(source_ip.to_string()),
            destination_ip: Some(destination_ip.to_string()),
            port: Some(i64::from(port)),
            protocol: Some(protocol.as_str().to_owned()),
            packet_size: Some(i64::try_from(packet_size).unwrap_or(i64::MAX)),
        }
    }
}

/// 검증된 패킷
///
/// 모든 필드가 존재하고 타입이 확정된 상태입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// 관측 시각
    pub timestamp: DateTime<Utc>,
    /// 출발지 주소
    pub source_ip: IpAddr,
    /// 목적지 주소
    pub destination_ip: IpAddr,
    /// 목적지 포트 (ICMP는 0)
    pub port: u16,
    /// 프로토콜 (`Any`가 아님)
    pub protocol: Protocol,
    /// 패킷 크기 (바이트)
    pub packet_size: u64,
}

impl TryFrom<&PacketDescriptor> for Packet {
    type Error = IngestionError;

    fn try_from(desc: &PacketDescriptor) -> Result<Self, Self::Error> {
        let timestamp = desc
            .timestamp
            .ok_or_else(|| IngestionError::missing("timestamp"))?;
        let source_ip = parse_ip(desc.source_ip.as_deref(), "source_ip")?;
        let destination_ip = parse_ip(desc.destination_ip.as_deref(), "destination_ip")?;

        let protocol_raw = desc
            .protocol
            .as_deref()
            .ok_or_else(|| IngestionError::missing("protocol"))?;
        let protocol = match Protocol::from_str_loose(protocol_raw) {
            Some(Protocol::Any) | None => {
                return Err(IngestionError::invalid(
                    "protocol",
                    format!("expected tcp, udp or icmp, got '{protocol_raw}'"),
                ));
            }
            Some(p) => p,
        };

        // ICMP에는 포트 개념이 없으므로 누락 시 0으로 간주
        let port = match (desc.port, protocol) {
            (None, Protocol::Icmp) => 0,
            (None, _) => return Err(IngestionError::missing("port")),
            (Some(p), _) => u16::try_from(p).map_err(|_| {
                IngestionError::invalid("port", format!("{p} is outside 0-65535"))
            })?,
        };

        let packet_size = desc
            .packet_size
            .ok_or_else(|| IngestionError::missing("packet_size"))?;
        let packet_size = u64::try_from(packet_size).map_err(|_| {
            IngestionError::invalid("packet_size", format!("{packet_size} is negative"))
        })?;

        Ok(Self {
            timestamp,
            source_ip,
            destination_ip,
            port,
            protocol,
            packet_size,
        })
    }
}

fn parse_ip(raw: Option<&str>, field: &str) -> Result<IpAddr, IngestionError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IngestionError::missing(field))?;
    raw.parse()
        .map_err(|_| IngestionError::invalid(field, format!("'{raw}' is not an IP address")))
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}:{} proto={} size={}",
            self.source_ip, self.destination_ip, self.port, self.protocol, self.packet_size,
        )
    }
}

// ─── Decision / LogRecord ────────────────────────────────────────────

/// 정책 매칭 결과
///
/// `rule_id`가 `None`이면 기본 정책이 적용된 것입니다. 생성 후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// 적용된 동작
    pub action: Action,
    /// 매칭된 규칙 ID
    pub rule_id: Option<String>,
    /// 결정 대상 패킷
    pub packet: Packet,
}

impl Decision {
    /// 차단 결정인지 확인합니다.
    pub fn is_block(&self) -> bool {
        self.action == Action::Block
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (rule: {})",
            self.action,
            self.packet,
            self.rule_id.as_deref().unwrap_or("default"),
        )
    }
}

/// 감사 로그 레코드
///
/// 평가된 패킷마다 정확히 하나씩, 평가 순서대로 생성됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// 레코드 ID (UUID v4)
    pub id: String,
    /// 소유 테넌트
    pub tenant_id: String,
    /// 결정
    pub decision: Decision,
    /// 의심 트래픽 여부
    pub is_suspicious: bool,
    /// 기록 시각
    pub logged_at: DateTime<Utc>,
}

impl LogRecord {
    /// 새 로그 레코드를 생성합니다.
    pub fn new(tenant: &TenantContext, decision: Decision, is_suspicious: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant.tenant_id().to_owned(),
            decision,
            is_suspicious,
            logged_at: Utc::now(),
        }
    }

    /// 검색어가 출발지/목적지 주소나 프로토콜에 포함되는지 확인합니다.
    ///
    /// 대소문자를 구분하지 않으며, 빈 검색어는 모든 레코드와 일치합니다.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_ascii_lowercase();
        if term.is_empty() {
            return true;
        }
        let packet = &self.decision.packet;
        packet.source_ip.to_string().contains(&term)
            || packet.destination_ip.to_string().contains(&term)
            || packet.protocol.as_str().contains(&term)
    }
}

/// 거부된 패킷 레코드
///
/// 검증에 실패한 디스크립터도 로그 단계를 건너뛰지 않도록 원본과 사유를 함께 남깁니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedPacket {
    /// 레코드 ID (UUID v4)
    pub id: String,
    /// 소유 테넌트
    pub tenant_id: String,
    /// 원본 디스크립터
    pub descriptor: PacketDescriptor,
    /// 거부 사유
    pub reason: IngestionError,
    /// 거부 시각
    pub rejected_at: DateTime<Utc>,
}

impl RejectedPacket {
    /// 새 거부 레코드를 생성합니다.
    pub fn new(tenant: &TenantContext, descriptor: PacketDescriptor, reason: IngestionError) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant.tenant_id().to_owned(),
            descriptor,
            reason,
            rejected_at: Utc::now(),
        }
    }
}

// ─── Alert ───────────────────────────────────────────────────────────

/// 보안 알림
///
/// 개별 패킷보다 오래 유지되는 독립 엔티티입니다. 생성 후 내용은 변경되지 않으며,
/// 읽음 상태만 관리 인터페이스에서 바뀝니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// 알림 ID (UUID v4)
    pub id: String,
    /// 소유 테넌트
    pub tenant_id: String,
    /// 심각도
    pub severity: Severity,
    /// 알림 제목
    pub title: String,
    /// 상세 설명
    pub description: String,
    /// 관련 출발지 주소
    pub source_ip: IpAddr,
    /// 읽음 여부
    pub is_read: bool,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (source: {})",
            self.severity, self.title, self.source_ip,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn full_descriptor() -> PacketDescriptor {
        PacketDescriptor::new(
            ts(),
            "192.168.1.10".parse().unwrap(),
            "10.0.0.5".parse().unwrap(),
            443,
            Protocol::Tcp,
            1500,
        )
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_display_uses_wire_literals() {
        assert_eq!(Severity::Low.to_string(), "low");
        assert_eq!(Severity::Medium.to_string(), "medium");
        assert_eq!(Severity::High.to_string(), "high");
        assert_eq!(Severity::Critical.to_string(), "critical");
    }

    #[test]
    fn severity_from_str_loose() {
        assert_eq!(Severity::from_str_loose("HIGH"), Some(Severity::High));
        assert_eq!(Severity::from_str_loose("crit"), Some(Severity::Critical));
        assert_eq!(Severity::from_str_loose("info"), None);
    }

    #[test]
    fn enums_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Action::Block).unwrap(), "\"block\"");
        assert_eq!(serde_json::to_string(&Protocol::Icmp).unwrap(), "\"icmp\"");
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
        let p: Protocol = serde_json::from_str("\"any\"").unwrap();
        assert_eq!(p, Protocol::Any);
    }

    #[test]
    fn protocol_from_str_loose_treats_blank_as_any() {
        assert_eq!(Protocol::from_str_loose(""), Some(Protocol::Any));
        assert_eq!(Protocol::from_str_loose("*"), Some(Protocol::Any));
        assert_eq!(Protocol::from_str_loose("UDP"), Some(Protocol::Udp));
        assert_eq!(Protocol::from_str_loose("sctp"), None);
    }

    #[test]
    fn action_from_str_loose() {
        assert_eq!(Action::from_str_loose("Block"), Some(Action::Block));
        assert_eq!(Action::from_str_loose("allow"), Some(Action::Allow));
        assert_eq!(Action::from_str_loose("blocked"), None);
    }

    #[test]
    fn packet_from_full_descriptor() {
        let packet = Packet::try_from(&full_descriptor()).unwrap();
        assert_eq!(packet.port, 443);
        assert_eq!(packet.protocol, Protocol::Tcp);
        assert_eq!(packet.packet_size, 1500);
        assert_eq!(packet.timestamp, ts());
    }

    #[test]
    fn packet_rejects_missing_source() {
        let mut desc = full_descriptor();
        desc.source_ip = None;
        let err = Packet::try_from(&desc).unwrap_err();
        assert_eq!(err, IngestionError::missing("source_ip"));
    }

    #[test]
    fn packet_rejects_blank_destination_as_missing() {
        let mut desc = full_descriptor();
        desc.destination_ip = Some("   ".to_owned());
        let err = Packet::try_from(&desc).unwrap_err();
        assert_eq!(err, IngestionError::missing("destination_ip"));
    }

    #[test]
    fn packet_rejects_missing_timestamp() {
        let mut desc = full_descriptor();
        desc.timestamp = None;
        assert_eq!(
            Packet::try_from(&desc).unwrap_err(),
            IngestionError::missing("timestamp")
        );
    }

    #[test]
    fn packet_rejects_any_protocol() {
        let mut desc = full_descriptor();
        desc.protocol = Some("any".to_owned());
        assert!(matches!(
            Packet::try_from(&desc),
            Err(IngestionError::InvalidField { ref field, .. }) if field == "protocol"
        ));
    }

    #[test]
    fn packet_rejects_out_of_range_port() {
        let mut desc = full_descriptor();
        desc.port = Some(70_000);
        assert!(matches!(
            Packet::try_from(&desc),
            Err(IngestionError::InvalidField { ref field, .. }) if field == "port"
        ));
    }

    #[test]
    fn packet_rejects_invalid_address() {
        let mut desc = full_descriptor();
        desc.source_ip = Some("300.1.1.1".to_owned());
        assert!(matches!(
            Packet::try_from(&desc),
            Err(IngestionError::InvalidField { ref field, .. }) if field == "source_ip"
        ));
    }

    #[test]
    fn icmp_without_port_defaults_to_zero() {
        let mut desc = full_descriptor();
        desc.protocol = Some("icmp".to_owned());
        desc.port = None;
        let packet = Packet::try_from(&desc).unwrap();
        assert_eq!(packet.port, 0);
    }

    #[test]
    fn tcp_without_port_is_rejected() {
        let mut desc = full_descriptor();
        desc.port = None;
        assert_eq!(
            Packet::try_from(&desc).unwrap_err(),
            IngestionError::missing("port")
        );
    }

    #[test]
    fn descriptor_deserializes_with_missing_fields() {
        let desc: PacketDescriptor =
            serde_json::from_str(r#"{"source_ip":"1.2.3.4","protocol":"udp"}"#).unwrap();
        assert_eq!(desc.source_ip.as_deref(), Some("1.2.3.4"));
        assert!(desc.port.is_none());
        assert!(desc.timestamp.is_none());
    }

    #[test]
    fn decision_display_names_default_policy() {
        let decision = Decision {
            action: Action::Allow,
            rule_id: None,
            packet: Packet::try_from(&full_descriptor()).unwrap(),
        };
        let display = decision.to_string();
        assert!(display.starts_with("allow"));
        assert!(display.contains("default"));
        assert!(!decision.is_block());
    }

    #[test]
    fn log_record_carries_tenant_and_unique_id() {
        let tenant = TenantContext::new("tenant-a");
        let decision = Decision {
            action: Action::Block,
            rule_id: Some("r-1".to_owned()),
            packet: Packet::try_from(&full_descriptor()).unwrap(),
        };
        let a = LogRecord::new(&tenant, decision.clone(), false);
        let b = LogRecord::new(&tenant, decision, true);
        assert_eq!(a.tenant_id, "tenant-a");
        assert_ne!(a.id, b.id);
        assert!(b.is_suspicious);
    }

    #[test]
    fn log_record_search_matches_addresses_and_protocol() {
        let decision = Decision {
            action: Action::Allow,
            rule_id: None,
            packet: Packet::try_from(&full_descriptor()).unwrap(),
        };
        let record = LogRecord::new(&TenantContext::new("t"), decision, false);

        assert!(record.matches_search("192.168"));
        assert!(record.matches_search("10.0.0.5"));
        assert!(record.matches_search("TCP"));
        assert!(record.matches_search(""));
        assert!(!record.matches_search("udp"));
        assert!(!record.matches_search("172.16"));
    }

    #[test]
    fn tenant_context_serializes_transparently() {
        let tenant = TenantContext::new("acme");
        assert_eq!(serde_json::to_string(&tenant).unwrap(), "\"acme\"");
        assert_eq!(tenant.to_string(), "acme");
    }
}
