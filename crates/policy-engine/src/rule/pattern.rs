//! 주소/포트 패턴 -- 규칙 필드 문자열의 파싱과 매칭
//!
//! # 주소 패턴
//! - 단일 주소: `192.168.1.1`, `2001:db8::1`
//! - CIDR 블록: `10.0.0.0/8`, `2001:db8::/32`
//! - 와일드카드: `any` (빈 문자열과 `*`도 `any`로 취급)
//!
//! # 포트 패턴
//! - 단일 포트: `443`
//! - 범위 (양 끝 포함): `1000-2000`
//! - 집합 (단일/범위 혼합): `80, 443, 8000-8080`
//! - 와일드카드: `any`
//!
//! 모든 패턴은 정규 형식으로 `Display` 되며, 출력 문자열을 다시 파싱하면
//! 같은 패턴이 됩니다.

use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;

/// 패턴 파싱 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// 주소 형식 오류
    #[error("'{0}' is not an IP address")]
    InvalidAddress(String),

    /// CIDR 형식 오류
    #[error("invalid CIDR block '{value}': {reason}")]
    InvalidCidr {
        /// 원본 값
        value: String,
        /// 실패 사유
        reason: String,
    },

    /// 숫자가 아니거나 0-65535 범위를 벗어난 포트
    #[error("'{0}' is not a port number (0-65535)")]
    InvalidPort(String),

    /// 시작이 끝보다 큰 범위
    #[error("port range '{0}' has start greater than end")]
    InvertedRange(String),

    /// 포트 집합에 빈 항목이 있음
    #[error("port set '{0}' contains an empty item")]
    EmptySetItem(String),
}

fn is_wildcard(raw: &str) -> bool {
    raw.is_empty() || raw == "*" || raw.eq_ignore_ascii_case("any")
}

// ─── AddressPattern ──────────────────────────────────────────────────

/// 주소 패턴
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPattern {
    /// 모든 주소
    Any,
    /// 단일 주소 (정확히 일치)
    Exact(IpAddr),
    /// CIDR 블록 (포함 관계)
    Cidr(IpNetwork),
}

impl AddressPattern {
    /// 패턴 문자열을 파싱합니다.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        if is_wildcard(raw) {
            return Ok(Self::Any);
        }

        if raw.contains('/') {
            return raw
                .parse::<IpNetwork>()
                .map(Self::Cidr)
                .map_err(|e| PatternError::InvalidCidr {
                    value: raw.to_owned(),
                    reason: e.to_string(),
                });
        }

        raw.parse::<IpAddr>()
            .map(Self::Exact)
            .map_err(|_| PatternError::InvalidAddress(raw.to_owned()))
    }

    /// 주소가 패턴에 매칭되는지 확인합니다.
    ///
    /// IPv4 패턴은 IPv6 주소에 매칭되지 않으며 그 반대도 마찬가지입니다.
    pub fn matches(&self, addr: IpAddr) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => *expected == addr,
            Self::Cidr(network) => network.contains(addr),
        }
    }
}

impl fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Exact(addr) => write!(f, "{addr}"),
            Self::Cidr(network) => write!(f, "{}/{}", network.ip(), network.prefix()),
        }
    }
}

// ─── PortPattern ─────────────────────────────────────────────────────

/// 포트 집합의 항목
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortItem {
    /// 단일 포트
    Single(u16),
    /// 범위 (양 끝 포함)
    Range(u16, u16),
}

impl PortItem {
    fn parse(raw: &str) -> Result<Self, PatternError> {
        match raw.split_once('-') {
            Some((lo, hi)) => {
                let lo = parse_port(lo)?;
                let hi = parse_port(hi)?;
                if lo > hi {
                    return Err(PatternError::InvertedRange(raw.to_owned()));
                }
                Ok(Self::Range(lo, hi))
            }
            None => parse_port(raw).map(Self::Single),
        }
    }

    fn contains(&self, port: u16) -> bool {
        match *self {
            Self::Single(p) => p == port,
            Self::Range(lo, hi) => (lo..=hi).contains(&port),
        }
    }
}

impl fmt::Display for PortItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(p) => write!(f, "{p}"),
            Self::Range(lo, hi) => write!(f, "{lo}-{hi}"),
        }
    }
}

fn parse_port(raw: &str) -> Result<u16, PatternError> {
    let raw = raw.trim();
    raw.parse::<u16>()
        .map_err(|_| PatternError::InvalidPort(raw.to_owned()))
}

/// 포트 패턴
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortPattern {
    /// 모든 포트
    Any,
    /// 단일 포트
    Single(u16),
    /// 범위 (양 끝 포함)
    Range(u16, u16),
    /// 명시적 집합 (항목은 단일 포트 또는 범위)
    Set(Vec<PortItem>),
}

impl PortPattern {
    /// 패턴 문자열을 파싱합니다.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        if is_wildcard(raw) {
            return Ok(Self::Any);
        }

        if raw.contains(',') {
            let items = raw
                .split(',')
                .map(|item| {
                    let item = item.trim();
                    if item.is_empty() {
                        Err(PatternError::EmptySetItem(raw.to_owned()))
                    } else {
                        PortItem::parse(item)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Set(items));
        }

        Ok(match PortItem::parse(raw)? {
            PortItem::Single(p) => Self::Single(p),
            PortItem::Range(lo, hi) => Self::Range(lo, hi),
        })
    }

    /// 포트가 패턴에 매칭되는지 확인합니다.
    pub fn matches(&self, port: u16) -> bool {
        match self {
            Self::Any => true,
            Self::Single(p) => *p == port,
            Self::Range(lo, hi) => (*lo..=*hi).contains(&port),
            Self::Set(items) => items.iter().any(|item| item.contains(port)),
        }
    }
}

impl fmt::Display for PortPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Single(p) => write!(f, "{p}"),
            Self::Range(lo, hi) => write!(f, "{lo}-{hi}"),
            Self::Set(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}
