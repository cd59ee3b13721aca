//! 의심 트래픽 탐지기 -- 출발지별 슬라이딩 윈도우 휴리스틱
//!
//! [`SuspicionDetector`]는 정책 결정과 별개로 패킷을 검사하여 의심 트래픽을 표시합니다.
//!
//! # 휴리스틱
//! - 반복 차단: 윈도우 안에서 같은 출발지의 차단 패킷이 N개를 초과 -> `high`
//! - 포트 스캔: 윈도우 안에서 같은 출발지가 M개를 초과하는 고유 목적지 포트에 접근 -> `critical`
//! - 비정상 ICMP: 임계값보다 큰 ICMP 패킷 -> `medium`
//!
//! 발동한 휴리스틱은 모두 [`Finding`]에 기록되며, 가장 높은 심각도가 발견의 심각도와 제목이 됩니다.
//!
//! # 상태 관리
//! 카운터는 `(테넌트, 출발지)`별로 처음 관측될 때 생성되고, 접근할 때마다 윈도우 밖 항목을
//! 제거합니다. 윈도우는 패킷 타임스탬프 기준입니다. 빈 카운터는 [`SuspicionDetector::sweep`]이
//! 제거합니다.
//!
//! 추적하는 출발지 수는 `max_tracked_sources`를 넘지 않습니다. 새 출발지는 슬롯을 먼저
//! 예약한 뒤 삽입됩니다. 상한에서의 강제 정리는 관측 시각이 앞으로 진행했을 때만 수행됩니다.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use serde::{Deserialize, Serialize};

use firewallx_core::metrics as fx_metrics;
use firewallx_core::types::{Decision, Packet, Protocol, Severity, TenantContext};

use crate::config::EngineConfig;

/// 반복 차단 발견 제목
pub const REPEATED_BLOCK_TITLE: &str = "Repeated blocked connection attempts";

/// 포트 스캔 발견 제목
pub const PORT_SCAN_TITLE: &str = "Possible port scan detected";

/// 비정상 ICMP 발견 제목
pub const ANOMALOUS_ICMP_TITLE: &str = "Anomalous ICMP traffic";

// ─── Finding ─────────────────────────────────────────────────────────

/// 휴리스틱 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicKind {
    /// 반복 차단
    RepeatedBlock,
    /// 포트 스캔
    PortScan,
    /// 비정상 ICMP
    AnomalousIcmp,
}

impl HeuristicKind {
    /// 휴리스틱의 심각도
    pub fn severity(self) -> Severity {
        match self {
            Self::RepeatedBlock => Severity::High,
            Self::PortScan => Severity::Critical,
            Self::AnomalousIcmp => Severity::Medium,
        }
    }

    /// 휴리스틱의 제목
    pub fn title(self) -> &'static str {
        match self {
            Self::RepeatedBlock => REPEATED_BLOCK_TITLE,
            Self::PortScan => PORT_SCAN_TITLE,
            Self::AnomalousIcmp => ANOMALOUS_ICMP_TITLE,
        }
    }
}

/// 발동한 휴리스틱 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicHit {
    /// 휴리스틱 종류
    pub kind: HeuristicKind,
    /// 관측값 설명 (예: "11 blocked packets within 60s (threshold 10)")
    pub detail: String,
}

impl HeuristicHit {
    fn new(kind: HeuristicKind, detail: String) -> Self {
        Self { kind, detail }
    }
}

impl fmt::Display for HeuristicHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.kind.title(),
            self.kind.severity(),
            self.detail
        )
    }
}

/// 탐지 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// 소유 테넌트
    pub tenant_id: String,
    /// 출발지 주소
    pub source_ip: IpAddr,
    /// 가장 높은 휴리스틱 심각도
    pub severity: Severity,
    /// 가장 높은 심각도 휴리스틱의 제목
    pub title: String,
    /// 발동한 모든 휴리스틱 (평가 순서)
    pub heuristics: Vec<HeuristicHit>,
    /// 발견 시각 (패킷 타임스탬프)
    pub observed_at: DateTime<Utc>,
}

impl Finding {
    /// 휴리스틱 목록에서 발견을 만듭니다. 목록이 비어 있으면 `None`입니다.
    fn from_hits(
        tenant: &TenantContext,
        packet: &Packet,
        heuristics: Vec<HeuristicHit>,
    ) -> Option<Self> {
        let top = heuristics.iter().map(|h| h.kind).max_by_key(|k| k.severity())?;
        Some(Self {
            tenant_id: tenant.tenant_id().to_owned(),
            source_ip: packet.source_ip,
            severity: top.severity(),
            title: top.title().to_owned(),
            heuristics,
            observed_at: packet.timestamp,
        })
    }

    /// 휴리스틱이 발동했는지 확인합니다.
    pub fn has(&self, kind: HeuristicKind) -> bool {
        self.heuristics.iter().any(|h| h.kind == kind)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} (source: {})", self.severity, self.title, self.source_ip)
    }
}

// ─── SourceWindow ────────────────────────────────────────────────────

/// 출발지 하나의 롤링 카운터
#[derive(Debug, Default)]
struct SourceWindow {
    /// 차단된 패킷의 타임스탬프
    blocked: VecDeque<DateTime<Utc>>,
    /// 목적지 포트 -> 마지막 관측 시각
    ports: HashMap<u16, DateTime<Utc>>,
}

impl SourceWindow {
    /// `cutoff`보다 오래된 항목을 제거합니다.
    fn evict(&mut self, cutoff: DateTime<Utc>) {
        self.blocked.retain(|ts| *ts >= cutoff);
        self.ports.retain(|_, ts| *ts >= cutoff);
    }

    fn is_empty(&self) -> bool {
        self.blocked.is_empty() && self.ports.is_empty()
    }
}

type SourceKey = (TenantContext, IpAddr);

// ─── SuspicionDetector ───────────────────────────────────────────────

/// 의심 트래픽 탐지기
///
/// 엔진에서 유일하게 패킷 간 공유되는 가변 상태를 가집니다.
/// 같은 출발지에 대한 동시 갱신은 `DashMap` 항목 잠금으로 직렬화됩니다.
pub struct SuspicionDetector {
    window: TimeDelta,
    repeated_block_threshold: usize,
    port_scan_threshold: usize,
    icmp_size_threshold: u64,
    max_tracked_sources: usize,
    sources: DashMap<SourceKey, SourceWindow>,
    /// 삽입되었거나 예약된 출발지 슬롯 수
    reserved_slots: AtomicUsize,
    /// 마지막 강제 정리의 관측 시각 (Unix 초)
    last_forced_sweep: AtomicI64,
}

impl SuspicionDetector {
    /// 엔진 설정으로 탐지기를 생성합니다.
    pub fn new(config: &EngineConfig) -> Self {
        let window = i64::try_from(config.window_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            window,
            repeated_block_threshold: config.repeated_block_threshold,
            port_scan_threshold: config.port_scan_threshold,
            icmp_size_threshold: config.icmp_size_threshold,
            max_tracked_sources: config.max_tracked_sources,
            sources: DashMap::new(),
            reserved_slots: AtomicUsize::new(0),
            last_forced_sweep: AtomicI64::new(i64::MIN),
        }
    }

    /// 결정된 패킷을 검사합니다.
    ///
    /// 휴리스틱은 결정의 동작과 무관하게 평가됩니다. 차단 결정은 반복 차단 카운터에만 반영됩니다.
    pub fn inspect(&self, tenant: &TenantContext, decision: &Decision) -> Option<Finding> {
        let packet = &decision.packet;
        let mut hits = Vec::new();

        if let Some(mut state) = self.track(tenant, packet) {
            self.inspect_window(&mut state, decision, &mut hits);
        }

        if packet.protocol == Protocol::Icmp && packet.packet_size > self.icmp_size_threshold {
            hits.push(HeuristicHit::new(
                HeuristicKind::AnomalousIcmp,
                format!(
                    "ICMP packet of {} bytes (threshold {})",
                    packet.packet_size, self.icmp_size_threshold
                ),
            ));
        }

        let finding = Finding::from_hits(tenant, packet, hits)?;
        metrics::counter!(
            fx_metrics::FINDINGS_TOTAL,
            fx_metrics::LABEL_SEVERITY => finding.severity.as_str()
        )
        .increment(1);
        tracing::debug!(
            tenant = %tenant,
            source = %finding.source_ip,
            severity = %finding.severity,
            heuristics = finding.heuristics.len(),
            "suspicion finding"
        );
        Some(finding)
    }

    /// 출발지 윈도우를 갱신하고 윈도우 기반 휴리스틱을 평가합니다.
    fn inspect_window(
        &self,
        state: &mut SourceWindow,
        decision: &Decision,
        hits: &mut Vec<HeuristicHit>,
    ) {
        let packet = &decision.packet;
        state.evict(self.cutoff(packet.timestamp));

        if decision.is_block() {
            state.blocked.push_back(packet.timestamp);
            if state.blocked.len() > self.repeated_block_threshold {
                hits.push(HeuristicHit::new(
                    HeuristicKind::RepeatedBlock,
                    format!(
                        "{} blocked packets within {}s (threshold {})",
                        state.blocked.len(),
                        self.window.num_seconds(),
                        self.repeated_block_threshold
                    ),
                ));
            }
        }

        // ICMP는 포트가 없으므로 포트 스캔 집계에서 제외
        if packet.protocol != Protocol::Icmp {
            let last_seen = state.ports.entry(packet.port).or_insert(packet.timestamp);
            if *last_seen < packet.timestamp {
                *last_seen = packet.timestamp;
            }
            if state.ports.len() > self.port_scan_threshold {
                hits.push(HeuristicHit::new(
                    HeuristicKind::PortScan,
                    format!(
                        "{} distinct destination ports within {}s (threshold {})",
                        state.ports.len(),
                        self.window.num_seconds(),
                        self.port_scan_threshold
                    ),
                ));
            }
        }
    }

    /// 출발지 카운터를 가져오거나 새로 추적합니다.
    ///
    /// 상한에 도달해 추적할 수 없으면 `None`을 반환합니다.
    fn track(
        &self,
        tenant: &TenantContext,
        packet: &Packet,
    ) -> Option<RefMut<'_, SourceKey, SourceWindow>> {
        let key = (tenant.clone(), packet.source_ip);
        // 예약은 맵 잠금 밖에서 수행 (강제 정리가 모든 샤드를 잠금)
        let reserved = !self.sources.contains_key(&key) && self.reserve_slot(tenant, packet);

        match self.sources.entry(key) {
            Entry::Occupied(entry) => {
                if reserved {
                    self.reserved_slots.fetch_sub(1, Ordering::AcqRel);
                }
                Some(entry.into_ref())
            }
            // 확인 이후 정리로 제거된 경우 예약 없이 도착할 수 있음
            Entry::Vacant(entry) if reserved || self.try_reserve() => {
                Some(entry.insert(SourceWindow::default()))
            }
            Entry::Vacant(_) => None,
        }
    }

    /// 새 출발지용 슬롯을 예약합니다.
    ///
    /// 상한에 도달하면 정리를 한 번 시도한 뒤 다시 예약합니다.
    fn reserve_slot(&self, tenant: &TenantContext, packet: &Packet) -> bool {
        if self.try_reserve() {
            return true;
        }
        if self.claim_forced_sweep(packet.timestamp) {
            self.sweep(packet.timestamp);
            if self.try_reserve() {
                return true;
            }
        }

        tracing::warn!(
            tenant = %tenant,
            source = %packet.source_ip,
            max = self.max_tracked_sources,
            "tracked source limit reached, source not tracked"
        );
        false
    }

    fn try_reserve(&self) -> bool {
        self.reserved_slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_tracked_sources).then_some(n + 1)
            })
            .is_ok()
    }

    /// 관측 시각이 이전 강제 정리보다 앞선 경우에만 정리 권한을 얻습니다.
    ///
    /// 같은 시각의 정리는 만료시킬 항목이 더 없습니다.
    fn claim_forced_sweep(&self, now: DateTime<Utc>) -> bool {
        let now = now.timestamp();
        self.last_forced_sweep
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                (now > last).then_some(now)
            })
            .is_ok()
    }

    /// 윈도우 밖 항목을 제거하고 빈 카운터를 삭제합니다.
    ///
    /// 제거된 출발지 수를 반환합니다.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = self.cutoff(now);
        let mut removed = 0;
        self.sources.retain(|_, state| {
            state.evict(cutoff);
            let keep = !state.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });
        self.reserved_slots.fetch_sub(removed, Ordering::AcqRel);

        let remaining = self.sources.len();
        metrics::gauge!(fx_metrics::DETECTOR_TRACKED_SOURCES).set(remaining as f64);
        if removed > 0 {
            tracing::debug!(removed, remaining, "detector sweep");
        }
        removed
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// 추적 중인 출발지 수
    pub fn tracked_sources(&self) -> usize {
        self.sources.len()
    }
}
