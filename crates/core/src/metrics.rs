//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다. 레코더 설치는 바이너리의 몫입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `firewallx_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 프로토콜 레이블 키 (tcp, udp, icmp)
pub const LABEL_PROTOCOL: &str = "protocol";

/// 심각도 레이블 키 (low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 동작 레이블 키 (allow, block)
pub const LABEL_ACTION: &str = "action";

/// 협력자 레이블 키 (log, alert)
pub const LABEL_SINK: &str = "sink";

// ─── 평가 메트릭 ───────────────────────────────────────────────────

/// 평가된 패킷 수 (counter, label: action)
pub const PACKETS_EVALUATED_TOTAL: &str = "firewallx_packets_evaluated_total";

/// 차단된 패킷 수 (counter)
pub const PACKETS_BLOCKED_TOTAL: &str = "firewallx_packets_blocked_total";

/// 검증 실패로 거부된 패킷 수 (counter)
pub const PACKETS_REJECTED_TOTAL: &str = "firewallx_packets_rejected_total";

/// 패킷 1개 평가 소요 시간 (histogram, 초)
pub const EVALUATION_DURATION_SECONDS: &str = "firewallx_evaluation_duration_seconds";

// ─── 탐지/알림 메트릭 ──────────────────────────────────────────────

/// 탐지기 발견 수 (counter, label: severity)
pub const FINDINGS_TOTAL: &str = "firewallx_findings_total";

/// 발행된 알림 수 (counter, label: severity)
pub const ALERTS_EMITTED_TOTAL: &str = "firewallx_alerts_emitted_total";

/// 쿨다운으로 억제된 알림 수 (counter)
pub const ALERTS_SUPPRESSED_TOTAL: &str = "firewallx_alerts_suppressed_total";

/// 추적 중인 출발지 수 (gauge)
pub const DETECTOR_TRACKED_SOURCES: &str = "firewallx_detector_tracked_sources";

// ─── 정책/영속화 메트릭 ────────────────────────────────────────────

/// 활성 규칙 수 (gauge)
pub const RULES_ACTIVE: &str = "firewallx_rules_active";

/// 규칙 검증 실패 수 (counter)
pub const RULE_VALIDATION_ERRORS_TOTAL: &str = "firewallx_rule_validation_errors_total";

/// 협력자 전달 실패 수 (counter, label: sink)
pub const PERSISTENCE_FAILURES_TOTAL: &str = "firewallx_persistence_failures_total";

/// 평가 지연 히스토그램 버킷 (초)
pub const EVALUATION_DURATION_BUCKETS: &[f64] = &[
    0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01,
];

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더가 설치되지 않은 상태에서 호출해도 안전합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        PACKETS_EVALUATED_TOTAL,
        "Total number of packets evaluated against the policy table"
    );
    describe_counter!(
        PACKETS_BLOCKED_TOTAL,
        "Total number of packets that received a block decision"
    );
    describe_counter!(
        PACKETS_REJECTED_TOTAL,
        "Total number of packet descriptors rejected during ingestion"
    );
    describe_histogram!(
        EVALUATION_DURATION_SECONDS,
        "Per-packet evaluation latency in seconds"
    );
    describe_counter!(FINDINGS_TOTAL, "Suspicion findings produced by the detector");
    describe_counter!(
        ALERTS_EMITTED_TOTAL,
        "Alerts emitted after deduplication"
    );
    describe_counter!(
        ALERTS_SUPPRESSED_TOTAL,
        "Findings suppressed by the alert cool-down"
    );
    describe_gauge!(
        DETECTOR_TRACKED_SOURCES,
        "Source addresses currently tracked by the suspicion detector"
    );
    describe_gauge!(RULES_ACTIVE, "Enabled and valid rules across all tenants");
    describe_counter!(
        RULE_VALIDATION_ERRORS_TOTAL,
        "Rules excluded from the policy table because of malformed patterns"
    );
    describe_counter!(
        PERSISTENCE_FAILURES_TOTAL,
        "Failed hand-offs to the log or alert collaborator"
    );
}
