//! 평가 엔진 -- 패킷 하나의 평가 흐름을 관리합니다.
//!
//! [`FirewallEngine`]은 정책 테이블, 탐지기, 알림 분류기를 묶고
//! 주입된 로그/알림 협력자에 레코드를 전달합니다.
//!
//! # 패킷 상태 흐름
//! ```text
//! Received -> Matched(decision) -> Inspected(finding?) -> Logged -> [AlertEmitted?] -> Done
//!     \
//!      -> Rejected (검증 실패, 거부 레코드는 로그 협력자로 전달)
//! ```
//!
//! 각 패킷의 평가는 독립적이며 자동 재시도는 없습니다. 협력자 전달 실패는
//! 결정과 함께 호출자에게 반환됩니다.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use firewallx_core::error::{IngestionError, PersistenceError};
use firewallx_core::metrics as fx_metrics;
use firewallx_core::pipeline::{AlertSink, LogSink};
use firewallx_core::types::{
    Alert, Decision, LogRecord, Packet, PacketDescriptor, RejectedPacket, TenantContext,
};

use crate::alert::AlertClassifier;
use crate::config::EngineConfig;
use crate::detector::{Finding, SuspicionDetector};
use crate::error::EngineError;
use crate::rule::{FirewallRule, PolicyStats, PolicyTable, RuleLoader, RuleUpdateReport};

/// 평가 결과
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// 정책 결정
    pub decision: Decision,
    /// 로그 협력자에 전달한 레코드
    pub log_record: LogRecord,
    /// 탐지 결과
    pub finding: Option<Finding>,
    /// 중복 제거를 통과한 알림
    pub alert: Option<Alert>,
    /// 협력자 전달 실패 (결정은 유효함)
    pub persistence_errors: Vec<PersistenceError>,
}

impl Evaluation {
    /// 의심 트래픽으로 표시되었는지 확인합니다.
    pub fn is_suspicious(&self) -> bool {
        self.finding.is_some()
    }

    /// 모든 레코드가 협력자에 전달되었는지 확인합니다.
    pub fn is_persisted(&self) -> bool {
        self.persistence_errors.is_empty()
    }
}

/// 거부된 패킷
///
/// 검증 에러와 함께, 로그 협력자에 전달한 거부 레코드를 담습니다.
#[derive(Debug, thiserror::Error)]
#[error("packet rejected: {error}")]
pub struct Rejection {
    /// 검증 에러
    pub error: IngestionError,
    /// 거부 레코드
    pub record: Box<RejectedPacket>,
    /// 거부 레코드 전달 실패
    pub persistence: Option<PersistenceError>,
}

/// 대시보드용 테넌트 통계
///
/// 모든 값은 요청한 테넌트의 트래픽만 집계합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// 평가된 패킷 수
    pub evaluated: u64,
    /// 차단된 패킷 수
    pub blocked: u64,
    /// 거부된 패킷 수
    pub rejected: u64,
    /// 의심 트래픽으로 표시된 패킷 수
    pub suspicious: u64,
    /// 발행된 알림 수
    pub alerts_emitted: u64,
    /// 쿨다운으로 억제된 알림 수
    pub alerts_suppressed: u64,
    /// 테넌트의 읽지 않은 알림 수
    pub unread_alerts: usize,
    /// 테넌트의 정책 통계
    pub rules: PolicyStats,
}

/// 정리 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// 제거된 탐지 카운터 수
    pub sources_removed: usize,
    /// 제거된 알림 추적 항목 수
    pub alerts_removed: usize,
}

/// 테넌트별 패킷 카운터
#[derive(Debug, Default)]
struct Counters {
    evaluated: AtomicU64,
    blocked: AtomicU64,
    rejected: AtomicU64,
    suspicious: AtomicU64,
}

impl Counters {
    /// (evaluated, blocked, rejected, suspicious)
    fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.evaluated.load(Ordering::Relaxed),
            self.blocked.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.suspicious.load(Ordering::Relaxed),
        )
    }
}

/// 방화벽 정책 평가 엔진
///
/// `Send + Sync`이며 `Arc`로 공유하여 여러 태스크에서 동시에 평가할 수 있습니다.
///
/// # 사용 예시
/// ```ignore
/// use firewallx_engine::{EngineConfig, FirewallEngine, MemorySink};
///
/// let sink = MemorySink::new();
/// let engine = FirewallEngine::new(EngineConfig::default(), sink.clone(), sink)?;
/// engine.update_rules(&tenant, rules);
/// let evaluation = engine.evaluate(&tenant, descriptor).await?;
/// ```
pub struct FirewallEngine<L: LogSink, A: AlertSink> {
    config: EngineConfig,
    policy: PolicyTable,
    detector: SuspicionDetector,
    classifier: AlertClassifier,
    log_sink: L,
    alert_sink: A,
    counters: DashMap<TenantContext, Counters>,
}

impl<L: LogSink, A: AlertSink> FirewallEngine<L, A> {
    /// 새 엔진을 생성합니다.
    ///
    /// # Errors
    /// 설정 검증에 실패하면 `EngineError::Config`를 반환합니다.
    pub fn new(config: EngineConfig, log_sink: L, alert_sink: A) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            policy: PolicyTable::new(config.default_action),
            detector: SuspicionDetector::new(&config),
            classifier: AlertClassifier::new(&config),
            config,
            log_sink,
            alert_sink,
            counters: DashMap::new(),
        })
    }

    /// 패킷 하나를 평가합니다.
    ///
    /// # Errors
    /// 디스크립터 검증에 실패하면 [`Rejection`]을 반환합니다. 거부 레코드는
    /// 이미 로그 협력자에 전달된 상태입니다.
    pub async fn evaluate(
        &self,
        tenant: &TenantContext,
        descriptor: PacketDescriptor,
    ) -> Result<Evaluation, Rejection> {
        let started = Instant::now();

        // Received
        let packet = match Packet::try_from(&descriptor) {
            Ok(packet) => packet,
            Err(error) => return Err(self.reject(tenant, descriptor, error).await),
        };

        // Matched
        let decision = self.policy.resolve(tenant, packet);

        // Inspected
        let finding = self.detector.inspect(tenant, &decision);

        // Logged
        let mut persistence_errors = Vec::new();
        let log_record = LogRecord::new(tenant, decision.clone(), finding.is_some());
        if let Err(e) = self.log_sink.persist_log(&log_record).await {
            self.persistence_failed(tenant, "log", &e);
            persistence_errors.push(e);
        }

        // AlertEmitted
        let alert = finding
            .as_ref()
            .and_then(|f| self.classifier.classify(tenant, f));
        if let Some(alert) = &alert
            && let Err(e) = self.alert_sink.persist_alert(alert).await
        {
            self.persistence_failed(tenant, "alert", &e);
            persistence_errors.push(e);
        }

        self.record(tenant, &decision, finding.is_some());
        metrics::histogram!(fx_metrics::EVALUATION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        tracing::debug!(
            tenant = %tenant,
            action = %decision.action,
            rule_id = decision.rule_id.as_deref().unwrap_or("default"),
            source = %decision.packet.source_ip,
            suspicious = finding.is_some(),
            "packet evaluated"
        );

        Ok(Evaluation {
            decision,
            log_record,
            finding,
            alert,
            persistence_errors,
        })
    }

    async fn reject(
        &self,
        tenant: &TenantContext,
        descriptor: PacketDescriptor,
        error: IngestionError,
    ) -> Rejection {
        self.counters
            .entry(tenant.clone())
            .or_default()
            .rejected
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!(fx_metrics::PACKETS_REJECTED_TOTAL).increment(1);
        tracing::warn!(tenant = %tenant, error = %error, "packet descriptor rejected");

        let record = RejectedPacket::new(tenant, descriptor, error.clone());
        let persistence = match self.log_sink.persist_rejection(&record).await {
            Ok(()) => None,
            Err(e) => {
                self.persistence_failed(tenant, "log", &e);
                Some(e)
            }
        };

        Rejection {
            error,
            record: Box::new(record),
            persistence,
        }
    }

    fn record(&self, tenant: &TenantContext, decision: &Decision, suspicious: bool) {
        let counters = self.counters.entry(tenant.clone()).or_default();
        counters.evaluated.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            fx_metrics::PACKETS_EVALUATED_TOTAL,
            fx_metrics::LABEL_ACTION => decision.action.as_str()
        )
        .increment(1);

        if decision.is_block() {
            counters.blocked.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(
                fx_metrics::PACKETS_BLOCKED_TOTAL,
                fx_metrics::LABEL_PROTOCOL => decision.packet.protocol.as_str()
            )
            .increment(1);
        }
        if suspicious {
            counters.suspicious.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn persistence_failed(&self, tenant: &TenantContext, sink: &'static str, err: &PersistenceError) {
        metrics::counter!(
            fx_metrics::PERSISTENCE_FAILURES_TOTAL,
            fx_metrics::LABEL_SINK => sink
        )
        .increment(1);
        tracing::error!(tenant = %tenant, sink, error = %err, "collaborator hand-off failed");
    }

    // ─── 규칙 관리 ───────────────────────────────────────────────────

    /// 테넌트의 규칙 집합을 원자적으로 교체합니다.
    pub fn update_rules(&self, tenant: &TenantContext, rules: Vec<FirewallRule>) -> RuleUpdateReport {
        self.policy.update_rules(tenant, rules)
    }

    /// 규칙 파일을 로드하여 테넌트의 규칙 집합을 교체합니다.
    pub async fn load_rules_file(
        &self,
        tenant: &TenantContext,
        path: impl AsRef<Path>,
    ) -> Result<RuleUpdateReport, EngineError> {
        let rules = RuleLoader::load_file(path).await?;
        Ok(self.policy.update_rules(tenant, rules))
    }

    /// 규칙 하나를 추가합니다.
    pub fn insert_rule(
        &self,
        tenant: &TenantContext,
        rule: FirewallRule,
    ) -> Result<RuleUpdateReport, EngineError> {
        self.policy.insert_rule(tenant, rule)
    }

    /// 같은 ID의 규칙을 교체합니다.
    pub fn replace_rule(
        &self,
        tenant: &TenantContext,
        rule: FirewallRule,
    ) -> Result<RuleUpdateReport, EngineError> {
        self.policy.replace_rule(tenant, rule)
    }

    /// 규칙을 삭제합니다.
    pub fn remove_rule(
        &self,
        tenant: &TenantContext,
        rule_id: &str,
    ) -> Result<FirewallRule, EngineError> {
        self.policy.remove_rule(tenant, rule_id)
    }

    /// 규칙의 활성화 여부를 변경합니다.
    pub fn set_rule_enabled(
        &self,
        tenant: &TenantContext,
        rule_id: &str,
        enabled: bool,
    ) -> Result<(), EngineError> {
        self.policy.set_rule_enabled(tenant, rule_id, enabled)
    }

    /// 테넌트의 규칙을 평가 순서로 반환합니다.
    pub fn rules(&self, tenant: &TenantContext) -> Vec<FirewallRule> {
        self.policy.rules(tenant)
    }

    // ─── 알림 관리 ───────────────────────────────────────────────────

    /// 알림을 읽음 처리합니다.
    pub fn mark_alert_read(&self, tenant: &TenantContext, alert_id: &str) -> Result<(), EngineError> {
        self.classifier.mark_read(tenant, alert_id)
    }

    /// 알림을 삭제합니다.
    pub fn dismiss_alert(&self, tenant: &TenantContext, alert_id: &str) -> Result<(), EngineError> {
        self.classifier.dismiss(tenant, alert_id)
    }

    /// 테넌트의 읽지 않은 알림 수
    pub fn unread_alerts(&self, tenant: &TenantContext) -> usize {
        self.classifier.unread_count(tenant)
    }

    // ─── 유지보수 ────────────────────────────────────────────────────

    /// 만료된 탐지 카운터와 알림 추적 항목을 정리합니다.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        SweepReport {
            sources_removed: self.detector.sweep(now),
            alerts_removed: self.classifier.cleanup_expired(now),
        }
    }

    /// 테넌트의 대시보드용 통계를 반환합니다.
    pub fn stats(&self, tenant: &TenantContext) -> EngineStats {
        let (evaluated, blocked, rejected, suspicious) = self
            .counters
            .get(tenant)
            .map(|c| c.snapshot())
            .unwrap_or_default();
        EngineStats {
            evaluated,
            blocked,
            rejected,
            suspicious,
            alerts_emitted: self.classifier.total_emitted(tenant),
            alerts_suppressed: self.classifier.total_suppressed(tenant),
            unread_alerts: self.classifier.unread_count(tenant),
            rules: self.policy.stats(tenant),
        }
    }

    /// 엔진 설정
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 정책 테이블
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// 탐지기
    pub fn detector(&self) -> &SuspicionDetector {
        &self.detector
    }
}
