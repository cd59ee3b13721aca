//! 알림 분류 및 중복 제거 -- 탐지 결과를 Alert로 변환합니다.
//!
//! [`AlertClassifier`]는 [`Finding`]을 받아 쿨다운 기반 중복 제거를 적용한 뒤
//! [`Alert`]를 생성합니다.
//!
//! 같은 `(테넌트, 제목, 출발지)`에 대해 읽지 않은 알림이 쿨다운 안에 이미 발행되었으면
//! 새 알림을 만들지 않습니다. 쿨다운은 발견 시각(패킷 타임스탬프) 기준입니다.
//! 알림이 읽음 처리되거나 삭제되면 더 이상 억제하지 않습니다.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use firewallx_core::metrics as fx_metrics;
use firewallx_core::types::{Alert, TenantContext};

use crate::config::EngineConfig;
use crate::detector::Finding;
use crate::error::EngineError;

/// 중복 제거 키: (테넌트, 제목, 출발지)
type DedupKey = (TenantContext, String, IpAddr);

/// 중복 제거 추적 항목 -- 해당 키로 마지막 발행된 읽지 않은 알림
#[derive(Debug, Clone)]
struct DedupEntry {
    alert_id: String,
    observed_at: DateTime<Utc>,
}

/// 발행된 알림의 상태
#[derive(Debug, Clone)]
struct LedgerEntry {
    title: String,
    source_ip: IpAddr,
    observed_at: DateTime<Utc>,
    is_read: bool,
}

/// 테넌트별 알림 집계
#[derive(Debug, Default)]
struct AlertTotals {
    emitted: AtomicU64,
    suppressed: AtomicU64,
}

/// 알림 분류기
///
/// 탐지 결과를 `Alert`로 변환하며, 쿨다운 기반 중복 제거와
/// 읽음/삭제 상태 관리를 제공합니다.
pub struct AlertClassifier {
    /// 쿨다운
    cooldown: TimeDelta,
    /// 추적할 최대 알림 수
    max_tracked_alerts: usize,
    /// 중복 제거 추적: (테넌트, 제목, 출발지) -> 마지막 읽지 않은 알림
    dedup: DashMap<DedupKey, DedupEntry>,
    /// 발행된 알림: (테넌트, 알림 ID) -> 상태
    ledger: DashMap<(TenantContext, String), LedgerEntry>,
    /// 테넌트별 발행/억제 알림 수
    totals: DashMap<TenantContext, AlertTotals>,
}

impl AlertClassifier {
    /// 엔진 설정으로 분류기를 생성합니다.
    pub fn new(config: &EngineConfig) -> Self {
        let cooldown = i64::try_from(config.alert_cooldown_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            cooldown,
            max_tracked_alerts: config.max_tracked_alerts,
            dedup: DashMap::new(),
            ledger: DashMap::new(),
            totals: DashMap::new(),
        }
    }

    /// 탐지 결과를 알림으로 변환합니다.
    ///
    /// 중복 제거를 통과한 경우에만 `Some(Alert)`를 반환합니다.
    pub fn classify(&self, tenant: &TenantContext, finding: &Finding) -> Option<Alert> {
        let key = (tenant.clone(), finding.title.clone(), finding.source_ip);

        // 확인과 기록을 같은 항목 잠금 안에서 수행
        let alert = match self.dedup.entry(key) {
            Entry::Occupied(mut slot) => {
                let elapsed = finding.observed_at - slot.get().observed_at;
                if elapsed < self.cooldown {
                    drop(slot);
                    self.totals
                        .entry(tenant.clone())
                        .or_default()
                        .suppressed
                        .fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(fx_metrics::ALERTS_SUPPRESSED_TOTAL).increment(1);
                    tracing::debug!(
                        tenant = %tenant,
                        title = %finding.title,
                        source = %finding.source_ip,
                        "alert suppressed by cool-down"
                    );
                    return None;
                }
                let alert = build_alert(tenant, finding);
                slot.insert(DedupEntry {
                    alert_id: alert.id.clone(),
                    observed_at: finding.observed_at,
                });
                alert
            }
            Entry::Vacant(slot) => {
                let alert = build_alert(tenant, finding);
                slot.insert(DedupEntry {
                    alert_id: alert.id.clone(),
                    observed_at: finding.observed_at,
                });
                alert
            }
        };

        self.enforce_ledger_limit(finding.observed_at);
        self.ledger.insert(
            (tenant.clone(), alert.id.clone()),
            LedgerEntry {
                title: alert.title.clone(),
                source_ip: alert.source_ip,
                observed_at: finding.observed_at,
                is_read: false,
            },
        );

        self.totals
            .entry(tenant.clone())
            .or_default()
            .emitted
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            fx_metrics::ALERTS_EMITTED_TOTAL,
            fx_metrics::LABEL_SEVERITY => alert.severity.as_str()
        )
        .increment(1);
        tracing::info!(
            tenant = %tenant,
            alert_id = %alert.id,
            severity = %alert.severity,
            title = %alert.title,
            source = %alert.source_ip,
            "alert emitted"
        );

        Some(alert)
    }

    /// 알림을 읽음 처리합니다.
    ///
    /// 읽은 알림은 같은 키의 새 알림을 더 이상 억제하지 않습니다.
    pub fn mark_read(&self, tenant: &TenantContext, alert_id: &str) -> Result<(), EngineError> {
        let (title, source_ip) = {
            let mut entry = self
                .ledger
                .get_mut(&(tenant.clone(), alert_id.to_owned()))
                .ok_or_else(|| alert_not_found(tenant, alert_id))?;
            entry.is_read = true;
            (entry.title.clone(), entry.source_ip)
        };
        self.release_dedup(tenant, title, source_ip, alert_id);
        tracing::debug!(tenant = %tenant, alert_id, "alert marked as read");
        Ok(())
    }

    /// 알림을 삭제합니다.
    pub fn dismiss(&self, tenant: &TenantContext, alert_id: &str) -> Result<(), EngineError> {
        let (_, entry) = self
            .ledger
            .remove(&(tenant.clone(), alert_id.to_owned()))
            .ok_or_else(|| alert_not_found(tenant, alert_id))?;
        self.release_dedup(tenant, entry.title, entry.source_ip, alert_id);
        tracing::debug!(tenant = %tenant, alert_id, "alert dismissed");
        Ok(())
    }

    /// 테넌트의 읽지 않은 알림 수를 반환합니다.
    pub fn unread_count(&self, tenant: &TenantContext) -> usize {
        self.ledger
            .iter()
            .filter(|e| &e.key().0 == tenant && !e.value().is_read)
            .count()
    }

    /// 만료된 추적 데이터를 정리합니다.
    ///
    /// 쿨다운이 지난 중복 제거 항목과, 쿨다운이 지난 읽은 알림을 제거합니다.
    /// 주기적으로 호출하여 메모리 성장을 방지합니다. 제거된 항목 수를 반환합니다.
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> usize {
        let expired = |observed_at: DateTime<Utc>| now - observed_at >= self.cooldown;

        let before = self.dedup.len() + self.ledger.len();
        self.dedup.retain(|_, e| !expired(e.observed_at));
        self.ledger
            .retain(|_, e| !(e.is_read && expired(e.observed_at)));
        let removed = before.saturating_sub(self.dedup.len() + self.ledger.len());

        if removed > 0 {
            tracing::debug!(removed, "alert tracking cleanup");
        }
        removed
    }

    /// 테넌트에 발행된 총 알림 수
    pub fn total_emitted(&self, tenant: &TenantContext) -> u64 {
        self.totals
            .get(tenant)
            .map_or(0, |t| t.emitted.load(Ordering::Relaxed))
    }

    /// 테넌트에서 쿨다운으로 억제된 알림 수
    pub fn total_suppressed(&self, tenant: &TenantContext) -> u64 {
        self.totals
            .get(tenant)
            .map_or(0, |t| t.suppressed.load(Ordering::Relaxed))
    }

    /// 추적 중인 알림 수
    pub fn tracked_alerts(&self) -> usize {
        self.ledger.len()
    }

    /// 중복 제거 항목이 해당 알림을 가리키면 제거합니다.
    fn release_dedup(&self, tenant: &TenantContext, title: String, source_ip: IpAddr, alert_id: &str) {
        self.dedup
            .remove_if(&(tenant.clone(), title, source_ip), |_, e| e.alert_id == alert_id);
    }

    /// 추적 알림 수의 상한을 유지합니다.
    fn enforce_ledger_limit(&self, now: DateTime<Utc>) {
        if self.ledger.len() < self.max_tracked_alerts {
            return;
        }
        self.cleanup_expired(now);

        while self.ledger.len() >= self.max_tracked_alerts {
            let oldest = self
                .ledger
                .iter()
                .min_by_key(|e| (!e.value().is_read, e.value().observed_at))
                .map(|e| e.key().clone());
            let Some(key) = oldest else { break };
            if let Some((_, entry)) = self.ledger.remove(&key) {
                self.release_dedup(&key.0, entry.title, entry.source_ip, &key.1);
            }
            tracing::warn!(
                tenant = %key.0,
                alert_id = %key.1,
                max = self.max_tracked_alerts,
                "tracked alert limit reached, oldest alert evicted"
            );
        }
    }
}

fn build_alert(tenant: &TenantContext, finding: &Finding) -> Alert {
    let matched: Vec<String> = finding.heuristics.iter().map(ToString::to_string).collect();
    Alert {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: tenant.tenant_id().to_owned(),
        severity: finding.severity,
        title: finding.title.clone(),
        description: format!(
            "Suspicious traffic from {}: {}",
            finding.source_ip,
            matched.join("; ")
        ),
        source_ip: finding.source_ip,
        is_read: false,
        created_at: Utc::now(),
    }
}

fn alert_not_found(tenant: &TenantContext, alert_id: &str) -> EngineError {
    EngineError::AlertNotFound {
        tenant_id: tenant.tenant_id().to_owned(),
        alert_id: alert_id.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{HeuristicHit, HeuristicKind, PORT_SCAN_TITLE, REPEATED_BLOCK_TITLE};
    use firewallx_core::types::Severity;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_767_225_600 + secs, 0).unwrap()
    }

    fn tenant() -> TenantContext {
        TenantContext::new("tenant-a")
    }

    fn finding(kinds: &[HeuristicKind], src: &str, at: i64) -> Finding {
        let top = kinds.iter().copied().max_by_key(|k| k.severity()).unwrap();
        Finding {
            tenant_id: "tenant-a".to_owned(),
            source_ip: src.parse().unwrap(),
            severity: top.severity(),
            title: top.title().to_owned(),
            heuristics: kinds
                .iter()
                .map(|&kind| HeuristicHit {
                    kind,
                    detail: "observed".to_owned(),
                })
                .collect(),
            observed_at: ts(at),
        }
    }

    fn repeated(src: &str, at: i64) -> Finding {
        finding(&[HeuristicKind::RepeatedBlock], src, at)
    }

    fn classifier() -> AlertClassifier {
        AlertClassifier::new(&EngineConfig::default())
    }

    #[test]
    fn first_finding_emits_alert() {
        let classifier = classifier();
        let alert = classifier.classify(&tenant(), &repeated("1.2.3.4", 0)).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.title, REPEATED_BLOCK_TITLE);
        assert_eq!(alert.tenant_id, "tenant-a");
        assert!(!alert.is_read);
        assert!(alert.description.contains("1.2.3.4"));
        assert!(alert.description.contains(REPEATED_BLOCK_TITLE));
    }

    #[test]
    fn duplicate_within_cooldown_is_suppressed() {
        let classifier = classifier();
        assert!(classifier.classify(&tenant(), &repeated("1.2.3.4", 0)).is_some());
        assert!(classifier.classify(&tenant(), &repeated("1.2.3.4", 299)).is_none());
        assert_eq!(classifier.total_emitted(&tenant()), 1);
        assert_eq!(classifier.total_suppressed(&tenant()), 1);
    }

    #[test]
    fn finding_after_cooldown_emits_again() {
        let classifier = classifier();
        assert!(classifier.classify(&tenant(), &repeated("1.2.3.4", 0)).is_some());
        assert!(classifier.classify(&tenant(), &repeated("1.2.3.4", 300)).is_some());
    }

    #[test]
    fn different_title_or_source_is_not_a_duplicate() {
        let classifier = classifier();
        assert!(classifier.classify(&tenant(), &repeated("1.2.3.4", 0)).is_some());
        assert!(classifier.classify(&tenant(), &repeated("5.6.7.8", 1)).is_some());
        let scan = finding(&[HeuristicKind::PortScan], "1.2.3.4", 2);
        let alert = classifier.classify(&tenant(), &scan).unwrap();
        assert_eq!(alert.title, PORT_SCAN_TITLE);
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[test]
    fn tenants_do_not_suppress_each_other() {
        let classifier = classifier();
        let other = TenantContext::new("tenant-b");
        assert!(classifier.classify(&tenant(), &repeated("1.2.3.4", 0)).is_some());
        assert!(classifier.classify(&other, &repeated("1.2.3.4", 1)).is_some());
        assert!(classifier.classify(&other, &repeated("1.2.3.4", 2)).is_none());

        assert_eq!(classifier.total_emitted(&tenant()), 1);
        assert_eq!(classifier.total_suppressed(&tenant()), 0);
        assert_eq!(classifier.total_suppressed(&other), 1);
        assert_eq!(classifier.total_emitted(&TenantContext::new("tenant-c")), 0);
    }

    #[test]
    fn read_alert_no_longer_suppresses() {
        let classifier = classifier();
        let alert = classifier.classify(&tenant(), &repeated("1.2.3.4", 0)).unwrap();
        assert_eq!(classifier.unread_count(&tenant()), 1);

        classifier.mark_read(&tenant(), &alert.id).unwrap();
        assert_eq!(classifier.unread_count(&tenant()), 0);
        assert!(classifier.classify(&tenant(), &repeated("1.2.3.4", 10)).is_some());
    }

    #[test]
    fn dismissed_alert_is_forgotten() {
        let classifier = classifier();
        let alert = classifier.classify(&tenant(), &repeated("1.2.3.4", 0)).unwrap();
        classifier.dismiss(&tenant(), &alert.id).unwrap();
        assert_eq!(classifier.tracked_alerts(), 0);
        assert!(classifier.classify(&tenant(), &repeated("1.2.3.4", 1)).is_some());

        let err = classifier.dismiss(&tenant(), &alert.id).unwrap_err();
        assert!(matches!(err, EngineError::AlertNotFound { .. }));
    }

    #[test]
    fn unknown_alert_cannot_be_marked_read() {
        let classifier = classifier();
        let alert = classifier.classify(&tenant(), &repeated("1.2.3.4", 0)).unwrap();
        let other = TenantContext::new("tenant-b");
        assert!(classifier.mark_read(&other, &alert.id).is_err());
        assert!(classifier.mark_read(&tenant(), "missing").is_err());
    }

    #[test]
    fn description_lists_every_heuristic() {
        let classifier = classifier();
        let f = finding(
            &[HeuristicKind::RepeatedBlock, HeuristicKind::AnomalousIcmp],
            "7.7.7.7",
            0,
        );
        let alert = classifier.classify(&tenant(), &f).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert!(alert.description.contains(REPEATED_BLOCK_TITLE));
        assert!(alert.description.contains("Anomalous ICMP traffic"));
    }

    #[test]
    fn zero_cooldown_never_suppresses() {
        let config = EngineConfig {
            alert_cooldown_secs: 0,
            ..EngineConfig::default()
        };
        let classifier = AlertClassifier::new(&config);
        assert!(classifier.classify(&tenant(), &repeated("1.2.3.4", 0)).is_some());
        assert!(classifier.classify(&tenant(), &repeated("1.2.3.4", 0)).is_some());
    }

    #[test]
    fn cleanup_removes_expired_tracking() {
        let classifier = classifier();
        let read = classifier.classify(&tenant(), &repeated("1.1.1.1", 0)).unwrap();
        classifier.classify(&tenant(), &repeated("2.2.2.2", 0)).unwrap();
        classifier.mark_read(&tenant(), &read.id).unwrap();

        classifier.cleanup_expired(ts(600));
        // 읽지 않은 알림은 남음
        assert_eq!(classifier.tracked_alerts(), 1);
        assert_eq!(classifier.unread_count(&tenant()), 1);
    }

    #[test]
    fn ledger_limit_evicts_oldest() {
        let config = EngineConfig {
            max_tracked_alerts: 2,
            ..EngineConfig::default()
        };
        let classifier = AlertClassifier::new(&config);
        classifier.classify(&tenant(), &repeated("1.1.1.1", 0)).unwrap();
        classifier.classify(&tenant(), &repeated("2.2.2.2", 1)).unwrap();
        classifier.classify(&tenant(), &repeated("3.3.3.3", 2)).unwrap();
        assert_eq!(classifier.tracked_alerts(), 2);
    }
}
