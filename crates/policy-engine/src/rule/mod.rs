//! 정책 테이블 -- 우선순위 기반 first-match 규칙 평가
//!
//! 테넌트별 규칙 집합을 `(priority 오름차순, 생성 순서 오름차순)`으로 정렬해 두고,
//! 패킷마다 처음으로 매칭되는 규칙의 동작을 결정으로 반환합니다.
//! 매칭되는 규칙이 없으면 설정된 기본 동작(기본값: `allow`)이 적용됩니다.
//!
//! # 동시성
//! 규칙 집합은 불변 [`PolicySnapshot`]으로 게시됩니다. 평가 경로는 현재 스냅샷의
//! `Arc`만 복제해 사용하고, 변경(교체/추가/수정/삭제/활성화 토글)은 새 스냅샷을
//! 만든 뒤 한 번에 교체합니다. 평가 중인 패킷은 절반만 갱신된 테이블을 보지 않습니다.
//!
//! # 아키텍처
//! - [`PolicyTable`]: 테넌트별 스냅샷 관리 및 원자적 교체
//! - [`loader`]: TOML/YAML 규칙 파일 로딩
//! - [`matcher`]: 패턴 컴파일 및 패킷 매칭
//! - [`pattern`]: 주소/포트 패턴 파싱
//! - [`types`]: 규칙 데이터 구조 정의

pub mod loader;
pub mod matcher;
pub mod pattern;
pub mod types;

pub use loader::RuleLoader;
pub use matcher::CompiledRule;
pub use pattern::{AddressPattern, PatternError, PortItem, PortPattern};
pub use types::FirewallRule;

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use firewallx_core::error::RuleValidationError;
use firewallx_core::metrics as fx_metrics;
use firewallx_core::types::{Action, Decision, Packet, TenantContext};

use crate::error::EngineError;

/// 저장된 규칙과 생성 순서
#[derive(Debug, Clone)]
struct RuleEntry {
    rule: FirewallRule,
    sequence: u64,
}

/// 정책 스냅샷 -- 한 시점의 불변 규칙 집합
///
/// 검증에 실패한 규칙도 보관되지만(관리 인터페이스에서 수정할 수 있도록)
/// 평가 대상에서는 제외됩니다.
#[derive(Debug)]
pub struct PolicySnapshot {
    version: u64,
    default_action: Action,
    /// 저장된 전체 규칙 (평가 순서로 정렬)
    entries: Vec<RuleEntry>,
    /// 유효한 규칙 (평가 순서로 정렬)
    compiled: Vec<CompiledRule>,
    /// 검증에 실패한 규칙의 에러
    invalid: Vec<RuleValidationError>,
    next_sequence: u64,
}

impl PolicySnapshot {
    fn empty(default_action: Action) -> Self {
        Self {
            version: 0,
            default_action,
            entries: Vec::new(),
            compiled: Vec::new(),
            invalid: Vec::new(),
            next_sequence: 0,
        }
    }

    fn build(
        version: u64,
        default_action: Action,
        mut entries: Vec<RuleEntry>,
        next_sequence: u64,
    ) -> Self {
        entries.sort_by_key(|e| (e.rule.priority, e.sequence));

        let mut compiled = Vec::with_capacity(entries.len());
        let mut invalid = Vec::new();
        for entry in &entries {
            match CompiledRule::compile(entry.rule.clone(), entry.sequence) {
                Ok(rule) => compiled.push(rule),
                Err(e) => invalid.push(e),
            }
        }

        Self {
            version,
            default_action,
            entries,
            compiled,
            invalid,
            next_sequence,
        }
    }

    /// 패킷에 대한 결정을 계산합니다.
    ///
    /// 정렬된 규칙을 순서대로 확인하여 첫 번째 매칭 규칙의 동작을 반환합니다.
    pub fn resolve(&self, packet: Packet) -> Decision {
        // 규칙 수에 비례하는 선형 탐색. 규칙이 수천 개 규모가 되면
        // 프로토콜/포트 버킷이나 CIDR trie 인덱스를 여기에 도입합니다.
        match self.compiled.iter().find(|rule| rule.matches(&packet)) {
            Some(rule) => Decision {
                action: rule.action(),
                rule_id: Some(rule.id().to_owned()),
                packet,
            },
            None => Decision {
                action: self.default_action,
                rule_id: None,
                packet,
            },
        }
    }

    /// 스냅샷 버전 (게시될 때마다 증가)
    pub fn version(&self) -> u64 {
        self.version
    }

    /// 기본 동작
    pub fn default_action(&self) -> Action {
        self.default_action
    }

    /// 저장된 전체 규칙을 평가 순서로 반환합니다.
    pub fn rules(&self) -> impl Iterator<Item = &FirewallRule> {
        self.entries.iter().map(|e| &e.rule)
    }

    /// 평가 대상 규칙을 평가 순서로 반환합니다.
    pub fn compiled_rules(&self) -> &[CompiledRule] {
        &self.compiled
    }

    /// 검증에 실패한 규칙의 에러 목록
    pub fn validation_errors(&self) -> &[RuleValidationError] {
        &self.invalid
    }

    /// 저장된 규칙 수
    pub fn rule_count(&self) -> usize {
        self.entries.len()
    }

    /// 활성(유효하고 활성화된) 규칙 수
    pub fn active_rule_count(&self) -> usize {
        self.compiled.iter().filter(|r| r.rule().enabled).count()
    }

    /// 해당 ID의 규칙이 있는지 확인합니다.
    pub fn contains(&self, rule_id: &str) -> bool {
        self.entries.iter().any(|e| e.rule.id == rule_id)
    }
}

/// 규칙 갱신 결과
///
/// 갱신은 배치 전체가 거부되지 않습니다. 잘못된 규칙은 에러로 보고되고
/// 어떤 패킷에도 매칭되지 않습니다.
#[derive(Debug, Clone, Serialize)]
pub struct RuleUpdateReport {
    /// 테넌트 ID
    pub tenant_id: String,
    /// 게시된 스냅샷 버전
    pub version: u64,
    /// 저장된 규칙 수
    pub total_rules: usize,
    /// 활성 규칙 수
    pub active_rules: usize,
    /// 이번 갱신에서 발견된 규칙 검증 에러
    pub errors: Vec<RuleValidationError>,
}

impl RuleUpdateReport {
    /// 검증 에러가 없는지 확인합니다.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// 정책 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PolicyStats {
    /// 저장된 규칙 수
    pub total_rules: usize,
    /// 활성 규칙 수
    pub active_rules: usize,
    /// 검증에 실패한 규칙 수
    pub invalid_rules: usize,
    /// 현재 스냅샷 버전
    pub version: u64,
}

/// 스냅샷 변경 내용
struct Change<T> {
    entries: Vec<RuleEntry>,
    next_sequence: u64,
    output: T,
}

/// 정책 테이블 -- 테넌트별 규칙 스냅샷 관리
pub struct PolicyTable {
    snapshots: DashMap<TenantContext, Arc<PolicySnapshot>>,
    empty: Arc<PolicySnapshot>,
    default_action: Action,
    version: AtomicU64,
    active_rules: AtomicI64,
}

impl PolicyTable {
    /// 새 정책 테이블을 생성합니다.
    pub fn new(default_action: Action) -> Self {
        Self {
            snapshots: DashMap::new(),
            empty: Arc::new(PolicySnapshot::empty(default_action)),
            default_action,
            version: AtomicU64::new(0),
            active_rules: AtomicI64::new(0),
        }
    }

    /// 기본 동작을 반환합니다.
    pub fn default_action(&self) -> Action {
        self.default_action
    }

    /// 테넌트의 현재 스냅샷을 반환합니다.
    ///
    /// 규칙이 한 번도 설정되지 않은 테넌트는 빈 스냅샷(기본 동작만 적용)을 받습니다.
    pub fn snapshot(&self, tenant: &TenantContext) -> Arc<PolicySnapshot> {
        self.snapshots
            .get(tenant)
            .map(|s| Arc::clone(s.value()))
            .unwrap_or_else(|| Arc::clone(&self.empty))
    }

    /// 패킷에 대한 결정을 계산합니다.
    pub fn resolve(&self, tenant: &TenantContext, packet: Packet) -> Decision {
        self.snapshot(tenant).resolve(packet)
    }

    /// 테넌트의 규칙 집합을 원자적으로 교체합니다.
    ///
    /// 전달된 순서가 생성 순서가 됩니다. 같은 ID가 다시 나오면 뒤의 정의는
    /// 건너뛰고 에러로 보고합니다.
    pub fn update_rules(
        &self,
        tenant: &TenantContext,
        rules: Vec<FirewallRule>,
    ) -> RuleUpdateReport {
        let mut duplicates = Vec::new();
        let mut seen = HashSet::with_capacity(rules.len());
        let mut entries = Vec::with_capacity(rules.len());

        for rule in rules {
            if !seen.insert(rule.id.clone()) {
                duplicates.push(RuleValidationError::new(
                    rule.id,
                    "id",
                    "duplicate rule id, later definition skipped",
                ));
                continue;
            }
            let sequence = entries.len() as u64;
            entries.push(RuleEntry { rule, sequence });
        }
        let next_sequence = entries.len() as u64;

        let Ok((snapshot, ())) = self.modify::<(), Infallible>(tenant, |_| {
            Ok(Change {
                entries,
                next_sequence,
                output: (),
            })
        });
        self.report(tenant, &snapshot, |_| true, duplicates)
    }

    /// 규칙 하나를 추가합니다. 새 규칙은 가장 늦은 생성 순서를 받습니다.
    pub fn insert_rule(
        &self,
        tenant: &TenantContext,
        rule: FirewallRule,
    ) -> Result<RuleUpdateReport, EngineError> {
        let rule_id = rule.id.clone();
        let (snapshot, ()) = self.modify::<_, EngineError>(tenant, |current| {
            if current.contains(&rule.id) {
                return Err(EngineError::DuplicateRule {
                    tenant_id: tenant.tenant_id().to_owned(),
                    rule_id: rule.id.clone(),
                });
            }
            let mut entries = current.entries.clone();
            entries.push(RuleEntry {
                rule,
                sequence: current.next_sequence,
            });
            Ok(Change {
                entries,
                next_sequence: current.next_sequence + 1,
                output: (),
            })
        })?;
        Ok(self.report(tenant, &snapshot, |id| id == rule_id, Vec::new()))
    }

    /// 같은 ID의 규칙을 교체합니다. 생성 순서는 유지됩니다.
    pub fn replace_rule(
        &self,
        tenant: &TenantContext,
        rule: FirewallRule,
    ) -> Result<RuleUpdateReport, EngineError> {
        let rule_id = rule.id.clone();
        let (snapshot, ()) = self.modify::<_, EngineError>(tenant, |current| {
            let mut entries = current.entries.clone();
            let slot = entries
                .iter_mut()
                .find(|e| e.rule.id == rule.id)
                .ok_or_else(|| EngineError::RuleNotFound {
                    tenant_id: tenant.tenant_id().to_owned(),
                    rule_id: rule.id.clone(),
                })?;
            slot.rule = rule;
            Ok(Change {
                entries,
                next_sequence: current.next_sequence,
                output: (),
            })
        })?;
        Ok(self.report(tenant, &snapshot, |id| id == rule_id, Vec::new()))
    }

    /// 규칙을 삭제하고 삭제된 규칙을 반환합니다.
    pub fn remove_rule(
        &self,
        tenant: &TenantContext,
        rule_id: &str,
    ) -> Result<FirewallRule, EngineError> {
        let (_, removed) = self.modify::<_, EngineError>(tenant, |current| {
            let mut entries = current.entries.clone();
            let idx = entries
                .iter()
                .position(|e| e.rule.id == rule_id)
                .ok_or_else(|| EngineError::RuleNotFound {
                    tenant_id: tenant.tenant_id().to_owned(),
                    rule_id: rule_id.to_owned(),
                })?;
            let removed = entries.remove(idx);
            Ok(Change {
                entries,
                next_sequence: current.next_sequence,
                output: removed.rule,
            })
        })?;
        Ok(removed)
    }

    /// 규칙의 활성화 여부를 변경합니다.
    pub fn set_rule_enabled(
        &self,
        tenant: &TenantContext,
        rule_id: &str,
        enabled: bool,
    ) -> Result<(), EngineError> {
        self.modify::<_, EngineError>(tenant, |current| {
            let mut entries = current.entries.clone();
            let slot = entries
                .iter_mut()
                .find(|e| e.rule.id == rule_id)
                .ok_or_else(|| EngineError::RuleNotFound {
                    tenant_id: tenant.tenant_id().to_owned(),
                    rule_id: rule_id.to_owned(),
                })?;
            slot.rule.enabled = enabled;
            Ok(Change {
                entries,
                next_sequence: current.next_sequence,
                output: (),
            })
        })?;
        Ok(())
    }

    /// 테넌트의 규칙을 평가 순서로 반환합니다.
    pub fn rules(&self, tenant: &TenantContext) -> Vec<FirewallRule> {
        self.snapshot(tenant).rules().cloned().collect()
    }

    /// 테넌트의 정책 통계를 반환합니다.
    pub fn stats(&self, tenant: &TenantContext) -> PolicyStats {
        let snapshot = self.snapshot(tenant);
        PolicyStats {
            total_rules: snapshot.rule_count(),
            active_rules: snapshot.active_rule_count(),
            invalid_rules: snapshot.validation_errors().len(),
            version: snapshot.version(),
        }
    }

    /// 현재 스냅샷을 읽고 새 스냅샷을 만들어 교체합니다.
    ///
    /// 테넌트 항목의 쓰기 잠금을 잡은 채로 읽기-수정-쓰기를 수행하므로
    /// 같은 테넌트에 대한 동시 변경이 서로를 덮어쓰지 않습니다.
    fn modify<T, E>(
        &self,
        tenant: &TenantContext,
        f: impl FnOnce(&PolicySnapshot) -> Result<Change<T>, E>,
    ) -> Result<(Arc<PolicySnapshot>, T), E> {
        let mut slot = self
            .snapshots
            .entry(tenant.clone())
            .or_insert_with(|| Arc::clone(&self.empty));
        let current = Arc::clone(slot.value());
        let change = f(&current)?;

        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        let next = Arc::new(PolicySnapshot::build(
            version,
            self.default_action,
            change.entries,
            change.next_sequence,
        ));
        *slot.value_mut() = Arc::clone(&next);
        drop(slot);

        let delta = next.active_rule_count() as i64 - current.active_rule_count() as i64;
        let active = self.active_rules.fetch_add(delta, Ordering::Relaxed) + delta;
        metrics::gauge!(fx_metrics::RULES_ACTIVE).set(active as f64);

        tracing::info!(
            tenant = %tenant,
            version,
            total = next.rule_count(),
            active = next.active_rule_count(),
            invalid = next.validation_errors().len(),
            "policy table swapped"
        );

        Ok((next, change.output))
    }

    /// 갱신 결과를 만들고 해당 규칙의 검증 에러를 한 번 보고합니다.
    fn report(
        &self,
        tenant: &TenantContext,
        snapshot: &PolicySnapshot,
        touched: impl Fn(&str) -> bool,
        mut errors: Vec<RuleValidationError>,
    ) -> RuleUpdateReport {
        errors.extend(
            snapshot
                .validation_errors()
                .iter()
                .filter(|e| touched(&e.rule_id))
                .cloned(),
        );

        for err in &errors {
            tracing::warn!(
                tenant = %tenant,
                rule_id = %err.rule_id,
                field = %err.field,
                reason = %err.reason,
                "rule excluded from policy table"
            );
        }
        if !errors.is_empty() {
            metrics::counter!(fx_metrics::RULE_VALIDATION_ERRORS_TOTAL)
                .increment(errors.len() as u64);
        }

        RuleUpdateReport {
            tenant_id: tenant.tenant_id().to_owned(),
            version: snapshot.version(),
            total_rules: snapshot.rule_count(),
            active_rules: snapshot.active_rule_count(),
            errors,
        }
    }
}
