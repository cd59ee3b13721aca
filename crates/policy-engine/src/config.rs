//! 정책 엔진 설정
//!
//! [`EngineConfig`]는 core의 [`FirewallxConfig`](firewallx_core::config::FirewallxConfig)
//! 중 엔진이 사용하는 섹션(policy, detector, alert, pipeline)을 평탄화한 설정입니다.
//!
//! # 사용 예시
//! ```ignore
//! use firewallx_core::config::FirewallxConfig;
//! use firewallx_engine::config::EngineConfig;
//!
//! let core_config = FirewallxConfig::default();
//! let config = EngineConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use firewallx_core::config::{
    FirewallxConfig, MAX_ALERT_COOLDOWN_SECS, MAX_CHANNEL_CAPACITY, MAX_IN_FLIGHT,
    MAX_PORT_SCAN_THRESHOLD, MAX_WINDOW_SECS,
};
use firewallx_core::types::Action;

use crate::error::EngineError;

/// 정책 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 매칭 규칙이 없을 때 적용할 동작
    pub default_action: Action,
    /// 탐지 슬라이딩 윈도우 (초)
    pub window_secs: u64,
    /// 반복 차단 임계값 (초과 시 탐지)
    pub repeated_block_threshold: usize,
    /// 포트 스캔 임계값 (고유 포트 수 초과 시 탐지)
    pub port_scan_threshold: usize,
    /// ICMP 크기 임계값 (바이트, 초과 시 탐지)
    pub icmp_size_threshold: u64,
    /// 추적할 최대 출발지 수
    pub max_tracked_sources: usize,
    /// 만료 상태 정리 주기 (초)
    pub sweep_interval_secs: u64,
    /// 알림 쿨다운 (초)
    pub alert_cooldown_secs: u64,
    /// 중복 제거를 위해 추적할 최대 알림 수
    pub max_tracked_alerts: usize,
    /// 입력/출력 채널 용량
    pub channel_capacity: usize,
    /// 동시에 평가할 최대 패킷 수
    pub max_in_flight: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_core(&FirewallxConfig::default())
    }
}

impl EngineConfig {
    /// core 설정에서 엔진 설정을 생성합니다.
    pub fn from_core(core: &FirewallxConfig) -> Self {
        Self {
            default_action: core.policy.default_action,
            window_secs: core.detector.window_secs,
            repeated_block_threshold: core.detector.repeated_block_threshold,
            port_scan_threshold: core.detector.port_scan_threshold,
            icmp_size_threshold: core.detector.icmp_size_threshold,
            max_tracked_sources: core.detector.max_tracked_sources,
            sweep_interval_secs: core.detector.sweep_interval_secs,
            alert_cooldown_secs: core.alert.cooldown_secs,
            max_tracked_alerts: core.alert.max_tracked_alerts,
            channel_capacity: core.pipeline.channel_capacity,
            max_in_flight: core.pipeline.max_in_flight,
        }
    }

    /// 탐지 윈도우를 `Duration`으로 반환합니다.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// 알림 쿨다운을 `Duration`으로 반환합니다.
    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    /// 정리 주기를 `Duration`으로 반환합니다.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.window_secs == 0 || self.window_secs > MAX_WINDOW_SECS {
            return Err(config_err(
                "window_secs",
                format!("must be 1-{MAX_WINDOW_SECS}"),
            ));
        }

        if self.repeated_block_threshold == 0 {
            return Err(config_err(
                "repeated_block_threshold",
                "must be greater than 0",
            ));
        }

        if self.port_scan_threshold == 0 || self.port_scan_threshold > MAX_PORT_SCAN_THRESHOLD {
            return Err(config_err(
                "port_scan_threshold",
                format!("must be 1-{MAX_PORT_SCAN_THRESHOLD}"),
            ));
        }

        if self.max_tracked_sources == 0 {
            return Err(config_err("max_tracked_sources", "must be greater than 0"));
        }

        if self.sweep_interval_secs == 0 {
            return Err(config_err("sweep_interval_secs", "must be greater than 0"));
        }

        if self.alert_cooldown_secs > MAX_ALERT_COOLDOWN_SECS {
            return Err(config_err(
                "alert_cooldown_secs",
                format!("must be at most {MAX_ALERT_COOLDOWN_SECS}"),
            ));
        }

        if self.max_tracked_alerts == 0 {
            return Err(config_err("max_tracked_alerts", "must be greater than 0"));
        }

        if self.channel_capacity == 0 || self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(config_err(
                "channel_capacity",
                format!("must be 1-{MAX_CHANNEL_CAPACITY}"),
            ));
        }

        if self.max_in_flight == 0 || self.max_in_flight > MAX_IN_FLIGHT {
            return Err(config_err(
                "max_in_flight",
                format!("must be 1-{MAX_IN_FLIGHT}"),
            ));
        }

        Ok(())
    }
}

fn config_err(field: &str, reason: impl Into<String>) -> EngineError {
    EngineError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 엔진 설정 빌더
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 동작을 설정합니다.
    pub fn default_action(mut self, action: Action) -> Self {
        self.config.default_action = action;
        self
    }

    /// 탐지 윈도우(초)를 설정합니다.
    pub fn window_secs(mut self, secs: u64) -> Self {
        self.config.window_secs = secs;
        self
    }

    /// 반복 차단 임계값을 설정합니다.
    pub fn repeated_block_threshold(mut self, threshold: usize) -> Self {
        self.config.repeated_block_threshold = threshold;
        self
    }

    /// 포트 스캔 임계값을 설정합니다.
    pub fn port_scan_threshold(mut self, threshold: usize) -> Self {
        self.config.port_scan_threshold = threshold;
        self
    }

    /// ICMP 크기 임계값을 설정합니다.
    pub fn icmp_size_threshold(mut self, bytes: u64) -> Self {
        self.config.icmp_size_threshold = bytes;
        self
    }

    /// 추적할 최대 출발지 수를 설정합니다.
    pub fn max_tracked_sources(mut self, max: usize) -> Self {
        self.config.max_tracked_sources = max;
        self
    }

    /// 알림 쿨다운(초)을 설정합니다.
    pub fn alert_cooldown_secs(mut self, secs: u64) -> Self {
        self.config.alert_cooldown_secs = secs;
        self
    }

    /// 채널 용량을 설정합니다.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// 최대 동시 평가 수를 설정합니다.
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.config.max_in_flight = max;
        self
    }

    /// 설정을 검증하고 `EngineConfig`를 생성합니다.
    pub fn build(self) -> Result<EngineConfig, EngineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
