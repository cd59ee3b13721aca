//! 설정 관리 -- firewallx.toml 파싱 및 런타임 설정
//!
//! [`FirewallxConfig`]는 엔진과 CLI의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`FIREWALLX_DETECTOR_WINDOW_SECS=30` 형식)
//! 3. 설정 파일 (`firewallx.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), firewallx_core::error::FirewallxError> {
//! use firewallx_core::config::FirewallxConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = FirewallxConfig::load("firewallx.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = FirewallxConfig::parse("[alert]\ncooldown_secs = 60")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, FirewallxError};
use crate::types::Action;

/// 슬라이딩 윈도우 최대 크기 (1일)
pub const MAX_WINDOW_SECS: u64 = 86_400;
/// 포트 스캔 임계값 상한 (포트 공간 크기)
pub const MAX_PORT_SCAN_THRESHOLD: usize = 65_535;
/// 알림 쿨다운 최대값 (7일)
pub const MAX_ALERT_COOLDOWN_SECS: u64 = 86_400 * 7;
/// 파이프라인 채널 최대 용량
pub const MAX_CHANNEL_CAPACITY: usize = 1_000_000;
/// 동시 평가 최대 수
pub const MAX_IN_FLIGHT: usize = 10_000;

/// FirewallX 통합 설정
///
/// `firewallx.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirewallxConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 정책 테이블 설정
    #[serde(default)]
    pub policy: PolicyConfig,
    /// 의심 트래픽 탐지 설정
    #[serde(default)]
    pub detector: DetectorConfig,
    /// 알림 중복 제거 설정
    #[serde(default)]
    pub alert: AlertConfig,
    /// 스트리밍 파이프라인 설정
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl FirewallxConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FirewallxError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FirewallxError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FirewallxError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                FirewallxError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FirewallxError> {
        toml::from_str(toml_str).map_err(|e| {
            FirewallxError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `FIREWALLX_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "FIREWALLX_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "FIREWALLX_GENERAL_LOG_FORMAT");

        // Policy
        override_action(
            &mut self.policy.default_action,
            "FIREWALLX_POLICY_DEFAULT_ACTION",
        );
        override_string(&mut self.policy.rules_path, "FIREWALLX_POLICY_RULES_PATH");

        // Detector
        override_u64(
            &mut self.detector.window_secs,
            "FIREWALLX_DETECTOR_WINDOW_SECS",
        );
        override_usize(
            &mut self.detector.repeated_block_threshold,
            "FIREWALLX_DETECTOR_REPEATED_BLOCK_THRESHOLD",
        );
        override_usize(
            &mut self.detector.port_scan_threshold,
            "FIREWALLX_DETECTOR_PORT_SCAN_THRESHOLD",
        );
        override_u64(
            &mut self.detector.icmp_size_threshold,
            "FIREWALLX_DETECTOR_ICMP_SIZE_THRESHOLD",
        );
        override_usize(
            &mut self.detector.max_tracked_sources,
            "FIREWALLX_DETECTOR_MAX_TRACKED_SOURCES",
        );
        override_u64(
            &mut self.detector.sweep_interval_secs,
            "FIREWALLX_DETECTOR_SWEEP_INTERVAL_SECS",
        );

        // Alert
        override_u64(&mut self.alert.cooldown_secs, "FIREWALLX_ALERT_COOLDOWN_SECS");
        override_usize(
            &mut self.alert.max_tracked_alerts,
            "FIREWALLX_ALERT_MAX_TRACKED_ALERTS",
        );

        // Pipeline
        override_usize(
            &mut self.pipeline.channel_capacity,
            "FIREWALLX_PIPELINE_CHANNEL_CAPACITY",
        );
        override_usize(
            &mut self.pipeline.max_in_flight,
            "FIREWALLX_PIPELINE_MAX_IN_FLIGHT",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FirewallxError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.detector.window_secs == 0 || self.detector.window_secs > MAX_WINDOW_SECS {
            return Err(invalid(
                "detector.window_secs",
                format!("must be between 1 and {MAX_WINDOW_SECS}"),
            ));
        }
        if self.detector.repeated_block_threshold == 0 {
            return Err(invalid(
                "detector.repeated_block_threshold",
                "must be greater than 0",
            ));
        }
        if self.detector.port_scan_threshold == 0
            || self.detector.port_scan_threshold > MAX_PORT_SCAN_THRESHOLD
        {
            return Err(invalid(
                "detector.port_scan_threshold",
                format!("must be between 1 and {MAX_PORT_SCAN_THRESHOLD}"),
            ));
        }
        if self.detector.max_tracked_sources == 0 {
            return Err(invalid(
                "detector.max_tracked_sources",
                "must be greater than 0",
            ));
        }
        if self.detector.sweep_interval_secs == 0 {
            return Err(invalid(
                "detector.sweep_interval_secs",
                "must be greater than 0",
            ));
        }

        if self.alert.cooldown_secs > MAX_ALERT_COOLDOWN_SECS {
            return Err(invalid(
                "alert.cooldown_secs",
                format!("must be at most {MAX_ALERT_COOLDOWN_SECS}"),
            ));
        }
        if self.alert.max_tracked_alerts == 0 {
            return Err(invalid("alert.max_tracked_alerts", "must be greater than 0"));
        }

        if self.pipeline.channel_capacity == 0
            || self.pipeline.channel_capacity > MAX_CHANNEL_CAPACITY
        {
            return Err(invalid(
                "pipeline.channel_capacity",
                format!("must be between 1 and {MAX_CHANNEL_CAPACITY}"),
            ));
        }
        if self.pipeline.max_in_flight == 0 || self.pipeline.max_in_flight > MAX_IN_FLIGHT {
            return Err(invalid(
                "pipeline.max_in_flight",
                format!("must be between 1 and {MAX_IN_FLIGHT}"),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> FirewallxError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 정책 테이블 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// 매칭 규칙이 없을 때 적용할 동작
    pub default_action: Action,
    /// 규칙 파일 경로 (TOML 또는 YAML, 비어 있으면 규칙 없이 시작)
    pub rules_path: String,
}

/// 의심 트래픽 탐지 설정
///
/// 임계값은 기본값일 뿐이며 운영 환경에 맞게 조정합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// 슬라이딩 윈도우 크기 (초)
    pub window_secs: u64,
    /// 윈도우 내 차단 횟수가 이 값을 초과하면 탐지
    pub repeated_block_threshold: usize,
    /// 윈도우 내 고유 목적지 포트 수가 이 값을 초과하면 탐지
    pub port_scan_threshold: usize,
    /// ICMP 패킷 크기가 이 값을 초과하면 탐지 (바이트)
    pub icmp_size_threshold: u64,
    /// 추적할 최대 출발지 수
    pub max_tracked_sources: usize,
    /// 만료 카운터 정리 주기 (초)
    pub sweep_interval_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            repeated_block_threshold: 10,
            port_scan_threshold: 20,
            icmp_size_threshold: 1024,
            max_tracked_sources: 100_000,
            sweep_interval_secs: 30,
        }
    }
}

/// 알림 중복 제거 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// 같은 (제목, 출발지) 알림 사이의 최소 간격 (초)
    pub cooldown_secs: u64,
    /// 중복 제거를 위해 추적할 최대 알림 수
    pub max_tracked_alerts: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            max_tracked_alerts: 100_000,
        }
    }
}

/// 스트리밍 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 입력/출력 채널 용량
    pub channel_capacity: usize,
    /// 동시에 평가할 최대 패킷 수
    pub max_in_flight: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 4096,
            max_in_flight: 64,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_action(target: &mut Action, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match Action::from_str_loose(&val) {
            Some(parsed) => *target = parsed,
            None => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse action from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = FirewallxConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.policy.default_action, Action::Allow);
        assert_eq!(config.detector.window_secs, 60);
        assert_eq!(config.detector.repeated_block_threshold, 10);
        assert_eq!(config.detector.icmp_size_threshold, 1024);
        assert_eq!(config.alert.cooldown_secs, 300);
    }

    #[test]
    fn default_config_passes_validation() {
        FirewallxConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = FirewallxConfig::parse("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.pipeline.max_in_flight, 64);
    }

    #[test]
    fn partial_toml_merges_with_defaults() {
        let config = FirewallxConfig::parse(
            r#"
[policy]
default_action = "block"

[detector]
window_secs = 30
"#,
        )
        .unwrap();
        assert_eq!(config.policy.default_action, Action::Block);
        assert_eq!(config.detector.window_secs, 30);
        assert_eq!(config.detector.port_scan_threshold, 20);
        assert_eq!(config.alert.cooldown_secs, 300);
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let err = FirewallxConfig::parse("[policy\ndefault_action = ").unwrap_err();
        assert!(matches!(
            err,
            FirewallxError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn unknown_default_action_fails_to_parse() {
        let err = FirewallxConfig::parse("[policy]\ndefault_action = \"drop\"").unwrap_err();
        assert!(matches!(
            err,
            FirewallxError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = FirewallxConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("general.log_level"));
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut config = FirewallxConfig::default();
        config.detector.window_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("detector.window_secs"));
    }

    #[test]
    fn validate_rejects_values_above_upper_bounds() {
        let config = FirewallxConfig::parse("[detector]\nwindow_secs = 100000").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("detector.window_secs"));

        let mut config = FirewallxConfig::default();
        config.detector.port_scan_threshold = MAX_PORT_SCAN_THRESHOLD + 1;
        assert!(config.validate().is_err());

        let mut config = FirewallxConfig::default();
        config.alert.cooldown_secs = MAX_ALERT_COOLDOWN_SECS + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("alert.cooldown_secs"));

        let mut config = FirewallxConfig::default();
        config.detector.window_secs = MAX_WINDOW_SECS;
        config.alert.cooldown_secs = MAX_ALERT_COOLDOWN_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_in_flight() {
        let mut config = FirewallxConfig::default();
        config.pipeline.max_in_flight = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_override_u64() {
        let mut val = 60u64;
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_FIREWALLX_U64", "15") };
        override_u64(&mut val, "TEST_FIREWALLX_U64");
        assert_eq!(val, 15);
        unsafe { std::env::remove_var("TEST_FIREWALLX_U64") };
    }

    #[test]
    #[serial]
    fn env_override_usize_invalid_keeps_original() {
        let mut val = 10usize;
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_FIREWALLX_USIZE_BAD", "ten") };
        override_usize(&mut val, "TEST_FIREWALLX_USIZE_BAD");
        assert_eq!(val, 10);
        unsafe { std::env::remove_var("TEST_FIREWALLX_USIZE_BAD") };
    }

    #[test]
    #[serial]
    fn env_override_action() {
        let mut val = Action::Allow;
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_FIREWALLX_ACTION", "BLOCK") };
        override_action(&mut val, "TEST_FIREWALLX_ACTION");
        assert_eq!(val, Action::Block);
        unsafe { std::env::set_var("TEST_FIREWALLX_ACTION", "reject") };
        override_action(&mut val, "TEST_FIREWALLX_ACTION");
        assert_eq!(val, Action::Block);
        unsafe { std::env::remove_var("TEST_FIREWALLX_ACTION") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_FIREWALLX_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = FirewallxConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = FirewallxConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(config.detector.window_secs, parsed.detector.window_secs);
        assert_eq!(config.policy.default_action, parsed.policy.default_action);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = FirewallxConfig::from_file("/nonexistent/path/firewallx.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FirewallxError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
