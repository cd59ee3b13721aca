//! 규칙 파일 로더 -- TOML/YAML 규칙 파일을 디스크에서 로드합니다.
//!
//! 파일 형식은 확장자로 결정합니다 (`.toml`, `.yml`, `.yaml`).
//! 두 형식 모두 최상위 `rules` 목록을 가지며, 목록 순서가 규칙의 생성 순서가 됩니다.
//!
//! 로더는 파일 구조만 검증합니다. 패턴 검증은 정책 테이블 갱신 시점에 수행되어
//! 잘못된 규칙 하나가 파일 전체를 거부하지 않습니다.

use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;

use super::types::FirewallRule;

/// 규칙 파일 로더 설정
const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_RULES_COUNT: usize = 10_000;

/// 규칙 파일의 최상위 구조
#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<FirewallRule>,
}

/// 규칙 파일 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFormat {
    /// TOML (`[[rules]]` 배열)
    Toml,
    /// YAML (`rules:` 목록)
    Yaml,
}

impl RuleFormat {
    /// 파일 확장자에서 형식을 결정합니다.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "yml" | "yaml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 규칙 파일을 로드합니다.
    ///
    /// # Errors
    /// - 지원하지 않는 확장자
    /// - 파일 크기가 `MAX_RULE_FILE_SIZE`를 초과하는 경우
    /// - 파싱 실패 또는 규칙 수가 `MAX_RULES_COUNT`를 초과하는 경우
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Vec<FirewallRule>, EngineError> {
        let path = path.as_ref();
        let source = path.display().to_string();

        let format = RuleFormat::from_path(path).ok_or_else(|| EngineError::RuleLoad {
            path: source.clone(),
            reason: "unsupported extension (expected .toml, .yml or .yaml)".to_owned(),
        })?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| EngineError::RuleLoad {
                path: source.clone(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(EngineError::RuleLoad {
                path: source,
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::RuleLoad {
                path: source.clone(),
                reason: format!("failed to read file: {e}"),
            })?;

        let rules = Self::parse(&content, format, &source)?;

        tracing::info!(
            path = %source,
            count = rules.len(),
            "loaded firewall rules"
        );

        Ok(rules)
    }

    /// 문자열을 지정한 형식으로 파싱합니다.
    pub fn parse(
        content: &str,
        format: RuleFormat,
        source: &str,
    ) -> Result<Vec<FirewallRule>, EngineError> {
        match format {
            RuleFormat::Toml => Self::parse_toml(content, source),
            RuleFormat::Yaml => Self::parse_yaml(content, source),
        }
    }

    /// TOML 문자열을 파싱하여 규칙 목록을 생성합니다.
    pub fn parse_toml(toml_str: &str, source: &str) -> Result<Vec<FirewallRule>, EngineError> {
        let file: RuleFile = toml::from_str(toml_str).map_err(|e| EngineError::RuleLoad {
            path: source.to_owned(),
            reason: format!("TOML parse error: {e}"),
        })?;
        Self::check_count(file.rules, source)
    }

    /// YAML 문자열을 파싱하여 규칙 목록을 생성합니다.
    ///
    /// 빈 문서는 규칙이 없는 것으로 취급합니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<Vec<FirewallRule>, EngineError> {
        if yaml_str.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: RuleFile = serde_yaml::from_str(yaml_str).map_err(|e| EngineError::RuleLoad {
            path: source.to_owned(),
            reason: format!("YAML parse error: {e}"),
        })?;
        Self::check_count(file.rules, source)
    }

    fn check_count(rules: Vec<FirewallRule>, source: &str) -> Result<Vec<FirewallRule>, EngineError> {
        if rules.len() > MAX_RULES_COUNT {
            return Err(EngineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("too many rules: {} (max {MAX_RULES_COUNT})", rules.len()),
            });
        }
        Ok(rules)
    }
}
