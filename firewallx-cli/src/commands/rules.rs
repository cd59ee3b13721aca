//! `firewallx rules` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use firewallx_core::types::{Action, TenantContext};
use firewallx_engine::{FirewallRule, PolicyTable, RuleLoader};

use crate::cli::{RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(args: RulesArgs, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        RulesAction::List { path, enabled_only } => {
            let report = build_list_report(&path, enabled_only).await?;
            writer.render(&report)?;
            Ok(())
        }
        RulesAction::Validate { path } => {
            let report = build_validation_report(&path).await;
            writer.render(&report)?;
            if !report.is_valid() {
                return Err(CliError::Rule(format!(
                    "{} invalid rules in {}",
                    report.invalid,
                    path.display()
                )));
            }
            Ok(())
        }
    }
}

/// Load a rule file and list its rules in evaluation order.
pub async fn build_list_report(path: &Path, enabled_only: bool) -> Result<RuleListReport, CliError> {
    info!(path = %path.display(), "loading firewall rules");
    let mut rules = RuleLoader::load_file(path).await?;

    // stable sort keeps file order for equal priorities
    rules.sort_by_key(|r| r.priority);
    if enabled_only {
        rules.retain(|r| r.enabled);
    }

    Ok(RuleListReport {
        path: path.display().to_string(),
        total: rules.len(),
        rules: rules.into_iter().map(RuleEntry::from).collect(),
    })
}

/// Load a rule file and compile every rule, collecting all failures.
///
/// A file that cannot be read or parsed is reported as a single error
/// instead of failing the command before anything is rendered.
pub async fn build_validation_report(path: &Path) -> RuleValidationReport {
    info!(path = %path.display(), "validating firewall rules");

    let rules = match RuleLoader::load_file(path).await {
        Ok(rules) => rules,
        Err(e) => {
            return RuleValidationReport {
                path: path.display().to_string(),
                total: 0,
                valid: 0,
                invalid: 1,
                errors: vec![RuleError {
                    rule_id: None,
                    field: None,
                    error: e.to_string(),
                }],
            };
        }
    };

    let total = rules.len();
    let tenant = TenantContext::new("validate");
    let table = PolicyTable::new(Action::Allow);
    let update = table.update_rules(&tenant, rules);
    // Duplicate ids are skipped before compiling, so only stored rules can be valid.
    let compile_failures = table.snapshot(&tenant).validation_errors().len();

    RuleValidationReport {
        path: path.display().to_string(),
        total,
        valid: update.total_rules.saturating_sub(compile_failures),
        invalid: update.errors.len(),
        errors: update
            .errors
            .into_iter()
            .map(|e| RuleError {
                rule_id: Some(e.rule_id),
                field: Some(e.field),
                error: e.reason,
            })
            .collect(),
    }
}

#[derive(Serialize)]
pub struct RuleListReport {
    pub path: String,
    pub total: usize,
    pub rules: Vec<RuleEntry>,
}

#[derive(Serialize)]
pub struct RuleEntry {
    pub id: String,
    pub name: String,
    pub action: Action,
    pub source: String,
    pub destination: String,
    pub port: String,
    pub protocol: String,
    pub priority: i32,
    pub enabled: bool,
}

impl From<FirewallRule> for RuleEntry {
    fn from(r: FirewallRule) -> Self {
        Self {
            id: r.id,
            name: r.name,
            action: r.action,
            source: r.source,
            destination: r.destination,
            port: r.port,
            protocol: r.protocol,
            priority: r.priority,
            enabled: r.enabled,
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Firewall Rules: {} ({} total)",
            self.path.bold(),
            self.total.to_string().bold()
        )?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<8} {:<20} {:<7} {:<18} {:<18} {:<12} {:<6} Status",
            "Priority", "ID", "Action", "Source", "Destination", "Port", "Proto"
        )?;
        writeln!(w, "{}", "-".repeat(100))?;

        for r in &self.rules {
            let action = match r.action {
                Action::Allow => r.action.as_str().green(),
                Action::Block => r.action.as_str().red(),
            };
            let status = if r.enabled {
                "enabled".green()
            } else {
                "disabled".yellow()
            };

            writeln!(
                w,
                "{:<8} {:<20} {:<7} {:<18} {:<18} {:<12} {:<6} {}",
                r.priority, r.id, action, r.source, r.destination, r.port, r.protocol, status
            )?;
        }

        Ok(())
    }
}

#[derive(Serialize)]
pub struct RuleValidationReport {
    pub path: String,
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<RuleError>,
}

impl RuleValidationReport {
    /// True when the file loaded and every rule compiled.
    pub fn is_valid(&self) -> bool {
        self.invalid == 0
    }
}

#[derive(Serialize)]
pub struct RuleError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub error: String,
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.path.bold())?;
        writeln!(
            w,
            "  Rules: {} total, {} valid, {} invalid",
            self.total,
            self.valid.to_string().green(),
            if self.invalid > 0 {
                self.invalid.to_string().red()
            } else {
                self.invalid.to_string().normal()
            }
        )?;

        if !self.errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "Errors:")?;
            for e in &self.errors {
                match (&e.rule_id, &e.field) {
                    (Some(id), Some(field)) => {
                        writeln!(w, "  {} ({}): {}", id.red(), field, e.error)?;
                    }
                    _ => writeln!(w, "  {}", e.error.red())?,
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES_YAML: &str = r#"
rules:
  - id: allow-dns
    action: allow
    port: 53
    protocol: udp
    priority: 50
  - id: block-admin
    action: block
    destination: 10.0.0.5
    priority: 10
  - id: legacy
    action: block
    port: "8000-7000"
    enabled: false
    priority: 50
"#;

    fn write_rules(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).expect("should write rules");
        path
    }

    #[tokio::test]
    async fn test_list_sorts_by_priority_keeping_file_order() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write_rules(&dir, "rules.yaml", RULES_YAML);

        let report = build_list_report(&path, false)
            .await
            .expect("listing should succeed");

        let ids: Vec<_> = report.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["block-admin", "allow-dns", "legacy"]);
        assert_eq!(report.rules[1].port, "53", "numeric port is kept as a pattern");
    }

    #[tokio::test]
    async fn test_list_enabled_only() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write_rules(&dir, "rules.yml", RULES_YAML);

        let report = build_list_report(&path, true)
            .await
            .expect("listing should succeed");
        assert_eq!(report.total, 2);
        assert!(report.rules.iter().all(|r| r.enabled));
    }

    #[tokio::test]
    async fn test_validate_reports_each_invalid_rule() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write_rules(&dir, "rules.yaml", RULES_YAML);

        let report = build_validation_report(&path).await;
        assert!(!report.is_valid());
        assert_eq!((report.total, report.valid, report.invalid), (3, 2, 1));
        assert_eq!(report.errors[0].rule_id.as_deref(), Some("legacy"));
        assert_eq!(report.errors[0].field.as_deref(), Some("port"));
    }

    #[tokio::test]
    async fn test_validate_counts_duplicate_id_once() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write_rules(
            &dir,
            "rules.yaml",
            "rules:\n  - id: a\n    action: allow\n  - id: a\n    action: block\n",
        );

        let report = build_validation_report(&path).await;
        assert!(!report.is_valid());
        assert_eq!((report.total, report.valid, report.invalid), (2, 1, 1));
        assert_eq!(report.errors[0].field.as_deref(), Some("id"));
    }

    #[tokio::test]
    async fn test_validate_unreadable_file_is_single_error() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write_rules(&dir, "rules.toml", "[[rules]\nid = ");

        let report = build_validation_report(&path).await;
        assert!(!report.is_valid());
        assert_eq!(report.total, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].rule_id.is_none());
    }

    #[tokio::test]
    async fn test_validate_clean_file() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write_rules(
            &dir,
            "rules.toml",
            "[[rules]]\nid = \"a\"\naction = \"allow\"\nsource = \"10.0.0.0/8\"\n",
        );

        let report = build_validation_report(&path).await;
        assert!(report.is_valid());
        assert_eq!(report.valid, 1);
    }

    #[test]
    fn test_validation_report_render_text() {
        let report = RuleValidationReport {
            path: "rules.toml".to_owned(),
            total: 2,
            valid: 1,
            invalid: 1,
            errors: vec![RuleError {
                rule_id: Some("bad".to_owned()),
                field: Some("source".to_owned()),
                error: "invalid CIDR block".to_owned(),
            }],
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("rules.toml"));
        assert!(output.contains("invalid CIDR block"));
        assert!(output.contains("source"));
    }

    #[test]
    fn test_list_report_json_serialization() {
        let report = RuleListReport {
            path: "rules.toml".to_owned(),
            total: 1,
            rules: vec![RuleEntry::from(FirewallRule::new("deny", Action::Block))],
        };

        let json = serde_json::to_string(&report).expect("JSON serialization should succeed");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("should parse JSON");
        assert_eq!(parsed["rules"][0]["action"].as_str(), Some("block"));
        assert_eq!(parsed["rules"][0]["source"].as_str(), Some("any"));
    }
}
