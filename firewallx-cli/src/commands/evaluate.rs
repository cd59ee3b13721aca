//! `firewallx evaluate` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use firewallx_core::config::FirewallxConfig;
use firewallx_core::types::{Action, LogRecord, PacketDescriptor, Severity, TenantContext};
use firewallx_engine::{EngineConfig, Evaluation, FirewallEngine, MemorySink, Rejection};

use crate::cli::EvaluateArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `evaluate` command.
pub async fn execute(
    args: EvaluateArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::load_config(config_path).await?;
    let rules_path = resolve_rules_path(args.rules, &config);

    info!(path = %args.packets.display(), tenant = %args.tenant, "reading packets");
    let content = tokio::fs::read_to_string(&args.packets)
        .await
        .map_err(|e| CliError::Input(format!("{}: {e}", args.packets.display())))?;
    let input = parse_packets(&content);

    let options = RunOptions {
        summary_only: args.summary_only,
        search: args.search,
    };
    let report = run(&config, &args.tenant, rules_path.as_deref(), input, &options).await?;

    writer.render(&report)?;

    Ok(())
}

/// `--rules` wins over `policy.rules_path`. An empty config path means no rule file.
fn resolve_rules_path(flag: Option<PathBuf>, config: &FirewallxConfig) -> Option<PathBuf> {
    flag.or_else(|| {
        let configured = config.policy.rules_path.trim();
        (!configured.is_empty()).then(|| PathBuf::from(configured))
    })
}

/// Packet descriptors parsed from a JSON lines document.
#[derive(Debug, Default)]
pub struct PacketInput {
    /// `(line number, descriptor)` in file order
    pub packets: Vec<(usize, PacketDescriptor)>,
    /// Lines that were not a JSON object
    pub malformed: Vec<MalformedLine>,
}

/// A line that could not be decoded into a packet descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct MalformedLine {
    pub line: usize,
    pub error: String,
}

/// Parse one packet descriptor per line.
///
/// Blank lines and `#` comments are skipped. Missing fields and unparsable
/// addresses or protocols are left for the engine, which logs the rejection.
/// A field of the wrong JSON type (a string port, a non RFC 3339 timestamp)
/// fails decoding, so the line is only counted as malformed.
pub fn parse_packets(content: &str) -> PacketInput {
    let mut input = PacketInput::default();

    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match serde_json::from_str::<PacketDescriptor>(trimmed) {
            Ok(descriptor) => input.packets.push((line, descriptor)),
            Err(e) => {
                warn!(line, error = %e, "skipping malformed packet line");
                input.malformed.push(MalformedLine {
                    line,
                    error: e.to_string(),
                });
            }
        }
    }

    input
}

/// Maximum number of log records returned by `--search`.
const SEARCH_LIMIT: usize = 100;

/// Report options for [`run`].
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Omit per-packet results
    pub summary_only: bool,
    /// Also list the logs whose addresses or protocol contain this term
    pub search: Option<String>,
}

/// Run every packet through a fresh engine and build the report.
pub async fn run(
    config: &FirewallxConfig,
    tenant_id: &str,
    rules_path: Option<&Path>,
    input: PacketInput,
    options: &RunOptions,
) -> Result<EvaluateReport, CliError> {
    let summary_only = options.summary_only;
    let tenant = TenantContext::new(tenant_id);
    let sink = MemorySink::new();
    let engine = FirewallEngine::new(EngineConfig::from_core(config), sink.clone(), sink.clone())?;

    let rule_errors = match rules_path {
        Some(path) => {
            let update = engine.load_rules_file(&tenant, path).await?;
            update.errors.iter().map(ToString::to_string).collect()
        }
        None => {
            warn!(
                default_action = %config.policy.default_action,
                "no rule file given, every packet gets the default action"
            );
            Vec::new()
        }
    };

    let mut results = Vec::with_capacity(if summary_only { 0 } else { input.packets.len() });
    for (line, descriptor) in input.packets {
        let result = match engine.evaluate(&tenant, descriptor).await {
            Ok(evaluation) => PacketResult::evaluated(line, &evaluation),
            Err(rejection) => PacketResult::rejected(line, &rejection),
        };
        if !summary_only {
            results.push(result);
        }
    }

    let alerts = sink
        .alerts()
        .await
        .into_iter()
        .map(|alert| AlertEntry {
            id: alert.id,
            severity: alert.severity,
            title: alert.title,
            source_ip: alert.source_ip.to_string(),
            description: alert.description,
        })
        .collect();

    let logs = match &options.search {
        Some(term) => {
            let matches = sink.logs_matching(&tenant, term, Some(SEARCH_LIMIT)).await;
            info!(term = %term, matches = matches.len(), "log search");
            Some(LogSearch {
                term: term.clone(),
                records: matches.iter().map(LogEntry::from).collect(),
            })
        }
        None => None,
    };

    let stats = engine.stats(&tenant);
    let summary = DashboardSummary {
        tenant: tenant_id.to_owned(),
        total_rules: stats.rules.total_rules,
        active_rules: stats.rules.active_rules,
        invalid_rules: stats.rules.invalid_rules,
        evaluated: stats.evaluated,
        allowed: stats.evaluated.saturating_sub(stats.blocked),
        blocked: stats.blocked,
        rejected: stats.rejected,
        malformed_lines: input.malformed.len(),
        suspicious: stats.suspicious,
        alerts_emitted: stats.alerts_emitted,
        alerts_suppressed: stats.alerts_suppressed,
        unread_alerts: stats.unread_alerts,
    };

    Ok(EvaluateReport {
        rules_path: rules_path.map(|p| p.display().to_string()),
        rule_errors,
        results,
        malformed: input.malformed,
        alerts,
        logs,
        summary,
    })
}

#[derive(Serialize)]
pub struct EvaluateReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<String>,
    pub rule_errors: Vec<String>,
    pub results: Vec<PacketResult>,
    pub malformed: Vec<MalformedLine>,
    pub alerts: Vec<AlertEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogSearch>,
    pub summary: DashboardSummary,
}

/// Logs matching `--search`, newest first.
#[derive(Debug, Serialize)]
pub struct LogSearch {
    pub term: String,
    pub records: Vec<LogEntry>,
}

#[derive(Debug, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub source_ip: String,
    pub destination_ip: String,
    pub port: u16,
    pub protocol: String,
    pub action: Action,
    pub suspicious: bool,
}

impl From<&LogRecord> for LogEntry {
    fn from(record: &LogRecord) -> Self {
        let packet = &record.decision.packet;
        Self {
            timestamp: packet.timestamp.to_rfc3339(),
            source_ip: packet.source_ip.to_string(),
            destination_ip: packet.destination_ip.to_string(),
            port: packet.port,
            protocol: packet.protocol.as_str().to_owned(),
            action: record.decision.action,
            suspicious: record.is_suspicious,
        }
    }
}

/// Outcome of one packet line.
#[derive(Debug, Serialize)]
pub struct PacketResult {
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet: Option<String>,
    pub suspicious: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PacketResult {
    fn evaluated(line: usize, evaluation: &Evaluation) -> Self {
        let error = (!evaluation.persistence_errors.is_empty()).then(|| {
            evaluation
                .persistence_errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        });

        Self {
            line,
            action: Some(evaluation.decision.action),
            rule_id: evaluation.decision.rule_id.clone(),
            packet: Some(evaluation.decision.packet.to_string()),
            suspicious: evaluation.is_suspicious(),
            finding: evaluation.finding.as_ref().map(ToString::to_string),
            alert_id: evaluation.alert.as_ref().map(|a| a.id.clone()),
            error,
        }
    }

    fn rejected(line: usize, rejection: &Rejection) -> Self {
        Self {
            line,
            action: None,
            rule_id: None,
            packet: None,
            suspicious: false,
            finding: None,
            alert_id: None,
            error: Some(rejection.error.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AlertEntry {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub source_ip: String,
    pub description: String,
}

/// Dashboard counts for the evaluated tenant.
#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub tenant: String,
    pub total_rules: usize,
    pub active_rules: usize,
    pub invalid_rules: usize,
    pub evaluated: u64,
    pub allowed: u64,
    pub blocked: u64,
    pub rejected: u64,
    pub malformed_lines: usize,
    pub suspicious: u64,
    pub alerts_emitted: u64,
    pub alerts_suppressed: u64,
    pub unread_alerts: usize,
}

impl Render for EvaluateReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.rules_path {
            Some(path) => writeln!(w, "Evaluation (rules: {})", path.bold())?,
            None => writeln!(w, "Evaluation (no rule file)")?,
        }

        if !self.rule_errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "Invalid rules (never match):")?;
            for e in &self.rule_errors {
                writeln!(w, "  {}", e.red())?;
            }
        }

        if !self.results.is_empty() {
            writeln!(w)?;
            writeln!(
                w,
                "{:<6} {:<9} {:<20} {:<50} Notes",
                "Line", "Action", "Rule", "Packet"
            )?;
            writeln!(w, "{}", "-".repeat(100))?;

            for r in &self.results {
                let action = match r.action {
                    Some(Action::Allow) => "allow".green(),
                    Some(Action::Block) => "block".red(),
                    None => "rejected".yellow(),
                };
                let notes = match (&r.finding, &r.error) {
                    (_, Some(err)) => err.yellow().to_string(),
                    (Some(finding), None) => finding.magenta().to_string(),
                    (None, None) => String::new(),
                };
                writeln!(
                    w,
                    "{:<6} {:<9} {:<20} {:<50} {}",
                    r.line,
                    action,
                    r.rule_id.as_deref().unwrap_or("-"),
                    r.packet.as_deref().unwrap_or("-"),
                    notes
                )?;
            }
        }

        if !self.malformed.is_empty() {
            writeln!(w)?;
            writeln!(w, "Malformed lines:")?;
            for m in &self.malformed {
                writeln!(w, "  line {}: {}", m.line, m.error.red())?;
            }
        }

        if !self.alerts.is_empty() {
            writeln!(w)?;
            writeln!(w, "Alerts ({}):", self.alerts.len().to_string().bold())?;
            for a in &self.alerts {
                let severity = match a.severity {
                    Severity::Critical => a.severity.as_str().red().bold(),
                    Severity::High => a.severity.as_str().red(),
                    Severity::Medium => a.severity.as_str().yellow(),
                    Severity::Low => a.severity.as_str().normal(),
                };
                writeln!(w, "  [{}] {}: {}", severity, a.title.bold(), a.description)?;
            }
        }

        if let Some(search) = &self.logs {
            writeln!(w)?;
            writeln!(
                w,
                "Logs matching '{}' ({}):",
                search.term.bold(),
                search.records.len()
            )?;
            for l in &search.records {
                let action = match l.action {
                    Action::Allow => "allow".green(),
                    Action::Block => "block".red(),
                };
                let flag = if l.suspicious { "SUSPICIOUS".red().bold() } else { "".normal() };
                writeln!(
                    w,
                    "  {} {} -> {}:{} {} {} {}",
                    l.timestamp, l.source_ip, l.destination_ip, l.port, l.protocol, action, flag
                )?;
            }
        }

        let s = &self.summary;
        writeln!(w)?;
        writeln!(w, "Summary (tenant {})", s.tenant.bold())?;
        writeln!(
            w,
            "  Rules:   {} total, {} active, {} invalid",
            s.total_rules, s.active_rules, s.invalid_rules
        )?;
        writeln!(
            w,
            "  Packets: {} evaluated, {} allowed, {} blocked, {} rejected, {} malformed",
            s.evaluated,
            s.allowed.to_string().green(),
            s.blocked.to_string().red(),
            s.rejected.to_string().yellow(),
            s.malformed_lines
        )?;
        writeln!(
            w,
            "  Alerts:  {} suspicious, {} emitted, {} suppressed, {} unread",
            s.suspicious, s.alerts_emitted, s.alerts_suppressed, s.unread_alerts
        )?;

        Ok(())
    }
}
