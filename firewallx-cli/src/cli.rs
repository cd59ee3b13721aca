//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// FirewallX -- firewall policy evaluation engine.
///
/// Use `firewallx <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "firewallx", version, about, long_about = None)]
pub struct Cli {
    /// Path to the firewallx.toml configuration file.
    #[arg(short, long, default_value = "firewallx.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate packets against a rule file.
    Evaluate(EvaluateArgs),

    /// Inspect firewall rule files.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- evaluate ----

/// Run every packet of a JSON lines file through the engine.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Rule file (TOML or YAML). Defaults to `policy.rules_path` from the config.
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Packet file, one JSON packet descriptor per line.
    #[arg(short, long)]
    pub packets: PathBuf,

    /// Tenant the packets belong to.
    #[arg(short, long, default_value = "default")]
    pub tenant: String,

    /// Print only the summary, not every decision.
    #[arg(long)]
    pub summary_only: bool,

    /// List the tenant's logs whose source, destination or protocol contains TERM.
    #[arg(long, value_name = "TERM")]
    pub search: Option<String>,
}

// ---- rules ----

/// Inspect firewall rule files.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List the rules of a file in evaluation order.
    List {
        /// Rule file (TOML or YAML).
        path: PathBuf,

        /// Hide disabled rules.
        #[arg(long)]
        enabled_only: bool,
    },
    /// Validate a rule file and report every invalid rule.
    Validate {
        /// Rule file (TOML or YAML).
        path: PathBuf,
    },
}

// ---- config ----

/// Manage firewallx configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, policy, detector, alert, pipeline).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_evaluate_minimal() {
        let args = Cli::try_parse_from(["firewallx", "evaluate", "--packets", "packets.jsonl"]);
        assert!(args.is_ok(), "should parse 'evaluate' subcommand");
        let cli = args.expect("parse succeeded");
        match cli.command {
            Commands::Evaluate(eval_args) => {
                assert_eq!(eval_args.packets, PathBuf::from("packets.jsonl"));
                assert!(eval_args.rules.is_none(), "rules should default to None");
                assert_eq!(eval_args.tenant, "default");
                assert!(!eval_args.summary_only);
                assert!(eval_args.search.is_none());
            }
            _ => panic!("expected Evaluate command"),
        }
    }

    #[test]
    fn test_cli_parse_evaluate_full() {
        let args = Cli::try_parse_from([
            "firewallx",
            "evaluate",
            "-r",
            "rules.yaml",
            "-p",
            "packets.jsonl",
            "-t",
            "acme",
            "--summary-only",
            "--search",
            "10.0.0",
        ]);
        let cli = args.expect("parse succeeded");
        match cli.command {
            Commands::Evaluate(eval_args) => {
                assert_eq!(eval_args.rules, Some(PathBuf::from("rules.yaml")));
                assert_eq!(eval_args.tenant, "acme");
                assert!(eval_args.summary_only);
                assert_eq!(eval_args.search.as_deref(), Some("10.0.0"));
            }
            _ => panic!("expected Evaluate command"),
        }
    }

    #[test]
    fn test_cli_parse_evaluate_requires_packets() {
        let args = Cli::try_parse_from(["firewallx", "evaluate"]);
        assert!(args.is_err(), "evaluate without --packets should fail");
    }

    #[test]
    fn test_cli_parse_rules_list() {
        let args = Cli::try_parse_from(["firewallx", "rules", "list", "rules.toml"]);
        let cli = args.expect("parse succeeded");
        match cli.command {
            Commands::Rules(rules_args) => match rules_args.action {
                RulesAction::List { path, enabled_only } => {
                    assert_eq!(path, PathBuf::from("rules.toml"));
                    assert!(!enabled_only, "enabled_only should default to false");
                }
                _ => panic!("expected List action"),
            },
            _ => panic!("expected Rules command"),
        }
    }

    #[test]
    fn test_cli_parse_rules_list_enabled_only() {
        let args = Cli::try_parse_from(["firewallx", "rules", "list", "r.toml", "--enabled-only"]);
        let cli = args.expect("parse succeeded");
        match cli.command {
            Commands::Rules(rules_args) => match rules_args.action {
                RulesAction::List { enabled_only, .. } => assert!(enabled_only),
                _ => panic!("expected List action"),
            },
            _ => panic!("expected Rules command"),
        }
    }

    #[test]
    fn test_cli_parse_rules_validate() {
        let args = Cli::try_parse_from(["firewallx", "rules", "validate", "/etc/firewallx/rules.yaml"]);
        let cli = args.expect("parse succeeded");
        match cli.command {
            Commands::Rules(rules_args) => match rules_args.action {
                RulesAction::Validate { path } => {
                    assert_eq!(path, PathBuf::from("/etc/firewallx/rules.yaml"));
                }
                _ => panic!("expected Validate action"),
            },
            _ => panic!("expected Rules command"),
        }
    }

    #[test]
    fn test_cli_parse_rules_validate_requires_path() {
        let args = Cli::try_parse_from(["firewallx", "rules", "validate"]);
        assert!(args.is_err(), "rules validate without a path should fail");
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let args = Cli::try_parse_from(["firewallx", "config", "show", "--section", "detector"]);
        let cli = args.expect("parse succeeded");
        match cli.command {
            Commands::Config(config_args) => match config_args.action {
                ConfigAction::Show { section } => {
                    assert_eq!(section, Some("detector".to_owned()));
                }
                _ => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_config_validate() {
        let args = Cli::try_parse_from(["firewallx", "config", "validate"]);
        let cli = args.expect("parse succeeded");
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs {
                action: ConfigAction::Validate
            })
        ));
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let args = Cli::try_parse_from([
            "firewallx",
            "-c",
            "/custom/firewallx.toml",
            "--log-level",
            "debug",
            "--output",
            "json",
            "config",
            "validate",
        ]);
        let cli = args.expect("parse succeeded");
        assert_eq!(cli.config, PathBuf::from("/custom/firewallx.toml"));
        assert_eq!(cli.log_level, Some("debug".to_owned()));
        assert!(matches!(cli.output, OutputFormat::Json));
    }

    #[test]
    fn test_cli_parse_invalid_output_format_fails() {
        let args = Cli::try_parse_from(["firewallx", "--output", "xml", "config", "validate"]);
        assert!(args.is_err(), "unknown output format should fail");
    }

    #[test]
    fn test_cli_parse_missing_command_fails() {
        let args = Cli::try_parse_from(["firewallx"]);
        assert!(args.is_err(), "should fail when no command provided");
    }

    #[test]
    fn test_cli_verify_command_structure() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "firewallx");

        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        for expected in ["evaluate", "rules", "config"] {
            assert!(
                subcommands.contains(&expected),
                "should have '{expected}' subcommand"
            );
        }
    }
}
