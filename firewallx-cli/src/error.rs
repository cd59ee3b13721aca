//! CLI-specific error types and exit code mapping

use firewallx_core::error::FirewallxError;
use firewallx_engine::EngineError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Rule file could not be loaded or contains invalid rules.
    #[error("rule error: {0}")]
    Rule(String),

    /// Packet input file could not be read.
    #[error("input error: {0}")]
    Input(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from firewallx-core.
    #[error("{0}")]
    Core(#[from] FirewallxError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                         |
    /// |------|---------------------------------|
    /// | 0    | Success                         |
    /// | 1    | General / command error         |
    /// | 2    | Configuration error             |
    /// | 3    | Invalid or unreadable rule file |
    /// | 4    | Unreadable packet input         |
    /// | 10   | IO error                        |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(FirewallxError::Config(_)) => 2,
            Self::Rule(_) => 3,
            Self::Input(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Config { .. } => Self::Config(e.to_string()),
            _ => Self::Rule(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firewallx_core::error::ConfigError;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err = CliError::Core(FirewallxError::Config(ConfigError::FileNotFound {
            path: "firewallx.toml".to_owned(),
        }));
        assert_eq!(err.exit_code(), 2, "core config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_rule_error() {
        let err = CliError::Rule("2 invalid rules".to_owned());
        assert_eq!(err.exit_code(), 3, "rule error should return exit code 3");
    }

    #[test]
    fn test_exit_code_input_error() {
        let err = CliError::Input("packets.jsonl: not found".to_owned());
        assert_eq!(err.exit_code(), 4, "input error should return exit code 4");
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CliError::Io(io_err);
        assert_eq!(err.exit_code(), 10, "io error should return exit code 10");
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("test error".to_owned());
        assert_eq!(err.exit_code(), 1, "command error should return exit code 1");
    }

    #[test]
    fn test_error_display_config() {
        let err = CliError::Config("invalid TOML syntax".to_owned());
        let display_str = err.to_string();
        assert!(display_str.contains("configuration error"));
        assert!(display_str.contains("invalid TOML syntax"));
    }

    #[test]
    fn test_error_display_command() {
        let err = CliError::Command("execution failed".to_owned());
        assert_eq!(err.to_string(), "execution failed");
    }

    #[test]
    fn test_from_engine_rule_load_error() {
        let engine_err = EngineError::RuleLoad {
            path: "rules.toml".to_owned(),
            reason: "TOML parse error".to_owned(),
        };
        let cli_err: CliError = engine_err.into();
        match cli_err {
            CliError::Rule(msg) => assert!(msg.contains("rules.toml")),
            other => panic!("expected Rule variant, got {other:?}"),
        }
    }

    #[test]
    fn test_from_engine_config_error() {
        let engine_err = EngineError::Config {
            field: "window_secs".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        let cli_err: CliError = engine_err.into();
        assert_eq!(cli_err.exit_code(), 2);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let cli_err: CliError = io_err.into();
        match cli_err {
            CliError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            _ => panic!("expected Io error variant"),
        }
    }
}
