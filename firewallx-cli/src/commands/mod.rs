//! Command handlers -- one module per subcommand

use std::path::Path;

use tracing::debug;

use firewallx_core::config::FirewallxConfig;

use crate::error::CliError;

pub mod config;
pub mod evaluate;
pub mod rules;

/// Load the effective configuration for commands that need one.
///
/// A missing file falls back to defaults plus env overrides so that
/// `evaluate` and `rules` work without a config file. A file that exists
/// but fails to parse or validate is an error.
pub async fn load_config(config_path: &Path) -> Result<FirewallxConfig, CliError> {
    if tokio::fs::try_exists(config_path).await.unwrap_or(false) {
        return Ok(FirewallxConfig::load(config_path).await?);
    }

    debug!(path = %config_path.display(), "config file not found, using defaults");
    let mut config = FirewallxConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
