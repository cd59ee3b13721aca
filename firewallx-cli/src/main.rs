use clap::Parser;

use firewallx_cli::cli::Cli;
use firewallx_cli::commands::load_config;
use firewallx_cli::logging::init_tracing;
use firewallx_core::config::GeneralConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // `config validate` reports a broken file itself, so logging falls back to defaults
    let general = load_config(&cli.config)
        .await
        .map(|config| config.general)
        .unwrap_or_else(|_| GeneralConfig::default());

    if let Err(e) = init_tracing(&general, cli.log_level.as_deref()) {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
    firewallx_core::metrics::describe_all();

    tracing::debug!(config = %cli.config.display(), "firewallx starting");

    if let Err(e) = firewallx_cli::run(cli).await {
        tracing::debug!(error = %e, exit_code = e.exit_code(), "command failed");
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}
