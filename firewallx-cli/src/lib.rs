//! FirewallX CLI library
//!
//! The `firewallx` binary is a thin wrapper around these modules so that
//! command handlers can be exercised from integration tests.
//!
//! - [`cli`]: clap argument definitions
//! - [`commands`]: one handler per subcommand
//! - [`error`]: [`CliError`](error::CliError) and exit codes
//! - [`logging`]: tracing subscriber setup
//! - [`output`]: text / JSON rendering

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;

use cli::{Cli, Commands};
use error::CliError;
use output::OutputWriter;

/// Run a parsed command line.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Evaluate(args) => commands::evaluate::execute(args, &cli.config, &writer).await,
        Commands::Rules(args) => commands::rules::execute(args, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}
