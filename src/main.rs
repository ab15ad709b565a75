//! CLI entry point for the rev-exporter tool.

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Args, Command};
use commands::ProcessExit;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    init_tracing(&args);
    debug!(?args, "CLI arguments parsed");

    let options = commands::ClientOptions {
        config_file: args.config.clone(),
        base_url: args.base_url.clone(),
    };

    let result = match &args.command {
        Command::Sync(sync) => commands::run_sync_command(sync, &options).await,
        Command::TestConnection => commands::run_test_connection_command(&options).await,
        Command::Inventory(inventory) => commands::run_inventory_command(inventory),
    };

    match result {
        Ok(outcome) => outcome.into(),
        Err(err) => {
            error!(error = %format!("{err:#}"), "command failed");
            eprintln!("[ERROR] {err:#}");
            ProcessExit::Failure.into()
        }
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout stays clean
/// for summaries and `inventory --json`.
///
/// Priority: RUST_LOG env var > quiet flag > debug/verbose flags > default (info)
fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else if args.verbose >= 2 {
        "trace"
    } else if args.debug || args.verbose == 1 {
        "debug"
    } else {
        "info"
    };

    let directives = if default_level == "trace" {
        default_level.to_string()
    } else {
        format!("{default_level},reqwest=warn,hyper=warn,hyper_util=warn")
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
