//! CLI command handlers.

mod inventory;
mod sync;
mod test_connection;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use rev_exporter_core::{ClientConfig, CredentialSearch, RetryPolicy, RevClient};
use tracing::info;

pub use inventory::run_inventory_command;
pub use sync::run_sync_command;
pub use test_connection::run_test_connection_command;

/// Process outcome of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Command completed; per-item failures may still have been reported.
    Success,
    /// Fatal error, rejected connection or interrupt.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(outcome: ProcessExit) -> Self {
        match outcome {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::FAILURE,
        }
    }
}

/// Global options that shape the API client.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Explicit credential file (`--config`).
    pub config_file: Option<PathBuf>,
    /// Base URL override (`--base-url` / `REV_API_BASE_URL`).
    pub base_url: Option<String>,
}

/// Resolves credentials and builds an authenticated client.
fn connect(options: &ClientOptions, max_retries: u32) -> Result<RevClient> {
    let search = match &options.config_file {
        Some(path) => CredentialSearch::explicit(path),
        None => CredentialSearch::discover(),
    };
    let (credentials, source) = search.load().context("API credentials not configured")?;
    info!(%source, "loaded API credentials");

    let mut config = ClientConfig::default().with_retry(RetryPolicy::with_max_retries(max_retries));
    if let Some(base_url) = &options.base_url {
        config = config.with_base_url(base_url);
    }

    RevClient::new(&config, Some(&credentials)).context("failed to build API client")
}
