//! `test-connection` command.

use anyhow::Result;
use rev_exporter_core::DEFAULT_MAX_RETRIES;
use tracing::warn;

use super::{ClientOptions, ProcessExit, connect};

pub async fn run_test_connection_command(options: &ClientOptions) -> Result<ProcessExit> {
    let client = connect(options, DEFAULT_MAX_RETRIES)?;
    println!("Testing connection to {} ...", client.base_url());

    match client.test_connection().await {
        Ok(()) => {
            println!("[OK] Connection successful");
            Ok(ProcessExit::Success)
        }
        Err(error) => {
            warn!(%error, "connection test failed");
            eprintln!("[ERROR] Connection failed: {error}");
            Ok(ProcessExit::Failure)
        }
    }
}
