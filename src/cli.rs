//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};

use rev_exporter_core::{DEFAULT_MAX_RETRIES, DEFAULT_PAGE_SIZE};

/// Incrementally export Rev.com orders, media and transcripts.
///
/// Already-downloaded attachments are recorded in a ledger inside the export
/// directory and are never fetched again.
#[derive(Parser, Debug)]
#[command(name = "rev-exporter")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Read credentials from this JSON config file only
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, env = "REV_API_BASE_URL", hide = true, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync all completed orders into the export directory
    Sync(SyncArgs),

    /// Check that the API is reachable and the credentials are accepted
    TestConnection,

    /// List exported orders and files
    Inventory(InventoryArgs),
}

/// Options of the `sync` subcommand.
#[derive(clap::Args, Debug)]
pub struct SyncArgs {
    /// Export directory
    #[arg(short, long, default_value = "./exports")]
    pub output_dir: PathBuf,

    /// Only sync orders placed on or after this date (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS, UTC)
    #[arg(long, value_parser = parse_since)]
    pub since: Option<DateTime<Utc>>,

    /// Skip media attachments
    #[arg(long)]
    pub no_include_media: bool,

    /// Skip transcript and caption attachments
    #[arg(long)]
    pub no_include_transcripts: bool,

    /// Show what would be downloaded without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Orders requested per listing page (1-1000)
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub page_size: u32,

    /// Maximum retry attempts for transient failures (0-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: u32,
}

/// Options of the `inventory` subcommand.
#[derive(clap::Args, Debug)]
pub struct InventoryArgs {
    /// Export directory to scan
    #[arg(short, long, default_value = "./exports")]
    pub export_dir: PathBuf,

    /// Print the inventory as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid date '{value}'; expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS"))
}
