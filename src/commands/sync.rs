//! `sync` command: runs one incremental export and prints the summary.

use std::fs;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rev_exporter_core::{DownloadLedger, StorageLayout, SyncDriver, SyncOptions, SyncSummary};
use tracing::{info, warn};

use super::{ClientOptions, ProcessExit, connect};
use crate::cli::SyncArgs;

pub async fn run_sync_command(args: &SyncArgs, options: &ClientOptions) -> Result<ProcessExit> {
    let client = connect(options, args.max_retries)?;

    if !args.dry_run {
        fs::create_dir_all(&args.output_dir).with_context(|| {
            format!("failed to create output directory {}", args.output_dir.display())
        })?;
    }

    let storage = StorageLayout::new(&args.output_dir);
    let mut ledger = DownloadLedger::for_export_root(storage.export_root());
    info!(
        ledger = %ledger.path().display(),
        known_attachments = ledger.len(),
        "download ledger loaded"
    );

    let sync_options = SyncOptions {
        since: args.since,
        include_media: !args.no_include_media,
        include_transcripts: !args.no_include_transcripts,
        dry_run: args.dry_run,
        page_size: args.page_size,
    };

    let started = Instant::now();
    let mut driver = SyncDriver::new(&client, storage, &mut ledger, sync_options);

    // Everything marked before an interrupt is already on disk.
    let outcome = tokio::select! {
        result = driver.run() => Some(result),
        () = wait_for_interrupt() => None,
    };

    match outcome {
        None => {
            warn!("sync interrupted");
            eprintln!("\nInterrupted. Progress up to the last completed attachment was saved.");
            Ok(ProcessExit::Failure)
        }
        Some(Err(error)) => Err(error).context("sync aborted"),
        Some(Ok(summary)) => {
            print_summary(&summary, started.elapsed(), args.dry_run);
            Ok(ProcessExit::Success)
        }
    }
}

async fn wait_for_interrupt() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

fn print_summary(summary: &SyncSummary, elapsed: Duration, dry_run: bool) {
    println!();
    println!("Sync summary");
    println!("  Orders listed:          {}", summary.records_listed);
    println!("  Orders scanned:         {}", summary.records_scanned);
    if dry_run {
        println!("  Attachments to fetch:   {}", summary.attachments_planned);
    } else {
        println!("  Attachments downloaded: {}", summary.attachments_downloaded);
    }
    println!("  Already downloaded:     {}", summary.attachments_skipped);
    println!("  Excluded by options:    {}", summary.attachments_excluded);
    println!("  Failures:               {}", summary.failure_count());
    println!("  Elapsed:                {:.1}s", elapsed.as_secs_f64());

    if summary.failure_count() > 0 {
        println!();
        println!("Failures:");
        for failure in summary.failure_preview() {
            println!("  - {failure}");
        }
        let hidden = summary.hidden_failures();
        if hidden > 0 {
            println!("  ... and {hidden} more");
        }
    }

    if dry_run {
        println!();
        println!("Dry run: nothing was downloaded or written.");
    }
}
