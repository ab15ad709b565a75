//! `inventory` command: lists what an export directory holds.

use anyhow::{Context, Result};
use rev_exporter_core::{InventoryFile, RecordInventory, scan_export};

use super::ProcessExit;
use crate::cli::InventoryArgs;

pub fn run_inventory_command(args: &InventoryArgs) -> Result<ProcessExit> {
    let records = scan_export(&args.export_dir)
        .with_context(|| format!("failed to scan {}", args.export_dir.display()))?;

    if args.json {
        let rendered =
            serde_json::to_string_pretty(&records).context("failed to serialize inventory")?;
        println!("{rendered}");
        return Ok(ProcessExit::Success);
    }

    if records.is_empty() {
        println!("No exported orders in {}", args.export_dir.display());
        return Ok(ProcessExit::Success);
    }

    for record in &records {
        print_record(record);
    }
    let files: usize = records.iter().map(RecordInventory::file_count).sum();
    println!();
    println!("{} orders, {files} files", records.len());
    Ok(ProcessExit::Success)
}

fn print_record(record: &RecordInventory) {
    let status = record.status.as_deref().unwrap_or("unknown");
    match &record.placed_at {
        Some(placed_at) => println!("{} [{status}] placed {placed_at}", record.record_id),
        None => println!("{} [{status}]", record.record_id),
    }
    print_group("media", &record.media_files);
    print_group("transcripts", &record.transcript_files);
    print_group("other", &record.other_files);
}

fn print_group(label: &str, files: &[InventoryFile]) {
    for file in files {
        let preview = if file.previewable { " (preview)" } else { "" };
        println!("  {label}/{} {} bytes{preview}", file.name, file.size);
    }
}
