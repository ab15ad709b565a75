//! Sequential sync driver and run summary.
//!
//! Records are pulled lazily from the enumerator and processed one at a time;
//! attachments of a record are processed one at a time as well. Per-item
//! failures are collected into the [`SyncSummary`] and never stop the run.
//! Only a failed listing page is fatal.
//!
//! # Example
//!
//! ```no_run
//! use rev_exporter_core::{
//!     ClientConfig, Credentials, DownloadLedger, RevClient, StorageLayout, SyncDriver, SyncOptions,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RevClient::new(&ClientConfig::default(), Some(&Credentials::api_key("c:u")))?;
//! let storage = StorageLayout::new("./exports");
//! let mut ledger = DownloadLedger::for_export_root(storage.export_root());
//! let summary = SyncDriver::new(&client, storage, &mut ledger, SyncOptions::default())
//!     .run()
//!     .await?;
//! println!("downloaded {}", summary.attachments_downloaded);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::api::RevClient;
use crate::attachments::{
    AttachmentCategory, AttachmentClient, AttachmentError, classify, preferred_format,
    resolve_extension,
};
use crate::ledger::DownloadLedger;
use crate::model::{AttachmentRef, Record};
use crate::orders::{DEFAULT_PAGE_SIZE, OrderClient, OrderError};
use crate::storage::{StorageError, StorageLayout};

/// Number of failure messages shown in a summary; the rest are counted.
pub const FAILURE_PREVIEW_LIMIT: usize = 10;

/// Fatal sync errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A listing page could not be fetched.
    #[error("failed to enumerate records: {0}")]
    Enumeration(#[source] OrderError),
}

/// Knobs for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Stop at the first record placed before this instant.
    pub since: Option<DateTime<Utc>>,
    /// Download media attachments.
    pub include_media: bool,
    /// Download transcript and caption attachments.
    pub include_transcripts: bool,
    /// Plan only: no content fetches and no writes.
    pub dry_run: bool,
    /// Records requested per listing page.
    pub page_size: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            since: None,
            include_media: true,
            include_transcripts: true,
            dry_run: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SyncOptions {
    fn includes(&self, category: AttachmentCategory) -> bool {
        match category {
            AttachmentCategory::Media => self.include_media,
            AttachmentCategory::Transcript | AttachmentCategory::Caption => self.include_transcripts,
            AttachmentCategory::Other => true,
        }
    }
}

/// Outcome counters of a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Records yielded by the enumerator.
    pub records_listed: usize,
    /// Completed records whose detail was fetched.
    pub records_scanned: usize,
    /// Attachments written and marked.
    pub attachments_downloaded: usize,
    /// Attachments that would be downloaded (dry run).
    pub attachments_planned: usize,
    /// Attachments already in the ledger.
    pub attachments_skipped: usize,
    /// Attachments left out by the media/transcript toggles.
    pub attachments_excluded: usize,
    /// Human-readable failure messages, in occurrence order.
    pub failures: Vec<String>,
}

impl SyncSummary {
    /// Number of recorded failures.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// The first [`FAILURE_PREVIEW_LIMIT`] failure messages.
    #[must_use]
    pub fn failure_preview(&self) -> &[String] {
        &self.failures[..self.failures.len().min(FAILURE_PREVIEW_LIMIT)]
    }

    /// Failures not included in the preview.
    #[must_use]
    pub fn hidden_failures(&self) -> usize {
        self.failures.len().saturating_sub(FAILURE_PREVIEW_LIMIT)
    }
}

#[derive(Debug, Error)]
enum DownloadFailure {
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Drives one sync run over an export root.
pub struct SyncDriver<'a> {
    orders: OrderClient,
    attachments: AttachmentClient,
    storage: StorageLayout,
    ledger: &'a mut DownloadLedger,
    options: SyncOptions,
}

impl<'a> SyncDriver<'a> {
    /// Creates a driver writing through `storage` and recording into `ledger`.
    #[must_use]
    pub fn new(
        client: &RevClient,
        storage: StorageLayout,
        ledger: &'a mut DownloadLedger,
        options: SyncOptions,
    ) -> Self {
        Self {
            orders: OrderClient::new(client.clone()),
            attachments: AttachmentClient::new(client.clone()),
            storage,
            ledger,
            options,
        }
    }

    /// Runs the sync to completion.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Enumeration`] when a listing page fails. Every
    /// attachment marked before that point is already persisted.
    pub async fn run(&mut self) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::default();
        let mut pager = self
            .orders
            .enumerate(self.options.page_size, self.options.since);

        info!(
            export_root = %self.storage.export_root().display(),
            dry_run = self.options.dry_run,
            since = ?self.options.since,
            "starting sync"
        );

        while let Some(record) = pager.next_record().await.map_err(SyncError::Enumeration)? {
            summary.records_listed += 1;
            if !record.is_completed() {
                debug!(record_id = %record.record_id, status = %record.status, "skipping incomplete record");
                continue;
            }
            self.process_record(&record.record_id, &mut summary).await;
        }

        info!(
            records = summary.records_scanned,
            downloaded = summary.attachments_downloaded,
            skipped = summary.attachments_skipped,
            failures = summary.failure_count(),
            "sync finished"
        );
        Ok(summary)
    }

    #[instrument(skip(self, summary))]
    async fn process_record(&mut self, record_id: &str, summary: &mut SyncSummary) {
        let detail = match self.orders.get_record_detail(record_id).await {
            Ok(detail) => detail,
            Err(error) => {
                warn!(%error, "failed to fetch record detail");
                summary
                    .failures
                    .push(format!("record {record_id}: {error}"));
                return;
            }
        };
        summary.records_scanned += 1;

        if !self.options.dry_run
            && let Err(error) = self.storage.write_record_metadata(&detail)
        {
            warn!(%error, "failed to write record metadata");
            summary
                .failures
                .push(format!("record {record_id} metadata: {error}"));
        }

        for attachment in &detail.attachments {
            self.process_attachment(&detail, attachment, summary).await;
        }
    }

    async fn process_attachment(
        &mut self,
        record: &Record,
        attachment: &AttachmentRef,
        summary: &mut SyncSummary,
    ) {
        let label = attachment.name.as_deref().unwrap_or(&attachment.id);

        if self.ledger.is_downloaded(&attachment.id) {
            debug!(attachment_id = %attachment.id, "already downloaded, skipping");
            summary.attachments_skipped += 1;
            return;
        }

        let category = classify(attachment);
        if !self.options.includes(category) {
            debug!(attachment_id = %attachment.id, %category, "excluded by options");
            summary.attachments_excluded += 1;
            return;
        }

        let format = preferred_format(category, attachment);
        if self.options.dry_run {
            info!(
                record_id = %record.record_id,
                attachment_id = %attachment.id,
                name = label,
                %category,
                format = format.unwrap_or("default"),
                "would download"
            );
            summary.attachments_planned += 1;
            return;
        }

        match self.download(record, attachment, category, format).await {
            Ok(path) => {
                info!(attachment_id = %attachment.id, path = %path.display(), "downloaded");
                summary.attachments_downloaded += 1;
                if let Err(error) = self.ledger.mark_downloaded(&attachment.id) {
                    warn!(attachment_id = %attachment.id, %error, "failed to persist ledger");
                    summary
                        .failures
                        .push(format!("ledger entry for {label} ({}): {error}", attachment.id));
                }
            }
            Err(error) => {
                warn!(attachment_id = %attachment.id, %error, "attachment failed");
                summary.failures.push(format!(
                    "attachment {label} ({}) of record {}: {error}",
                    attachment.id, record.record_id
                ));
            }
        }
    }

    async fn download(
        &self,
        record: &Record,
        attachment: &AttachmentRef,
        category: AttachmentCategory,
        format: Option<&str>,
    ) -> Result<PathBuf, DownloadFailure> {
        let full = self.attachments.get_metadata(&attachment.id).await?;
        let full = AttachmentRef {
            id: attachment.id.clone(),
            name: full.name.or_else(|| attachment.name.clone()),
            kind: full.kind.or_else(|| attachment.kind.clone()),
            ..full
        };

        let content = self
            .attachments
            .download_content(&attachment.id, format, &[])
            .await?;
        let extension = resolve_extension(&full, category, content.format.as_deref());

        let path = self.storage.write_attachment(
            &record.record_id,
            &full,
            category,
            &content.bytes,
            &extension,
        )?;
        Ok(path)
    }
}
