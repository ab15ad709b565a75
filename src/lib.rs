//! Rev Exporter Core Library
//!
//! This library provides the core functionality for the `rev-exporter` tool,
//! which incrementally mirrors Rev.com orders, their media and their
//! transcripts onto local disk without re-downloading anything already fetched.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`api`] - Transport primitive, retry decorator and the authenticated Rev client
//! - [`config`] - Credential discovery and client configuration
//! - [`model`] - Typed order/attachment records built from API responses
//! - [`orders`] - Paginated order enumeration with a date cutoff
//! - [`attachments`] - Attachment classification, format fallback, extension resolution
//! - [`ledger`] - Persisted set of already-downloaded attachment ids
//! - [`storage`] - Deterministic on-disk export layout
//! - [`sync`] - Sequential sync driver and run summary
//! - [`inventory`] - Scans an export tree for downstream viewers

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod attachments;
pub mod config;
pub mod inventory;
pub mod ledger;
pub mod model;
pub mod orders;
pub mod storage;
pub mod sync;

mod user_agent;

// Re-export commonly used types
pub use api::{
    ApiError, ApiRequest, ApiResponse, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, FailureType,
    Method, ReqwestTransport, RetryDecision, RetryPolicy, RetryingTransport, RevClient, Sleeper,
    TokioSleeper, Transport, classify_error,
};
pub use attachments::{
    AttachmentCategory, AttachmentClient, AttachmentError, FetchedContent, classify,
    is_previewable, preferred_format, resolve_extension, resolve_real_extension,
};
pub use config::{ClientConfig, ConfigError, CredentialSearch, CredentialSource, Credentials};
pub use inventory::{InventoryFile, RecordInventory, scan_export};
pub use ledger::{DownloadLedger, LEDGER_FILE_NAME, LedgerError};
pub use model::{AttachmentRef, ModelError, Record};
pub use orders::{DEFAULT_PAGE_SIZE, OrderClient, OrderError, OrderPage, RecordPager};
pub use storage::{METADATA_FILE_NAME, RecordLayout, StorageError, StorageLayout};
pub use sync::{FAILURE_PREVIEW_LIMIT, SyncDriver, SyncError, SyncOptions, SyncSummary};
