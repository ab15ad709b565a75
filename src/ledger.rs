//! Persisted set of attachment ids whose bytes are already on disk.
//!
//! The ledger is consulted before any network fetch and written through on
//! every mark, so an interrupted run loses at most the attachment in flight.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Ledger file name inside the export root.
pub const LEDGER_FILE_NAME: &str = ".rev-exporter-index.json";

/// Errors raised while persisting the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Writing or renaming the ledger file failed.
    #[error("failed to persist ledger {path}: {source}")]
    Io {
        /// Ledger path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The ledger could not be serialized.
    #[error("failed to serialize ledger: {source}")]
    Serialize {
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

impl LedgerError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    downloaded_attachments: Vec<String>,
    #[serde(default)]
    last_updated: Option<String>,
}

/// Set of downloaded attachment ids backed by a JSON file.
#[derive(Debug)]
pub struct DownloadLedger {
    path: PathBuf,
    ids: BTreeSet<String>,
    last_updated: Option<String>,
}

impl DownloadLedger {
    /// Loads the ledger stored in `export_root`.
    #[must_use]
    pub fn for_export_root(export_root: &Path) -> Self {
        Self::load(export_root.join(LEDGER_FILE_NAME))
    }

    /// Loads a ledger from `path`.
    ///
    /// A missing file yields an empty ledger. An unreadable or corrupt file
    /// also yields an empty ledger, with a warning; it is never fatal.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<LedgerFile>(&raw) {
                Ok(file) => file,
                Err(error) => {
                    warn!(path = %path.display(), %error, "ledger is corrupt, starting empty");
                    LedgerFile::default()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no ledger yet");
                LedgerFile::default()
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "could not read ledger, starting empty");
                LedgerFile::default()
            }
        };

        let ids: BTreeSet<String> = file.downloaded_attachments.into_iter().collect();
        debug!(path = %path.display(), count = ids.len(), "loaded ledger");
        Self {
            path,
            ids,
            last_updated: file.last_updated,
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true when `attachment_id` is already persisted.
    #[must_use]
    pub fn is_downloaded(&self, attachment_id: &str) -> bool {
        self.ids.contains(attachment_id)
    }

    /// Number of recorded ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Recorded ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Timestamp of the last successful write, as stored in the file.
    #[must_use]
    pub fn last_updated(&self) -> Option<&str> {
        self.last_updated.as_deref()
    }

    /// Records `attachment_id` and writes the ledger through to disk.
    ///
    /// The id is kept in memory even when the write fails.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the file cannot be written.
    pub fn mark_downloaded(&mut self, attachment_id: &str) -> Result<(), LedgerError> {
        if !self.ids.insert(attachment_id.to_string()) {
            return Ok(());
        }
        self.save()
    }

    /// Writes the whole set to disk via a sibling temp file and rename.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when serialization or any file operation fails.
    pub fn save(&mut self) -> Result<(), LedgerError> {
        let timestamp = Utc::now().to_rfc3339();
        let file = LedgerFile {
            downloaded_attachments: self.ids.iter().cloned().collect(),
            last_updated: Some(timestamp.clone()),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| LedgerError::Serialize { source })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }

        let tmp_path = temp_sibling(&self.path);
        let mut tmp = File::create(&tmp_path).map_err(|e| LedgerError::io(&tmp_path, e))?;
        tmp.write_all(&json)
            .and_then(|()| tmp.sync_all())
            .map_err(|e| LedgerError::io(&tmp_path, e))?;
        drop(tmp);
        fs::rename(&tmp_path, &self.path).map_err(|e| LedgerError::io(&self.path, e))?;

        self.last_updated = Some(timestamp);
        debug!(path = %self.path.display(), count = self.ids.len(), "ledger saved");
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = DownloadLedger::for_export_root(dir.path());
        assert!(ledger.is_empty());
        assert_eq!(ledger.path(), dir.path().join(LEDGER_FILE_NAME));
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LEDGER_FILE_NAME), "{\"downloaded_attachments\": [").unwrap();

        let ledger = DownloadLedger::for_export_root(dir.path());

        assert!(ledger.is_empty());
    }

    #[test]
    fn test_wrong_shape_loads_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LEDGER_FILE_NAME), "[\"a1\"]").unwrap();
        assert!(DownloadLedger::for_export_root(dir.path()).is_empty());
    }

    #[test]
    fn test_round_trip_preserves_id_set() {
        let dir = TempDir::new().unwrap();
        let mut ledger = DownloadLedger::for_export_root(dir.path());
        for id in ["b2", "a1", "c3"] {
            ledger.mark_downloaded(id).unwrap();
        }

        let reloaded = DownloadLedger::for_export_root(dir.path());

        assert_eq!(reloaded.ids().collect::<Vec<_>>(), vec!["a1", "b2", "c3"]);
        assert!(reloaded.is_downloaded("b2"));
        assert!(!reloaded.is_downloaded("d4"));
        assert!(reloaded.last_updated().is_some());
    }

    #[test]
    fn test_file_format_is_sorted_with_timestamp() {
        let dir = TempDir::new().unwrap();
        let mut ledger = DownloadLedger::for_export_root(dir.path());
        ledger.mark_downloaded("z9").unwrap();
        ledger.mark_downloaded("a1").unwrap();

        let raw = fs::read_to_string(dir.path().join(LEDGER_FILE_NAME)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["downloaded_attachments"], serde_json::json!(["a1", "z9"]));
        let stamp = value["last_updated"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok(), "bad stamp {stamp}");
        assert!(!dir.path().join(format!("{LEDGER_FILE_NAME}.tmp")).exists());
    }

    #[test]
    fn test_mark_is_written_through_immediately() {
        let dir = TempDir::new().unwrap();
        let mut first = DownloadLedger::for_export_root(dir.path());
        first.mark_downloaded("a1").unwrap();

        // A second process started now sees the mark.
        assert!(DownloadLedger::for_export_root(dir.path()).is_downloaded("a1"));
    }

    #[test]
    fn test_loads_file_without_timestamp() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(LEDGER_FILE_NAME),
            r#"{"downloaded_attachments": ["x"]}"#,
        )
        .unwrap();

        let ledger = DownloadLedger::for_export_root(dir.path());

        assert!(ledger.is_downloaded("x"));
        assert_eq!(ledger.last_updated(), None);
    }

    #[test]
    fn test_persist_failure_keeps_in_memory_mark() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();
        let mut ledger = DownloadLedger::load(blocker.join(LEDGER_FILE_NAME));

        let result = ledger.mark_downloaded("a1");

        assert!(matches!(result, Err(LedgerError::Io { .. })));
        assert!(ledger.is_downloaded("a1"));
    }
}
