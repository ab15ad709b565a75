//! Inventory of an export tree, as consumed by downstream viewers.
//!
//! Every non-hidden directory under the export root is treated as a record.
//! Files are listed per category directory with their real extension and
//! whether a viewer can preview them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::attachments::{is_previewable, resolve_real_extension};
use crate::storage::{MEDIA_DIR, METADATA_FILE_NAME, OTHER_DIR, TRANSCRIPTS_DIR};

/// One exported file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryFile {
    /// File name.
    pub name: String,
    /// Path relative to the export root, with forward slashes.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Extension describing the content (see [`resolve_real_extension`]).
    pub extension: String,
    /// Whether a viewer can preview the file inline.
    pub previewable: bool,
}

/// Files and metadata of one exported record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordInventory {
    /// Record directory name.
    pub record_id: String,
    /// Status from the metadata file, when readable.
    pub status: Option<String>,
    /// Placement time from the metadata file, as written.
    pub placed_at: Option<String>,
    /// Attachment entries from the metadata file.
    pub attachments: Vec<Value>,
    /// Files under `media/`.
    pub media_files: Vec<InventoryFile>,
    /// Files under `transcripts/`.
    pub transcript_files: Vec<InventoryFile>,
    /// Files under `other/`.
    pub other_files: Vec<InventoryFile>,
}

impl RecordInventory {
    /// Total number of listed files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.media_files.len() + self.transcript_files.len() + self.other_files.len()
    }
}

/// Scans `export_root`, returning records sorted by directory name.
///
/// A missing root yields an empty list. An unreadable or corrupt metadata
/// file leaves the record's metadata fields empty.
///
/// # Errors
///
/// Returns an I/O error when an existing directory cannot be listed.
pub fn scan_export(export_root: &Path) -> io::Result<Vec<RecordInventory>> {
    if !export_root.is_dir() {
        debug!(root = %export_root.display(), "export root does not exist");
        return Ok(Vec::new());
    }

    let mut record_dirs: Vec<PathBuf> = fs::read_dir(export_root)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && !is_hidden(path))
        .collect();
    record_dirs.sort();

    record_dirs
        .iter()
        .map(|dir| scan_record(export_root, dir))
        .collect()
}

fn scan_record(export_root: &Path, dir: &Path) -> io::Result<RecordInventory> {
    let record_id = file_name_string(dir);
    let metadata = read_metadata(&dir.join(METADATA_FILE_NAME));
    let field = |key: &str| {
        metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Ok(RecordInventory {
        status: field("status"),
        placed_at: field("placed_at"),
        attachments: metadata
            .as_ref()
            .and_then(|m| m.get("attachments"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        media_files: scan_files(export_root, &dir.join(MEDIA_DIR))?,
        transcript_files: scan_files(export_root, &dir.join(TRANSCRIPTS_DIR))?,
        other_files: scan_files(export_root, &dir.join(OTHER_DIR))?,
        record_id,
    })
}

fn read_metadata(path: &Path) -> Option<Value> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return None,
        Err(error) => {
            warn!(path = %path.display(), %error, "could not read record metadata");
            return None;
        }
    };
    match serde_json::from_slice::<Value>(&raw) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) | Err(_) => {
            warn!(path = %path.display(), "ignoring corrupt record metadata");
            None
        }
    }
}

fn scan_files(export_root: &Path, dir: &Path) -> io::Result<Vec<InventoryFile>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let name = file_name_string(&path);
        if name == METADATA_FILE_NAME || name.ends_with(".part") {
            continue;
        }
        let size = fs::metadata(&path)?.len();
        let relative = path.strip_prefix(export_root).unwrap_or(&path);
        let web_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(InventoryFile {
            extension: resolve_real_extension(&name),
            previewable: is_previewable(&name),
            path: web_path,
            size,
            name,
        });
    }
    Ok(files)
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(scan_export(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_scan_lists_files_with_real_extensions() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(
            &root.join("12345").join(METADATA_FILE_NAME),
            &json!({
                "record_id": "12345",
                "status": "Complete",
                "placed_at": "2024-03-01T10:15:00+00:00",
                "attachments": [{"id": "a1901"}]
            })
            .to_string(),
        );
        write(&root.join("12345/transcripts/a1901_notes.docx.json"), "{}");
        write(&root.join("12345/transcripts/a1902_clip.srt.srt"), "1");
        write(&root.join("12345/media/a2100_audio.mp3"), "ID3");
        write(&root.join("12345/other/a3000_blob.bin"), "");

        let records = scan_export(root).unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.record_id, "12345");
        assert_eq!(record.status.as_deref(), Some("Complete"));
        assert_eq!(record.attachments.len(), 1);
        assert_eq!(record.file_count(), 4);

        let docx = &record.transcript_files[0];
        assert_eq!(docx.name, "a1901_notes.docx.json");
        assert_eq!(docx.path, "12345/transcripts/a1901_notes.docx.json");
        assert_eq!(docx.extension, ".docx");
        assert!(docx.previewable);
        assert_eq!(docx.size, 2);

        let srt = &record.transcript_files[1];
        assert_eq!(srt.extension, ".srt");
        assert!(srt.previewable);

        let audio = &record.media_files[0];
        assert_eq!(audio.extension, ".mp3");
        assert!(!audio.previewable);
    }

    #[test]
    fn test_hidden_entries_and_ledger_are_ignored() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(&root.join(".rev-exporter-index.json"), "{}");
        write(&root.join(".cache/media/x.mp3"), "");
        write(&root.join("b/other/x.bin"), "");
        write(&root.join("a/other/y.bin"), "");

        let records = scan_export(root).unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.record_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_corrupt_metadata_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(&root.join("r1").join(METADATA_FILE_NAME), "{oops");
        write(&root.join("r1/transcripts/t_notes.txt"), "hello");

        let records = scan_export(root).unwrap();

        assert_eq!(records[0].status, None);
        assert!(records[0].attachments.is_empty());
        assert_eq!(records[0].transcript_files.len(), 1);
    }
}
