//! Deterministic on-disk export layout.
//!
//! ```text
//! <export_root>/
//!   .rev-exporter-index.json
//!   <record_id>/
//!     metadata.json
//!     media/
//!     transcripts/      (transcripts and captions)
//!     other/
//! ```
//!
//! Directories are created lazily and idempotently. Every file is written to a
//! sibling temp file and renamed into place, so a crash never leaves a
//! truncated file under its final name.

mod filename;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::attachments::AttachmentCategory;
use crate::model::{AttachmentRef, Record};

pub use filename::{
    MAX_FILENAME_BYTES, MAX_FILENAME_CHARS, PART_SUFFIX, build_attachment_filename,
    record_dir_name, sanitize_filename,
};

/// Per-record metadata file name.
pub const METADATA_FILE_NAME: &str = "metadata.json";
/// Sub-directory for media files.
pub const MEDIA_DIR: &str = "media";
/// Sub-directory for transcripts and captions.
pub const TRANSCRIPTS_DIR: &str = "transcripts";
/// Sub-directory for everything else.
pub const OTHER_DIR: &str = "other";

/// Errors raised while writing the export tree.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A directory or file operation failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Record metadata could not be serialized.
    #[error("failed to serialize metadata for {path}: {source}")]
    Serialize {
        /// Metadata file path.
        path: PathBuf,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directories of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    /// `<export_root>/<record_id>`
    pub root: PathBuf,
    /// Media directory.
    pub media: PathBuf,
    /// Transcript and caption directory.
    pub transcripts: PathBuf,
    /// Catch-all directory.
    pub other: PathBuf,
}

impl RecordLayout {
    /// Directory an attachment of `category` is written to.
    #[must_use]
    pub fn dir_for(&self, category: AttachmentCategory) -> &Path {
        match category {
            AttachmentCategory::Media => &self.media,
            AttachmentCategory::Transcript | AttachmentCategory::Caption => &self.transcripts,
            AttachmentCategory::Other => &self.other,
        }
    }

    /// Path of the record metadata file.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE_NAME)
    }
}

#[derive(Serialize)]
struct RecordMetadataFile<'a> {
    record_id: &'a str,
    status: &'a str,
    placed_at: Option<String>,
    attachments: Vec<AttachmentMetadataEntry<'a>>,
}

#[derive(Serialize)]
struct AttachmentMetadataEntry<'a> {
    id: &'a str,
    name: Option<&'a str>,
    #[serde(rename = "type")]
    kind: Option<&'a str>,
    download_uri: Option<&'a str>,
}

/// Writer for the export tree rooted at one directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    export_root: PathBuf,
}

impl StorageLayout {
    /// Creates a layout rooted at `export_root`. Nothing is created yet.
    #[must_use]
    pub fn new(export_root: impl Into<PathBuf>) -> Self {
        Self {
            export_root: export_root.into(),
        }
    }

    /// Export root directory.
    #[must_use]
    pub fn export_root(&self) -> &Path {
        &self.export_root
    }

    /// Directory paths for a record, without touching the filesystem.
    ///
    /// The directory is named by [`record_dir_name`]: ids that need
    /// sanitizing carry a digest suffix so distinct ids never share a directory.
    #[must_use]
    pub fn record_layout(&self, record_id: &str) -> RecordLayout {
        let root = self.export_root.join(record_dir_name(record_id));
        RecordLayout {
            media: root.join(MEDIA_DIR),
            transcripts: root.join(TRANSCRIPTS_DIR),
            other: root.join(OTHER_DIR),
            root,
        }
    }

    /// Creates (if needed) and returns the directories of a record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when a directory cannot be created.
    pub fn ensure_layout(&self, record_id: &str) -> Result<RecordLayout, StorageError> {
        let layout = self.record_layout(record_id);
        for dir in [&layout.media, &layout.transcripts, &layout.other] {
            fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        }
        Ok(layout)
    }

    /// Writes attachment bytes and returns the final path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the file cannot be written.
    #[instrument(skip(self, attachment, bytes), fields(attachment_id = %attachment.id, size = bytes.len()))]
    pub fn write_attachment(
        &self,
        record_id: &str,
        attachment: &AttachmentRef,
        category: AttachmentCategory,
        bytes: &[u8],
        extension: &str,
    ) -> Result<PathBuf, StorageError> {
        let layout = self.ensure_layout(record_id)?;
        let file_name = build_attachment_filename(&attachment.id, attachment.name.as_deref(), extension);
        let path = layout.dir_for(category).join(file_name);
        write_atomic(&path, bytes)?;
        debug!(path = %path.display(), "attachment written");
        Ok(path)
    }

    /// Writes `<record_id>/metadata.json` and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when serialization or the write fails.
    pub fn write_record_metadata(&self, record: &Record) -> Result<PathBuf, StorageError> {
        let layout = self.ensure_layout(&record.record_id)?;
        let path = layout.metadata_path();
        let file = RecordMetadataFile {
            record_id: &record.record_id,
            status: &record.status,
            placed_at: record.placed_at.map(|ts| ts.to_rfc3339()),
            attachments: record
                .attachments
                .iter()
                .map(|a| AttachmentMetadataEntry {
                    id: &a.id,
                    name: a.name.as_deref(),
                    kind: a.kind.as_deref(),
                    download_uri: a.download_uri.as_deref(),
                })
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| StorageError::Serialize {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &json)?;
        debug!(record_id = %record.record_id, path = %path.display(), "record metadata written");
        Ok(path)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut tmp_name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    tmp_name.push(PART_SUFFIX);
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = File::create(&tmp_path).map_err(|e| StorageError::io(&tmp_path, e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| StorageError::io(&tmp_path, e))?;
    drop(file);
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StorageError::io(path, e)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Value, json};
    use tempfile::TempDir;

    use super::*;

    fn attachment(id: &str, name: Option<&str>) -> AttachmentRef {
        AttachmentRef {
            id: id.to_string(),
            name: name.map(str::to_string),
            kind: None,
            download_uri: None,
            metadata: Value::Null,
        }
    }

    #[test]
    fn test_ensure_layout_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path());

        let first = storage.ensure_layout("12345").unwrap();
        let second = storage.ensure_layout("12345").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.root, dir.path().join("12345"));
        assert!(first.media.is_dir());
        assert!(first.transcripts.is_dir());
        assert!(first.other.is_dir());
    }

    #[test]
    fn test_caption_routes_to_transcripts() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path());

        let path = storage
            .write_attachment(
                "12345",
                &attachment("c1", Some("clip.srt")),
                AttachmentCategory::Caption,
                b"1\n00:00:00,000 --> 00:00:01,000\nhi\n",
                ".srt",
            )
            .unwrap();

        assert_eq!(path, dir.path().join("12345").join("transcripts").join("c1_clip.srt"));
        assert!(fs::read(&path).unwrap().starts_with(b"1\n"));
    }

    #[test]
    fn test_categories_route_to_their_dirs() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path());

        let media = storage
            .write_attachment("r", &attachment("m1", Some("a.mp3")), AttachmentCategory::Media, b"x", ".mp3")
            .unwrap();
        let other = storage
            .write_attachment("r", &attachment("o1", None), AttachmentCategory::Other, b"x", ".bin")
            .unwrap();

        assert_eq!(media, dir.path().join("r").join("media").join("m1_a.mp3"));
        assert_eq!(other, dir.path().join("r").join("other").join("o1_attachment.bin"));
        assert!(!dir.path().join("r").join("other").join("o1_attachment.bin.part").exists());
    }

    #[test]
    fn test_rewrite_replaces_content() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path());
        let att = attachment("t1", Some("notes.txt"));

        storage
            .write_attachment("r", &att, AttachmentCategory::Transcript, b"old", ".txt")
            .unwrap();
        let path = storage
            .write_attachment("r", &att, AttachmentCategory::Transcript, b"new", ".txt")
            .unwrap();

        assert_eq!(fs::read(path).unwrap(), b"new");
    }

    #[test]
    fn test_write_record_metadata_shape() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path());
        let record = Record::from_value(json!({
            "order_number": "12345",
            "status": "Complete",
            "placed_on": "2024-03-01T10:15:00Z",
            "attachments": [
                {"id": "a1901", "name": "transcript.json", "type": "transcript", "extra": 1}
            ]
        }))
        .unwrap();

        let path = storage.write_record_metadata(&record).unwrap();

        assert_eq!(path, dir.path().join("12345").join(METADATA_FILE_NAME));
        let written: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            written,
            json!({
                "record_id": "12345",
                "status": "Complete",
                "placed_at": "2024-03-01T10:15:00+00:00",
                "attachments": [
                    {"id": "a1901", "name": "transcript.json", "type": "transcript", "download_uri": null}
                ]
            })
        );
    }

    #[test]
    fn test_hostile_record_id_stays_inside_root() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path());

        let layout = storage.ensure_layout("../escape").unwrap();

        assert!(layout.root.starts_with(dir.path()));
        assert_eq!(layout.root.parent(), Some(dir.path()));
        let dir_name = layout.root.file_name().unwrap().to_str().unwrap();
        assert!(dir_name.starts_with("_escape-"), "{dir_name}");
    }

    #[test]
    fn test_sanitized_record_ids_do_not_share_a_directory() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path());

        let slash = storage
            .write_attachment("a/b", &attachment("x1", Some("n.txt")), AttachmentCategory::Transcript, b"1", ".txt")
            .unwrap();
        let colon = storage
            .write_attachment("a:b", &attachment("x1", Some("n.txt")), AttachmentCategory::Transcript, b"2", ".txt")
            .unwrap();

        assert_ne!(slash, colon);
        assert_eq!(fs::read(slash).unwrap(), b"1");
        assert_eq!(fs::read(colon).unwrap(), b"2");
    }

    #[test]
    fn test_long_multibyte_name_is_written() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path());
        let name = "会議".repeat(50);

        let path = storage
            .write_attachment(
                "r1",
                &attachment("a1", Some(&name)),
                AttachmentCategory::Transcript,
                b"minutes",
                ".txt",
            )
            .unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"minutes");
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.len() + PART_SUFFIX.len() <= MAX_FILENAME_BYTES);
        assert!(file_name.starts_with("a1_会議"));
        assert!(file_name.ends_with(".txt"));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file").unwrap();
        let storage = StorageLayout::new(&blocker);

        let result = storage.write_attachment(
            "r",
            &attachment("a", None),
            AttachmentCategory::Other,
            b"x",
            ".bin",
        );

        assert!(matches!(result, Err(StorageError::Io { .. })));
    }
}
