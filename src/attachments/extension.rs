//! Double-extension repair for exported file names.
//!
//! The API can serve a transcript as `notes.docx.json` or a caption as
//! `clip.srt.srt`; these helpers recover the extension that describes the
//! actual content and decide whether a viewer can preview it.

use std::path::Path;

/// Extensions that describe transcript/caption content.
const CONTENT_EXTENSIONS: [&str; 3] = [".docx", ".srt", ".txt"];

/// Wrapper extension that may follow a content extension.
const WRAPPER_EXTENSION: &str = ".json";

/// Suffixes under which a `.json` file still holds previewable content.
const WRAPPED_PREVIEWABLE: [&str; 6] = [".docx", ".srt", ".txt", ".mp4", ".m4a", ".mp3"];

/// Extensions a viewer can render inline.
const PREVIEWABLE_EXTENSIONS: [&str; 3] = [".docx", ".txt", ".srt"];

/// Returns the extension (lower-cased, with leading dot) describing a file's content.
///
/// First match wins:
/// 1. a repeated content extension (`.srt.srt`) collapses to one
/// 2. a content extension wrapped in `.json` yields the content extension
/// 3. two different content extensions yield the first
/// 4. a single content extension
/// 5. the last extension, or an empty string when there is none
#[must_use]
pub fn resolve_real_extension(name: &str) -> String {
    let name = name.to_lowercase();

    if let Some(ext) = CONTENT_EXTENSIONS
        .iter()
        .find(|ext| name.ends_with(&format!("{ext}{ext}")))
    {
        return (*ext).to_string();
    }

    if let Some(ext) = CONTENT_EXTENSIONS
        .iter()
        .find(|ext| name.ends_with(&format!("{ext}{WRAPPER_EXTENSION}")))
    {
        return (*ext).to_string();
    }

    for first in CONTENT_EXTENSIONS {
        for second in CONTENT_EXTENSIONS {
            if first != second && name.ends_with(&format!("{first}{second}")) {
                return first.to_string();
            }
        }
    }

    if let Some(ext) = CONTENT_EXTENSIONS.iter().find(|ext| name.ends_with(*ext)) {
        return (*ext).to_string();
    }

    last_extension(&name)
}

/// Returns true when a viewer can preview the file inline.
#[must_use]
pub fn is_previewable(name: &str) -> bool {
    let lower = name.to_lowercase();
    if lower.ends_with(WRAPPER_EXTENSION) {
        return WRAPPED_PREVIEWABLE
            .iter()
            .any(|ext| lower.ends_with(&format!("{ext}{WRAPPER_EXTENSION}")));
    }
    PREVIEWABLE_EXTENSIONS.contains(&resolve_real_extension(&lower).as_str())
}

fn last_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}
