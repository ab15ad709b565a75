//! File-name sanitization for exported attachments.

use std::path::{Component, Path};

use sha2::{Digest, Sha256};

/// Maximum length, in characters, of a sanitized name and of a final file name.
pub const MAX_FILENAME_CHARS: usize = 200;

/// Maximum length, in bytes, of a path component on common filesystems.
pub const MAX_FILENAME_BYTES: usize = 255;

/// Suffix of the sibling temp file used while a file is being written.
pub const PART_SUFFIX: &str = ".part";

/// Byte budget of a final name, leaving room for [`PART_SUFFIX`].
const NAME_BYTE_BUDGET: usize = MAX_FILENAME_BYTES - PART_SUFFIX.len();

/// Name used when an attachment has no usable display name.
pub const DEFAULT_STEM: &str = "attachment";

/// Sanitizes a display name for use as a file-name component.
///
/// Replaces characters that are invalid on common filesystems
/// (`< > : " / \ | ? *`) and control characters with `_`, trims leading and
/// trailing spaces and dots, and caps the result at [`MAX_FILENAME_CHARS`]
/// characters and at a byte length that still fits [`MAX_FILENAME_BYTES`]
/// once [`PART_SUFFIX`] is appended.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = trim_spaces_and_dots(&replaced);
    let capped: String = trimmed.chars().take(MAX_FILENAME_CHARS).collect();
    let capped = truncate_to_bytes(&capped, NAME_BYTE_BUDGET);
    // Capping can expose a trailing space or dot.
    trim_spaces_and_dots(capped).to_string()
}

/// Builds `<attachment_id>_<sanitized name><extension>`, at most
/// [`MAX_FILENAME_CHARS`] characters long and short enough in bytes for its
/// `.part` temp sibling to fit [`MAX_FILENAME_BYTES`].
///
/// A display name already ending in `extension` loses that suffix first, so
/// `transcript.json` with `.json` becomes `<id>_transcript.json`. When the
/// result would be too long the name part is shortened; the id and extension
/// are kept intact.
#[must_use]
pub fn build_attachment_filename(attachment_id: &str, display_name: Option<&str>, extension: &str) -> String {
    let id = sanitize_filename(attachment_id);
    let extension = sanitize_extension(extension);

    let mut stem = display_name.map(sanitize_filename).unwrap_or_default();
    if !extension.is_empty() && ends_with_ignore_case(&stem, &extension) {
        let cut = stem.len() - extension.len();
        stem.truncate(cut);
        stem = trim_spaces_and_dots(&stem).to_string();
    }
    if stem.is_empty() || !is_safe_filename_segment(&stem) {
        stem = DEFAULT_STEM.to_string();
    }

    let fixed_chars = id.chars().count() + 1 + extension.chars().count();
    let char_budget = MAX_FILENAME_CHARS.saturating_sub(fixed_chars).max(1);
    let fixed_bytes = id.len() + 1 + extension.len();
    let byte_budget = NAME_BYTE_BUDGET.saturating_sub(fixed_bytes).max(1);
    if stem.chars().count() > char_budget || stem.len() > byte_budget {
        let by_chars: String = stem.chars().take(char_budget).collect();
        stem = trim_spaces_and_dots(truncate_to_bytes(&by_chars, byte_budget)).to_string();
        if stem.is_empty() {
            stem = "_".to_string();
        }
    }

    let name = format!("{id}_{stem}{extension}");
    if name.chars().count() > MAX_FILENAME_CHARS || name.len() > NAME_BYTE_BUDGET {
        // Only reachable with a pathological id or extension.
        let by_chars: String = name.chars().take(MAX_FILENAME_CHARS).collect();
        return truncate_to_bytes(&by_chars, NAME_BYTE_BUDGET).to_string();
    }
    name
}

/// Hex digits of the id digest appended to altered record directory names.
const RECORD_DIR_DIGEST_HEX: usize = 8;

/// Directory name for a record.
///
/// Ids that are already safe file names are used as-is. An id that
/// sanitization alters (illegal characters, trimming, truncation) gets
/// `-<8 hex digits of its SHA-256>` appended, so `a/b` and `a:b` land in
/// `a_b-<digest>` directories that differ.
#[must_use]
pub fn record_dir_name(record_id: &str) -> String {
    let sanitized = sanitize_filename(record_id);
    if !sanitized.is_empty() && sanitized == record_id && is_safe_filename_segment(&sanitized) {
        return sanitized;
    }

    let digest = hex_prefix(&Sha256::digest(record_id.as_bytes()), RECORD_DIR_DIGEST_HEX);
    let base_budget = MAX_FILENAME_BYTES - RECORD_DIR_DIGEST_HEX - 1;
    let base = trim_spaces_and_dots(truncate_to_bytes(&sanitized, base_budget));
    let base = if base.is_empty() { "_" } else { base };
    format!("{base}-{digest}")
}

fn hex_prefix(bytes: &[u8], digits: usize) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(digits);
    for byte in bytes.iter().take(digits.div_ceil(2)) {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out.truncate(digits);
    out
}

/// Longest prefix of `value` that is at most `max_bytes` long and ends on a
/// char boundary.
fn truncate_to_bytes(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn sanitize_extension(extension: &str) -> String {
    let body: String = extension
        .trim_start_matches('.')
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    if body.is_empty() {
        String::new()
    } else {
        format!(".{}", body.to_lowercase())
    }
}

fn ends_with_ignore_case(value: &str, suffix: &str) -> bool {
    value.len() > suffix.len()
        && value.is_char_boundary(value.len() - suffix.len())
        && value[value.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

fn trim_spaces_and_dots(value: &str) -> &str {
    value.trim_matches(|c| c == ' ' || c == '.')
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
