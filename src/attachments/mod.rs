//! Attachment classification, content fetching and extension resolution.
//!
//! Classification uses only the declared `type` and the display name:
//! keyword groups are tested in priority order (transcript, caption, media)
//! and the first group with a substring hit in either field wins.

mod extension;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::api::{ApiError, RevClient};
use crate::model::{AttachmentRef, ModelError};

pub use extension::{is_previewable, resolve_real_extension};

const TRANSCRIPT_KEYWORDS: [&str; 5] = ["transcript", "transcription", "txt", "json", "docx"];
const CAPTION_KEYWORDS: [&str; 4] = ["caption", "srt", "vtt", "subtitle"];
const MEDIA_KEYWORDS: [&str; 9] = [
    "media", "audio", "video", "mp3", "mp4", "wav", "m4a", "mov", "avi",
];

/// Trailing `.ext` of a display name.
#[allow(clippy::expect_used)]
static NAME_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.([a-z0-9]+)$").expect("valid regex"));

/// Content category of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentCategory {
    /// Audio or video.
    Media,
    /// Transcript document.
    Transcript,
    /// Caption/subtitle track.
    Caption,
    /// Anything unrecognized.
    Other,
}

impl AttachmentCategory {
    /// Stable lower-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Transcript => "transcript",
            Self::Caption => "caption",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AttachmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an attachment by its declared type and display name.
#[must_use]
pub fn classify(attachment: &AttachmentRef) -> AttachmentCategory {
    let kind = attachment.kind.as_deref().unwrap_or_default().to_lowercase();
    let name = attachment.name.as_deref().unwrap_or_default().to_lowercase();
    let hit = |keywords: &[&str]| {
        keywords
            .iter()
            .any(|keyword| kind.contains(keyword) || name.contains(keyword))
    };

    if hit(&TRANSCRIPT_KEYWORDS) {
        AttachmentCategory::Transcript
    } else if hit(&CAPTION_KEYWORDS) {
        AttachmentCategory::Caption
    } else if hit(&MEDIA_KEYWORDS) {
        AttachmentCategory::Media
    } else {
        AttachmentCategory::Other
    }
}

/// Format to request first for a category; `None` means the server default.
///
/// A hint only: [`AttachmentClient::download_content`] falls back when the
/// server does not offer it.
#[must_use]
pub fn preferred_format(category: AttachmentCategory, _attachment: &AttachmentRef) -> Option<&'static str> {
    match category {
        AttachmentCategory::Transcript => Some("json"),
        AttachmentCategory::Caption => Some("srt"),
        AttachmentCategory::Media | AttachmentCategory::Other => None,
    }
}

/// On-disk extension (with leading dot) for downloaded content.
///
/// The format actually served wins; then the display name's own extension;
/// then a per-category default.
#[must_use]
pub fn resolve_extension(
    attachment: &AttachmentRef,
    category: AttachmentCategory,
    format_used: Option<&str>,
) -> String {
    if let Some(format) = format_used.filter(|f| !f.is_empty()) {
        return format!(".{format}");
    }

    if let Some(captures) = attachment
        .name
        .as_deref()
        .and_then(|name| NAME_EXTENSION.captures(name))
    {
        return format!(".{}", captures[1].to_lowercase());
    }

    match category {
        AttachmentCategory::Transcript => ".txt",
        AttachmentCategory::Caption => ".srt",
        AttachmentCategory::Media => ".mp3",
        AttachmentCategory::Other => ".bin",
    }
    .to_string()
}

/// Errors from attachment endpoints.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// Every content variant failed.
    #[error("content not available for attachment {attachment_id}: {last_error}")]
    NotAvailable {
        /// Attachment that was requested.
        attachment_id: String,
        /// Failure of the final, unsuffixed attempt.
        #[source]
        last_error: ApiError,
    },

    /// The metadata call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The metadata payload could not be decoded.
    #[error("malformed attachment {attachment_id}: {source}")]
    Malformed {
        /// Attachment that was requested.
        attachment_id: String,
        /// Decode failure.
        #[source]
        source: ModelError,
    },
}

/// Downloaded content and the format variant that served it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    /// Response body.
    pub bytes: Vec<u8>,
    /// Format suffix of the successful endpoint; `None` for the bare endpoint.
    pub format: Option<String>,
}

/// Metadata and content operations over `/attachments`.
#[derive(Debug, Clone)]
pub struct AttachmentClient {
    client: RevClient,
}

impl AttachmentClient {
    /// Wraps an API client.
    #[must_use]
    pub fn new(client: RevClient) -> Self {
        Self { client }
    }

    /// Fetches full metadata for one attachment.
    ///
    /// A payload without an `id` is attributed to `attachment_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::Api`] on request failure or
    /// [`AttachmentError::Malformed`] for an undecodable payload.
    #[instrument(skip(self))]
    pub async fn get_metadata(&self, attachment_id: &str) -> Result<AttachmentRef, AttachmentError> {
        let path = format!("/attachments/{}", urlencoding::encode(attachment_id));
        let mut value: Value = self.client.get_json(&path, &[]).await?;
        if let Some(object) = value.as_object_mut() {
            let has_id = match object.get("id") {
                None | Some(Value::Null) => false,
                Some(Value::String(id)) => !id.is_empty(),
                Some(_) => true,
            };
            if !has_id {
                debug!("metadata payload has no id, using the requested one");
                object.insert("id".to_string(), Value::String(attachment_id.to_string()));
            }
        }
        AttachmentRef::from_value(value).map_err(|source| AttachmentError::Malformed {
            attachment_id: attachment_id.to_string(),
            source,
        })
    }

    /// Downloads attachment content, falling back across format variants.
    ///
    /// Tries `content.<format>`, then each preferred format in order, then the
    /// bare `content` endpoint. Failed variants are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::NotAvailable`] when the bare endpoint fails too.
    #[instrument(skip(self, preferred_formats))]
    pub async fn download_content(
        &self,
        attachment_id: &str,
        format: Option<&str>,
        preferred_formats: &[&str],
    ) -> Result<FetchedContent, AttachmentError> {
        let encoded = urlencoding::encode(attachment_id);

        let mut candidates: Vec<&str> = Vec::new();
        for candidate in format.into_iter().chain(preferred_formats.iter().copied()) {
            if !candidate.is_empty() && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }

        for (index, candidate) in candidates.iter().enumerate() {
            let path = format!("/attachments/{encoded}/content.{candidate}");
            match self.client.get_bytes(&path).await {
                Ok(bytes) => {
                    debug!(format = candidate, size = bytes.len(), "downloaded content");
                    return Ok(FetchedContent {
                        bytes,
                        format: Some((*candidate).to_string()),
                    });
                }
                Err(error) if index == 0 && format.is_some() => {
                    warn!(format = candidate, %error, "requested format unavailable, falling back");
                }
                Err(error) => {
                    debug!(format = candidate, %error, "preferred format unavailable");
                }
            }
        }

        let path = format!("/attachments/{encoded}/content");
        match self.client.get_bytes(&path).await {
            Ok(bytes) => {
                debug!(size = bytes.len(), "downloaded content with server default format");
                Ok(FetchedContent {
                    bytes,
                    format: None,
                })
            }
            Err(last_error) => Err(AttachmentError::NotAvailable {
                attachment_id: attachment_id.to_string(),
                last_error,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::api::{ApiRequest, ApiResponse, Transport};

    fn attachment(name: Option<&str>, kind: Option<&str>) -> AttachmentRef {
        AttachmentRef {
            id: "a1".to_string(),
            name: name.map(str::to_string),
            kind: kind.map(str::to_string),
            download_uri: None,
            metadata: Value::Null,
        }
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_classify_transcript_beats_media() {
        let att = attachment(Some("interview.mp4"), Some("transcript"));
        assert_eq!(classify(&att), AttachmentCategory::Transcript);
    }

    #[test]
    fn test_classify_by_type_or_name() {
        assert_eq!(
            classify(&attachment(Some("clip.srt"), None)),
            AttachmentCategory::Caption
        );
        assert_eq!(
            classify(&attachment(None, Some("Caption"))),
            AttachmentCategory::Caption
        );
        assert_eq!(
            classify(&attachment(Some("audio.MP3"), Some("media"))),
            AttachmentCategory::Media
        );
        assert_eq!(
            classify(&attachment(Some("call.wav"), None)),
            AttachmentCategory::Media
        );
        assert_eq!(
            classify(&attachment(Some("notes.docx"), None)),
            AttachmentCategory::Transcript
        );
        assert_eq!(
            classify(&attachment(Some("invoice.pdf"), Some("receipt"))),
            AttachmentCategory::Other
        );
        assert_eq!(classify(&attachment(None, None)), AttachmentCategory::Other);
    }

    #[test]
    fn test_classify_caption_beats_media() {
        let att = attachment(Some("video_subtitle.vtt"), Some("video"));
        assert_eq!(classify(&att), AttachmentCategory::Caption);
    }

    // ==================== Format & Extension Tests ====================

    #[test]
    fn test_preferred_format_per_category() {
        let att = attachment(None, None);
        assert_eq!(preferred_format(AttachmentCategory::Transcript, &att), Some("json"));
        assert_eq!(preferred_format(AttachmentCategory::Caption, &att), Some("srt"));
        assert_eq!(preferred_format(AttachmentCategory::Media, &att), None);
        assert_eq!(preferred_format(AttachmentCategory::Other, &att), None);
    }

    #[test]
    fn test_resolve_extension_priority() {
        let named = attachment(Some("Recording.M4A"), None);
        assert_eq!(
            resolve_extension(&named, AttachmentCategory::Media, Some("json")),
            ".json"
        );
        assert_eq!(resolve_extension(&named, AttachmentCategory::Media, None), ".m4a");

        let unnamed = attachment(Some("no extension here"), None);
        assert_eq!(resolve_extension(&unnamed, AttachmentCategory::Transcript, None), ".txt");
        assert_eq!(resolve_extension(&unnamed, AttachmentCategory::Caption, None), ".srt");
        assert_eq!(resolve_extension(&unnamed, AttachmentCategory::Media, None), ".mp3");
        assert_eq!(resolve_extension(&unnamed, AttachmentCategory::Other, None), ".bin");
    }

    // ==================== Content Fallback Tests ====================

    /// Serves content only for the listed paths; 404 otherwise.
    struct ContentTransport {
        available: Vec<&'static str>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for ContentTransport {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
            let path = request.url.trim_start_matches("http://api.test").to_string();
            self.requested.lock().unwrap().push(path.clone());
            if self.available.iter().any(|p| *p == path) {
                Ok(ApiResponse::new(200, format!("body of {path}")))
            } else {
                Ok(ApiResponse::new(404, ""))
            }
        }
    }

    fn client_serving(available: Vec<&'static str>) -> (AttachmentClient, Arc<ContentTransport>) {
        let transport = Arc::new(ContentTransport {
            available,
            requested: Mutex::new(Vec::new()),
        });
        let client = RevClient::with_transport(
            Arc::clone(&transport) as Arc<dyn Transport>,
            "http://api.test",
            None,
        );
        (AttachmentClient::new(client), transport)
    }

    #[tokio::test]
    async fn test_download_uses_requested_format() {
        let (attachments, transport) = client_serving(vec!["/attachments/a1/content.json"]);

        let fetched = attachments.download_content("a1", Some("json"), &[]).await.unwrap();

        assert_eq!(fetched.format.as_deref(), Some("json"));
        assert_eq!(fetched.bytes, b"body of /attachments/a1/content.json");
        assert_eq!(transport.requested.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_download_falls_back_through_preferred_then_bare() {
        let (attachments, transport) = client_serving(vec!["/attachments/a1/content"]);

        let fetched = attachments
            .download_content("a1", Some("json"), &["txt", "json"])
            .await
            .unwrap();

        assert_eq!(fetched.format, None);
        assert_eq!(
            *transport.requested.lock().unwrap(),
            vec![
                "/attachments/a1/content.json",
                "/attachments/a1/content.txt",
                "/attachments/a1/content",
            ]
        );
    }

    #[tokio::test]
    async fn test_download_takes_first_available_preferred() {
        let (attachments, _) = client_serving(vec![
            "/attachments/a1/content.docx",
            "/attachments/a1/content.txt",
        ]);

        let fetched = attachments
            .download_content("a1", None, &["srt", "docx", "txt"])
            .await
            .unwrap();

        assert_eq!(fetched.format.as_deref(), Some("docx"));
    }

    #[tokio::test]
    async fn test_download_exhaustion_is_not_available() {
        let (attachments, _) = client_serving(vec![]);

        let error = attachments
            .download_content("a1", Some("srt"), &[])
            .await
            .unwrap_err();

        match error {
            AttachmentError::NotAvailable {
                attachment_id,
                last_error,
            } => {
                assert_eq!(attachment_id, "a1");
                assert_eq!(last_error.status(), Some(404));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_metadata_decodes_attachment() {
        struct MetadataTransport;

        #[async_trait]
        impl Transport for MetadataTransport {
            async fn send(&self, _request: &ApiRequest) -> Result<ApiResponse, ApiError> {
                let body = json!({"id": "a1", "name": "audio.mp3", "type": "media"});
                Ok(ApiResponse::new(200, body.to_string()))
            }
        }

        let client = RevClient::with_transport(Arc::new(MetadataTransport), "http://api.test", None);
        let attachment = AttachmentClient::new(client).get_metadata("a1").await.unwrap();

        assert_eq!(attachment.name.as_deref(), Some("audio.mp3"));
        assert_eq!(attachment.kind.as_deref(), Some("media"));
    }

    #[tokio::test]
    async fn test_get_metadata_without_id_uses_requested_id() {
        struct NoIdTransport;

        #[async_trait]
        impl Transport for NoIdTransport {
            async fn send(&self, _request: &ApiRequest) -> Result<ApiResponse, ApiError> {
                let body = json!({"name": "audio.mp3", "type": "media"});
                Ok(ApiResponse::new(200, body.to_string()))
            }
        }

        let client = RevClient::with_transport(Arc::new(NoIdTransport), "http://api.test", None);
        let attachment = AttachmentClient::new(client).get_metadata("a1").await.unwrap();

        assert_eq!(attachment.id, "a1");
        assert_eq!(attachment.name.as_deref(), Some("audio.mp3"));
    }

    #[tokio::test]
    async fn test_get_metadata_rejects_non_object() {
        struct ArrayTransport;

        #[async_trait]
        impl Transport for ArrayTransport {
            async fn send(&self, _request: &ApiRequest) -> Result<ApiResponse, ApiError> {
                Ok(ApiResponse::new(200, "[1, 2]"))
            }
        }

        let client = RevClient::with_transport(Arc::new(ArrayTransport), "http://api.test", None);
        let error = AttachmentClient::new(client).get_metadata("a1").await.unwrap_err();

        assert!(matches!(error, AttachmentError::Malformed { .. }));
    }
}
