//! Record and attachment shapes built from API responses.
//!
//! Wire payloads are decoded through explicit serde shapes; the full original
//! JSON object is kept alongside as opaque `metadata`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Status values (lower-cased) that mark a record as finished.
const COMPLETED_STATUSES: [&str; 4] = ["complete", "completed", "done", "finished"];

/// Errors raised when a payload cannot be turned into a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The payload did not have the expected JSON shape.
    #[error("unexpected {kind} payload: {source}")]
    Shape {
        /// Which model was being built.
        kind: &'static str,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The payload was not a JSON object.
    #[error("{kind} payload is not a JSON object")]
    NotAnObject {
        /// Which model was being built.
        kind: &'static str,
    },

    /// A required identifier was missing or empty.
    #[error("{kind} payload has no {field}")]
    MissingField {
        /// Which model was being built.
        kind: &'static str,
        /// Wire name of the missing field.
        field: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct RecordWire {
    #[serde(default, deserialize_with = "lenient_string")]
    order_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    status: Option<String>,
    #[serde(default)]
    placed_on: Option<Value>,
    #[serde(default)]
    attachments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AttachmentWire {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    download_uri: Option<String>,
}

/// Accepts strings and numbers; anything else reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One attachment of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRef {
    /// Attachment id, unique across the account.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Declared type (wire field `type`).
    pub kind: Option<String>,
    /// Direct download URI, when the API provides one.
    pub download_uri: Option<String>,
    /// Full original payload.
    pub metadata: Value,
}

impl AttachmentRef {
    /// Builds an attachment from its API payload.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when the payload is not an object or has no id.
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        if !value.is_object() {
            return Err(ModelError::NotAnObject { kind: "attachment" });
        }
        let wire: AttachmentWire =
            serde_json::from_value(value.clone()).map_err(|source| ModelError::Shape {
                kind: "attachment",
                source,
            })?;
        let id = wire
            .id
            .filter(|id| !id.is_empty())
            .ok_or(ModelError::MissingField {
                kind: "attachment",
                field: "id",
            })?;
        Ok(Self {
            id,
            name: wire.name,
            kind: wire.kind,
            download_uri: wire.download_uri,
            metadata: value,
        })
    }
}

/// A remote record ("order") with its attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Record id (wire field `order_number`).
    pub record_id: String,
    /// Free-text status.
    pub status: String,
    /// When the record was placed (wire field `placed_on`).
    pub placed_at: Option<DateTime<Utc>>,
    /// Attachments in API order.
    pub attachments: Vec<AttachmentRef>,
    /// Full original payload.
    pub metadata: Value,
}

impl Record {
    /// Builds a record from its API payload.
    ///
    /// Attachments without an id are dropped with a warning; an unparsable
    /// `placed_on` reads as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when the payload is not an object or has no
    /// `order_number`.
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        if !value.is_object() {
            return Err(ModelError::NotAnObject { kind: "record" });
        }
        let wire: RecordWire =
            serde_json::from_value(value.clone()).map_err(|source| ModelError::Shape {
                kind: "record",
                source,
            })?;
        let record_id = wire
            .order_number
            .filter(|id| !id.is_empty())
            .ok_or(ModelError::MissingField {
                kind: "record",
                field: "order_number",
            })?;

        let placed_at = match &wire.placed_on {
            Some(Value::String(raw)) => parse_timestamp(raw),
            _ => None,
        };

        let raw_attachments = match wire.attachments {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let attachments = raw_attachments
            .into_iter()
            .filter_map(|raw| match AttachmentRef::from_value(raw) {
                Ok(attachment) => Some(attachment),
                Err(error) => {
                    warn!(record_id = %record_id, %error, "skipping malformed attachment");
                    None
                }
            })
            .collect();

        Ok(Self {
            record_id,
            status: wire.status.unwrap_or_default(),
            placed_at,
            attachments,
            metadata: value,
        })
    }

    /// Returns true when the status marks the record as finished.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        let status = self.status.trim().to_lowercase();
        COMPLETED_STATUSES.contains(&status.as_str())
    }
}

/// Parses an ISO-8601 timestamp; naive values are taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
