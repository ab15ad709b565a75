//! User-Agent string sent with every API request.

/// Tool identifier appended after the version.
const UA_COMMENT: &str = "export-sync";

/// Default User-Agent for API requests (identifies the tool and version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("rev-exporter/{version} ({UA_COMMENT})")
}
