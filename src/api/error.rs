//! Error types for the API transport.
//!
//! Every variant carries the URL it concerns so failures surfaced in the sync
//! summary are actionable without a debug log.

use thiserror::Error;

/// Errors that can occur while talking to the Rev.com API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response, returned after any retries were exhausted.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// The response body was not the JSON shape the caller expected.
    #[error("invalid JSON response from {url}: {source}")]
    InvalidJson {
        /// The URL whose body failed to parse.
        url: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The endpoint could not be turned into a valid URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid JSON error.
    pub fn invalid_json(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidJson {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the HTTP status code when this error came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_timeout_display() {
        let error = ApiError::timeout("https://www.rev.com/api/v1/orders");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("/api/v1/orders"));
    }

    #[test]
    fn test_api_error_http_status_display() {
        let error = ApiError::http_status("https://www.rev.com/api/v1/orders/TC1", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("/orders/TC1"), "Expected URL in: {msg}");
        assert_eq!(error.status(), Some(404));
    }

    #[test]
    fn test_api_error_invalid_json_display() {
        let parse_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error = ApiError::invalid_json("https://www.rev.com/api/v1/orders", parse_error);
        let msg = error.to_string();
        assert!(msg.starts_with("invalid JSON"), "Expected prefix in: {msg}");
        assert_eq!(error.status(), None);
    }

    #[test]
    fn test_api_error_invalid_url_display() {
        let error = ApiError::invalid_url("not a url/orders");
        assert!(error.to_string().contains("invalid URL"));
    }
}
