//! Transport layer for the Rev.com API.
//!
//! Requests flow through three layers:
//!
//! - [`Transport`] - a single "send request" primitive; [`ReqwestTransport`]
//!   is the production implementation
//! - [`RetryingTransport`] - a decorator that retries transient failures with
//!   exponential backoff, driven by a [`RetryPolicy`] and a [`Sleeper`]
//! - [`RevClient`] - business-facing client: base URL, `Authorization`
//!   header, status mapping and JSON/bytes parsing
//!
//! # Example
//!
//! ```no_run
//! use rev_exporter_core::api::RevClient;
//! use rev_exporter_core::config::{ClientConfig, Credentials};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = Credentials::key_pair("client-key", "user-key");
//! let client = RevClient::new(&ClientConfig::default(), Some(&credentials))?;
//! client.test_connection().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod retry;
mod transport;

pub use client::RevClient;
pub use constants::{CONNECT_TIMEOUT_SECS, DEFAULT_BASE_URL, READ_TIMEOUT_SECS};
pub use error::ApiError;
pub use retry::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRYABLE_STATUSES, FailureType, RetryDecision, RetryPolicy,
    classify_error, parse_retry_after,
};
pub use transport::{
    ApiRequest, ApiResponse, Method, ReqwestTransport, RetryingTransport, Sleeper, TokioSleeper,
    Transport,
};
