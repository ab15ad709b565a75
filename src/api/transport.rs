//! The "send request" primitive and its retry decorator.
//!
//! [`Transport::send`] returns `Ok` for every HTTP response, whatever its
//! status; only failures to obtain a response at all (network, timeout) are
//! errors. Status interpretation is left to the decorator and to
//! [`RevClient`](super::RevClient), which keeps the retry logic testable with a
//! scripted transport and a fake clock.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tracing::{debug, warn};

use super::ApiError;
use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error, parse_retry_after};
use crate::user_agent;

/// HTTP methods used against the API. Both are subject to retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read-only request.
    Get,
    /// JSON body request. Supported by the client; unused by the sync engine.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// A fully-built request: absolute URL (query included), headers, optional JSON body.
#[derive(Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL including any query string.
    pub url: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// JSON body for POST requests.
    pub json_body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Creates a GET request with no headers.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            json_body: None,
        }
    }

    /// Creates a POST request carrying a JSON body.
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            json_body: Some(body),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the value of a header, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

// Never print credential headers.
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.as_str(), "[REDACTED]")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("json_body", &self.json_body.is_some())
            .finish()
    }
}

/// A received response with its body fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw `Retry-After` header, when present.
    pub retry_after: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Creates a response without a Retry-After header.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Single "send request" primitive.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and returns the response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] only when no response could be obtained.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// Production transport backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ClientBuild`] when the HTTP client cannot be built.
    pub fn new() -> Result<Self, ApiError> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a transport with explicit connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ClientBuild`] when the HTTP client cannot be built.
    pub fn with_timeouts(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(user_agent::default_user_agent())
            .gzip(true)
            .build()
            .map_err(|source| ApiError::ClientBuild { source })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.json_body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&request.url, e))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(std::string::ToString::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&request.url, e))?
            .to_vec();

        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::timeout(url)
    } else {
        ApiError::network(url, error)
    }
}

/// Clock abstraction for backoff waits.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real clock using `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Decorator that retries transient failures of an inner [`Transport`].
///
/// A response whose status is in the policy's retryable set, or a transient
/// transport error, is retried until the policy's attempt budget runs out.
/// For 429 responses a parseable `Retry-After` header replaces the computed
/// backoff. When retries are exhausted the last outcome is returned as-is.
pub struct RetryingTransport<T, S = TokioSleeper> {
    inner: T,
    policy: RetryPolicy,
    sleeper: S,
}

impl<T: Transport> RetryingTransport<T, TokioSleeper> {
    /// Wraps `inner` using the real clock.
    #[must_use]
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            sleeper: TokioSleeper,
        }
    }
}

impl<T: Transport, S: Sleeper> RetryingTransport<T, S> {
    /// Wraps `inner` with an explicit clock.
    #[must_use]
    pub fn with_sleeper(inner: T, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            inner,
            policy,
            sleeper,
        }
    }

    /// Returns the active retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<T: Transport, S: Sleeper> Transport for RetryingTransport<T, S> {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut attempt = 1u32;
        loop {
            let outcome = self.inner.send(request).await;
            let failure = match &outcome {
                Ok(response) if response.is_success() => return outcome,
                Ok(response) => self.policy.classify_status(response.status),
                Err(error) => classify_error(error, &self.policy),
            };

            match self.policy.should_retry(failure, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    let delay = retry_after_delay(&outcome, failure).unwrap_or(delay);
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        attempt,
                        ?failure,
                        delay_ms = delay.as_millis(),
                        "request failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt = next_attempt;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url = %request.url, attempt, reason, "giving up on request");
                    return outcome;
                }
            }
        }
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        (**self).send(request).await
    }
}

fn retry_after_delay(
    outcome: &Result<ApiResponse, ApiError>,
    failure: FailureType,
) -> Option<Duration> {
    if failure != FailureType::RateLimited {
        return None;
    }
    match outcome {
        Ok(response) => response.retry_after.as_deref().and_then(parse_retry_after),
        Err(ApiError::HttpStatus { retry_after, .. }) => {
            retry_after.as_deref().and_then(parse_retry_after)
        }
        Err(_) => None,
    }
}
