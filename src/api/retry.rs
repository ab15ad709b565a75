//! Retry policy with exponential backoff for transient API failures.
//!
//! A failed request is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - a retryable status (5xx by default) or a network hiccup
//! - [`FailureType::RateLimited`] - HTTP 429; retried, honoring `Retry-After`
//! - [`FailureType::NeedsAuth`] - 401/403; the credential is wrong, retrying will not help
//! - [`FailureType::Permanent`] - everything else
//!
//! The [`RetryPolicy`] then decides whether to retry and how long to wait.
//!
//! # Example
//!
//! ```
//! use rev_exporter_core::api::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! let failure = policy.classify_status(503);
//!
//! match policy.should_retry(failure, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::ApiError;
use super::constants::MAX_RETRY_AFTER;

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Status codes retried by default.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Default backoff factor: delays are `factor * 2^(retry - 1)`.
const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default maximum jitter added to delays (250ms).
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(250);

/// Classification of request failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, configured 5xx statuses, connection refused.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, 400 Bad Request, malformed JSON.
    Permanent,

    /// The credential was rejected (401/403).
    NeedsAuth,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

/// Decision on whether to retry a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the request after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry the request.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 4 (the initial attempt plus [`DEFAULT_MAX_RETRIES`])
/// - `retryable_statuses`: 429, 500, 502, 503, 504
/// - `backoff_factor`: 1 second
/// - `max_delay`: 32 seconds
/// - `max_jitter`: 250 milliseconds
///
/// # Delay Calculation
///
/// ```text
/// delay = min(backoff_factor * 2^(attempt - 1), max_delay) + jitter
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// HTTP status codes that are worth retrying.
    retryable_statuses: Vec<u16>,

    /// Delay before the first retry; doubled on each later retry.
    backoff_factor: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Upper bound of the random jitter added to each delay.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES + 1,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_delay: DEFAULT_MAX_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (clamped to >= 1)
    /// * `retryable_statuses` - HTTP statuses classified as transient
    /// * `backoff_factor` - Delay before the first retry
    /// * `max_delay` - Maximum delay cap
    #[must_use]
    pub fn new(
        max_attempts: u32,
        retryable_statuses: impl Into<Vec<u16>>,
        backoff_factor: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retryable_statuses: retryable_statuses.into(),
            backoff_factor,
            max_delay,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Creates a policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Returns a copy of this policy with a different jitter bound.
    ///
    /// Tests use `Duration::ZERO` to make delays deterministic.
    #[must_use]
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the configured retryable status codes.
    #[must_use]
    pub fn retryable_statuses(&self) -> &[u16] {
        &self.retryable_statuses
    }

    /// Classifies an HTTP status code against this policy's retryable set.
    #[must_use]
    pub fn classify_status(&self, status: u16) -> FailureType {
        if self.retryable_statuses.contains(&status) {
            if status == 429 {
                FailureType::RateLimited
            } else {
                FailureType::Transient
            }
        } else if matches!(status, 401 | 403) {
            FailureType::NeedsAuth
        } else {
            FailureType::Permanent
        }
    }

    /// Determines whether to retry a failed request.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "credentials rejected - retry would not help".to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Formula: `min(backoff_factor * 2^(attempt - 1), max_delay) + jitter`
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.backoff_factor.as_millis() as f64;
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * 2f64.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=max_ms))
    }
}

/// Classifies a transport error into a failure type for retry decisions.
///
/// | Error | Type | Rationale |
/// |-------|------|-----------|
/// | Timeout | Transient | Network may recover |
/// | Network (most) | Transient | Server may come back |
/// | Network (TLS) | Permanent | Certificate/config issue |
/// | HttpStatus | by status | See [`RetryPolicy::classify_status`] |
/// | InvalidJson / InvalidUrl / ClientBuild | Permanent | Won't succeed |
#[must_use]
pub fn classify_error(error: &ApiError, policy: &RetryPolicy) -> FailureType {
    match error {
        ApiError::HttpStatus { status, .. } => policy.classify_status(*status),
        ApiError::Timeout { .. } => FailureType::Transient,
        ApiError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        ApiError::InvalidJson { .. } | ApiError::InvalidUrl { .. } | ApiError::ClientBuild { .. } => {
            FailureType::Permanent
        }
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}

/// Parses a `Retry-After` header as integer seconds or an HTTP-date.
///
/// Values above the cap are clamped; negative or past values yield `None`.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        return Some(cap_retry_after(Duration::from_secs(seconds)));
    }

    let datetime = httpdate::parse_http_date(header_value).ok()?;
    let duration = datetime.duration_since(std::time::SystemTime::now()).ok()?;
    Some(cap_retry_after(duration))
}

fn cap_retry_after(duration: Duration) -> Duration {
    if duration > MAX_RETRY_AFTER {
        warn!(
            delay_secs = duration.as_secs(),
            max_secs = MAX_RETRY_AFTER.as_secs(),
            "Retry-After exceeds maximum, capping"
        );
        MAX_RETRY_AFTER
    } else {
        duration
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn no_jitter(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            DEFAULT_RETRYABLE_STATUSES,
            Duration::from_secs(1),
            Duration::from_secs(32),
        )
        .with_max_jitter(Duration::ZERO)
    }

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.retryable_statuses(), &[429, 500, 502, 503, 504]);
        assert_eq!(policy.backoff_factor, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(32));
    }

    #[test]
    fn test_retry_policy_with_max_retries_counts_initial_attempt() {
        assert_eq!(RetryPolicy::with_max_retries(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::with_max_retries(5).max_attempts(), 6);
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        let policy = RetryPolicy::new(0, [503], Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    // ==================== Delay Calculation Tests ====================

    #[test]
    fn test_delay_doubles_per_attempt_without_jitter() {
        let policy = no_jitter(10);
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_respects_max_delay() {
        let policy = RetryPolicy::new(
            10,
            DEFAULT_RETRYABLE_STATUSES,
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
        .with_max_jitter(Duration::ZERO);
        assert_eq!(policy.calculate_delay(6), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.calculate_delay(1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1250), "delay {delay:?} too large");
        }
    }

    // ==================== Status Classification Tests ====================

    #[test]
    fn test_classify_configured_statuses() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.classify_status(429), FailureType::RateLimited);
        for status in [500, 502, 503, 504] {
            assert_eq!(policy.classify_status(status), FailureType::Transient);
        }
    }

    #[test]
    fn test_classify_unlisted_statuses() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.classify_status(501), FailureType::Permanent);
        assert_eq!(policy.classify_status(404), FailureType::Permanent);
        assert_eq!(policy.classify_status(401), FailureType::NeedsAuth);
        assert_eq!(policy.classify_status(403), FailureType::NeedsAuth);
    }

    #[test]
    fn test_classify_respects_custom_status_set() {
        let policy = RetryPolicy::new(3, [408], Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.classify_status(408), FailureType::Transient);
        assert_eq!(policy.classify_status(503), FailureType::Permanent);
    }

    #[test]
    fn test_classify_error_variants() {
        let policy = RetryPolicy::default();
        assert_eq!(
            classify_error(&ApiError::timeout("http://example.com"), &policy),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&ApiError::http_status("http://example.com", 502), &policy),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&ApiError::invalid_url("::"), &policy),
            FailureType::Permanent
        );
    }

    // ==================== Should Retry Decision Tests ====================

    #[test]
    fn test_should_retry_permanent_does_not_retry() {
        let decision = RetryPolicy::default().should_retry(FailureType::Permanent, 1);
        assert!(
            matches!(decision, RetryDecision::DoNotRetry { ref reason } if reason.contains("permanent"))
        );
    }

    #[test]
    fn test_should_retry_needs_auth_does_not_retry() {
        let decision = RetryPolicy::default().should_retry(FailureType::NeedsAuth, 1);
        assert!(
            matches!(decision, RetryDecision::DoNotRetry { ref reason } if reason.contains("credentials"))
        );
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = no_jitter(3);

        assert_eq!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry {
                delay: Duration::from_secs(1),
                attempt: 2
            }
        );
        assert_eq!(
            policy.should_retry(FailureType::RateLimited, 2),
            RetryDecision::Retry {
                delay: Duration::from_secs(2),
                attempt: 3
            }
        );
        let decision = policy.should_retry(FailureType::Transient, 3);
        assert!(
            matches!(decision, RetryDecision::DoNotRetry { ref reason } if reason.contains("exhausted"))
        );
    }

    // ==================== Retry-After Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_rejects_negative_and_garbage() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_caps_large_values() {
        assert_eq!(parse_retry_after("86400"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_past_http_date_is_none() {
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
