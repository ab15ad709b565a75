//! Constants for the API transport (endpoints, timeouts, backoff caps).

use std::time::Duration;

/// Production base URL for the Rev.com API v1.
pub const DEFAULT_BASE_URL: &str = "https://www.rev.com/api/v1";

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default read timeout (30 seconds): the longest wait for response headers or
/// for the next body chunk. Not a deadline for the whole transfer.
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Maximum Retry-After header value honored (5 minutes).
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);
