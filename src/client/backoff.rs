//! Transport retry configuration constants

use std::time::Duration;

/// Default number of transport retries (429, 5xx, network errors).
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Initial transport backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum transport backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// TCP connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default page size for list endpoints (API maximum).
pub const PAGE_LIMIT: u32 = 100;

/// Calculate exponential transport backoff for a zero-based retry count
pub fn calculate_backoff(retry_count: u32) -> Duration {
    calculate_backoff_from(Duration::from_millis(INITIAL_BACKOFF_MS), retry_count)
}

/// Same as [`calculate_backoff`] with a custom initial delay
pub fn calculate_backoff_from(initial: Duration, retry_count: u32) -> Duration {
    let factor = 2u64.saturating_pow(retry_count.min(20));
    let delay_ms = (initial.as_millis() as u64).saturating_mul(factor);
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
}
