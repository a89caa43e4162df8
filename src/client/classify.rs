//! Error classification shared by transport retries and report polling
//!
//! One place decides whether a failure is worth retrying, and what a
//! human should be told about it.

use std::time::Duration;

use reqwest::StatusCode;

use super::ClientError;

/// Classification of request failures for retry decisions and messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request timed out
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 400 invalid request
    InvalidRequest,
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other client errors (4xx, except 429)
    ClientError(u16),
    /// Body could not be decoded or lacked required data
    MalformedResponse,
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// Classify an HTTP status code
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => RetryErrorType::InvalidRequest,
            401 | 403 => RetryErrorType::AuthFailed(status.as_u16()),
            429 => RetryErrorType::RateLimit,
            code if status.is_server_error() => RetryErrorType::ServerError(code),
            code if status.is_client_error() => RetryErrorType::ClientError(code),
            _ => RetryErrorType::NetworkGeneric,
        }
    }

    /// User-friendly description used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::InvalidRequest => "invalid request",
            Self::AuthFailed(_) => "authentication failed",
            Self::ClientError(code) => match code {
                404 => "resource not found",
                _ => "client error",
            },
            Self::MalformedResponse => "malformed response",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation presented after final failures.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection or raise request_timeout_secs",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Lower requests_per_second or --concurrency",
            Self::ServerError(_) => "The API may be degraded, try again later",
            Self::InvalidRequest => "Check start_date and the report type name",
            Self::AuthFailed(_) => "Verify the api_key and its reporting permissions",
            Self::ClientError(_) => "Review the request parameters",
            Self::MalformedResponse => "Check base_url points at the API root",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }

    /// Whether the failure is typically transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RetryErrorType::InvalidRequest
                | RetryErrorType::AuthFailed(_)
                | RetryErrorType::ClientError(_)
        )
    }
}

/// Classify a [`ClientError`]
pub fn classify_error(err: &ClientError) -> RetryErrorType {
    match err {
        ClientError::Http { status, .. } => StatusCode::from_u16(*status)
            .map(RetryErrorType::from_status)
            .unwrap_or(RetryErrorType::NetworkGeneric),
        ClientError::RateLimited => RetryErrorType::RateLimit,
        ClientError::Timeout(_) => RetryErrorType::NetworkTimeout,
        ClientError::Network(_) => RetryErrorType::NetworkOffline,
        ClientError::Parse(_) | ClientError::InvalidResponse(_) => {
            RetryErrorType::MalformedResponse
        }
        ClientError::Config(_) => RetryErrorType::NetworkGeneric,
    }
}

/// Standard retry log line
pub fn format_retry(
    attempt: u32,
    max_attempts: u32,
    error_type: RetryErrorType,
    backoff: Duration,
    endpoint: &str,
) -> String {
    format!(
        "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
        attempt,
        max_attempts,
        error_type.description(),
        backoff.as_secs_f64(),
        endpoint
    )
}

/// Final failure summary with a remediation hint
pub fn format_failure(attempts: u32, err: &ClientError, endpoint: &str) -> String {
    let error_type = classify_error(err);
    format!(
        "[FAILED] {endpoint} failed after {attempts} attempt(s): {err}. Suggestion: {}",
        error_type.suggestion()
    )
}
