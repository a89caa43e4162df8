//! Authenticated HTTP access to the Stripe API
//!
//! Everything that talks to the network goes through [`http::ApiClient`]:
//! - basic-auth with the API key as username and an empty password
//! - request-rate limiting shared across streams
//! - transport retries with capped exponential backoff
//!
//! Higher layers (report extraction, paginated streams) never touch
//! `reqwest` directly.

pub mod backoff;
pub mod classify;
pub mod http;
pub mod pagination;
pub mod rate_limit;

pub use classify::{classify_error, RetryErrorType};
pub use http::ApiClient;

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Non-success HTTP status that was not (or no longer) retried
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Response body could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// Response decoded but was missing required data
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded after all retries
    #[error("rate limit exceeded")]
    RateLimited,

    /// Request timed out
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection refused, DNS failure, or other transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Client could not be constructed
    #[error("client configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::RateLimited => Some(429),
            _ => None,
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
