//! CLI error types and conversions

use crate::client::ClientError;
use crate::config::ConfigError;
use crate::metrics::MetricsError;
use crate::output::OutputError;
use crate::state::StateError;
use crate::streams::catalog::CatalogError;
use crate::streams::StreamError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Catalog error
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Stream setup error
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// HTTP client construction error
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// State error
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Output error
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// One or more streams failed; completed bookmarks were saved
    #[error("{} stream(s) failed: {}", failed.len(), failed.join(", "))]
    StreamsFailed {
        /// Names of the failed streams
        failed: Vec<String>,
    },

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
