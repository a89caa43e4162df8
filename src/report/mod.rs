//! Report-run extraction
//!
//! A report stream syncs in one pass through these stages:
//!
//! 1. [`api::ReportApi::probe`] reads the availability window
//! 2. [`api::ReportApi::find_existing_run`] looks for a reusable succeeded run
//! 3. [`api::ReportApi::issue`] requests a new run when none is found
//! 4. [`resolver::DownloadResolver`] polls the run until its file URL appears
//! 5. [`decoder::decode`] parses the CSV and enriches every row
//!
//! [`orchestrator::ReportExtractor`] composes the stages and owns the
//! bookmark: it only advances after the whole file decoded.

use crate::client::ClientError;

pub mod api;
pub mod decoder;
pub mod literal;
pub mod orchestrator;
pub mod resolver;

pub use decoder::{decode, EnrichContext, ExtractedRow};
pub use literal::CellValue;
pub use orchestrator::{
    DownloadReceipt, ReportExtractor, ReportStreamConfig, ReportSync, SyncStatus,
};
pub use resolver::{DownloadResolver, PollPolicy};

/// Errors that end a report sync attempt
///
/// None of these advance the bookmark. An exhausted download poll is not
/// an error; see [`SyncStatus::Pending`].
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Availability probe answered without a usable window
    #[error("report type {report_type} unavailable: {reason}")]
    UpstreamUnavailable {
        /// Report type probed
        report_type: String,
        /// What was missing
        reason: String,
    },

    /// Creating a report run failed
    #[error("failed to issue report run for {report_type}: {source}")]
    IssueFailed {
        /// Report type requested
        report_type: String,
        /// Transport failure
        source: ClientError,
    },

    /// Polling a run failed with a non-retryable status (strict polling)
    #[error("lookup of report run {run_id} failed: {source}")]
    RunLookup {
        /// Run polled
        run_id: String,
        /// Transport failure
        source: ClientError,
    },

    /// Result file could not be downloaded
    #[error("failed to download report file: {0}")]
    Download(ClientError),

    /// Result file is not valid CSV
    #[error("malformed report CSV: {0}")]
    Csv(String),

    /// Any other API failure (availability probe, run listing)
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Result type for report operations
pub type ReportResult<T> = Result<T, ReportError>;
