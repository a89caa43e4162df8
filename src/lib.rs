//! # tap-stripe
//!
//! Extracts payments records from the Stripe API and emits them with
//! replication bookmarks for a downstream data pipeline.
//!
//! ## Extraction strategies
//!
//! - **Paginated poll**: live collections (`charges`, `disputes`,
//!   `payment_intents`, `exchange_rates`, `report_runs`) walked with cursor
//!   pagination and an optional `created` bookmark.
//! - **Report extraction**: asynchronous report runs. A run is requested
//!   (or an existing succeeded run is reused), polled until its CSV is
//!   ready, downloaded, decoded and enriched with a synthetic key.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tap_stripe::client::http::{ApiClient, ClientSettings};
//! use tap_stripe::config::ApiKey;
//! use tap_stripe::streams::{catalog::StreamCatalog, create_extractor, Extractor};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(ApiClient::new(ClientSettings::new(ApiKey::new("sk_test_...")))?);
//! let definition = StreamCatalog::load()?.get("activity_summary_1")?;
//! let extractor = create_extractor(definition, client, &Default::default())?;
//!
//! let batch = extractor.sync(Some(1_700_000_000)).await?;
//! println!("{} records, bookmark {:?}", batch.records.len(), batch.bookmark);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`client`] - Authenticated HTTP executor with retries and rate limiting
//! - [`report`] - Report-run state machine: probe, dedup, issue, resolve, decode
//! - [`streams`] - Stream catalog and the extractor strategies
//! - [`state`] - Bookmark persistence with atomic writes and file locking
//! - [`output`] - Record sinks
//! - [`cli`] - Command implementations

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// CLI command implementations
pub mod cli;

/// Authenticated HTTP client
pub mod client;

/// Connector configuration
pub mod config;

/// Metrics instrumentation
pub mod metrics;

/// Record sinks
pub mod output;

/// Report extraction state machine
pub mod report;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Bookmark state persistence
pub mod state;

/// Stream catalog and extractors
pub mod streams;

/// Timestamp format used for `loaded_at` and ISO bookmarks
pub const ISO_SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Report type identifier (e.g. `activity.summary.1`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportType(String);

impl ReportType {
    /// Create a report type, rejecting blank names
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Report type cannot be empty".to_string());
        }
        if name.contains('/') {
            return Err(format!("Report type must not contain '/', got {name}"));
        }
        Ok(Self(name))
    }

    /// Report type name as sent to the API
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-declared bounds of reportable data, in epoch seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    /// Earliest reportable second
    pub start: i64,
    /// Latest reportable second
    pub end: i64,
}

impl AvailabilityWindow {
    /// Interval to request given the resume point
    ///
    /// Starts at the later of `start` and the window start, and always ends
    /// at the window end. The result may be empty.
    pub fn clamp_from(&self, start: i64) -> ReportInterval {
        ReportInterval {
            start: start.max(self.start),
            end: self.end,
        }
    }
}

/// Half-open report interval `[start, end)` in epoch seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportInterval {
    /// Interval start
    pub start: i64,
    /// Interval end
    pub end: i64,
}

impl ReportInterval {
    /// Nothing new to report
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Report run lifecycle status, observed only through polling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Still generating
    Pending,
    /// Result file available
    Succeeded,
    /// Generation failed
    Failed,
    /// Any status this client does not recognise
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A server-side report run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRun {
    /// Run identifier (e.g. `frr_...`)
    pub id: String,
    /// Report type the run materializes
    pub report_type: String,
    /// Current status
    pub status: RunStatus,
    /// Requested interval start (epoch seconds)
    pub interval_start: Option<i64>,
    /// Requested interval end (epoch seconds)
    pub interval_end: Option<i64>,
    /// Download URL of the result file, once available
    pub result_url: Option<String>,
}

impl ReportRun {
    /// Whether this run can stand in for a new run starting at `interval_start`
    ///
    /// Requires a succeeded status and an exactly equal interval start.
    pub fn is_reusable_for(&self, report_type: &ReportType, interval_start: i64) -> bool {
        self.report_type == report_type.as_str()
            && self.status == RunStatus::Succeeded
            && self.interval_start == Some(interval_start)
    }
}

/// Parse a timestamp given as epoch seconds or a date/datetime string
///
/// Accepts integer strings, RFC 3339, `%Y-%m-%dT%H:%M:%SZ`,
/// `%Y-%m-%d %H:%M:%S` (UTC) and plain `%Y-%m-%d` dates (midnight UTC).
pub fn parse_timestamp(input: &str) -> Option<i64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(secs) = input.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, ISO_SECONDS_FORMAT) {
        return Some(dt.and_utc().timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Normalize a persisted bookmark (integer or date string) to epoch seconds
pub fn normalize_bookmark(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        serde_json::Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Format epoch seconds as `%Y-%m-%dT%H:%M:%SZ`
pub fn format_iso_seconds(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.format(ISO_SECONDS_FORMAT).to_string())
}
