//! Sync checkpoints kept in the state file history

use serde::{Deserialize, Serialize};

use crate::report::{DownloadReceipt, SyncStatus};
use crate::streams::StreamBatch;
use crate::ReportInterval;

/// One completed stream sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    stream: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<ReportInterval>,
    record_count: u64,
    byte_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
    completed_at: i64,
}

impl Checkpoint {
    /// Checkpoint for a paginated sync
    pub fn listing(stream: impl Into<String>, record_count: u64) -> Self {
        Self {
            stream: stream.into(),
            interval: None,
            record_count,
            byte_count: 0,
            sha256: None,
            run_id: None,
            completed_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Checkpoint for a downloaded report file
    pub fn report(
        stream: impl Into<String>,
        interval: Option<ReportInterval>,
        record_count: u64,
        receipt: &DownloadReceipt,
    ) -> Self {
        Self {
            stream: stream.into(),
            interval,
            record_count,
            byte_count: receipt.bytes,
            sha256: Some(receipt.sha256.clone()),
            run_id: Some(receipt.run_id.clone()),
            completed_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Checkpoint describing `batch`, if it completed any work
    ///
    /// Report syncs that ended up-to-date or pending produce none.
    pub fn from_batch(stream: &str, batch: &StreamBatch) -> Option<Self> {
        let records = batch.records.len() as u64;
        match &batch.report {
            None => Some(Self::listing(stream, records)),
            Some(outcome) => match &outcome.status {
                SyncStatus::Completed(receipt) => {
                    Some(Self::report(stream, outcome.interval, records, receipt))
                }
                SyncStatus::UpToDate | SyncStatus::Pending { .. } => None,
            },
        }
    }

    /// Stream name
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Report interval, if any
    pub fn interval(&self) -> Option<ReportInterval> {
        self.interval
    }

    /// Records emitted
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Downloaded bytes
    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    /// SHA-256 of the report file
    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }

    /// Report run id
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Completion time (epoch seconds)
    pub fn completed_at(&self) -> i64 {
        self.completed_at
    }
}
