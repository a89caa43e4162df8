//! Report stream sync
//!
//! Composes probe, dedup, issue, resolve and decode into one operation and
//! decides the next bookmark. The bookmark only moves after every row of a
//! downloaded file decoded; any other outcome leaves it where it was.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

use super::api::ReportApi;
use super::decoder::{decode, EnrichContext, ExtractedRow};
use super::resolver::{DownloadResolver, PollPolicy};
use super::ReportResult;
use crate::client::ApiClient;
use crate::metrics::{record_report_download, record_report_issued, record_report_reused};
use crate::{ReportInterval, ReportType};

/// Static description of one report stream
#[derive(Debug, Clone, PartialEq)]
pub struct ReportStreamConfig {
    /// Stream name; the key column is `{name}_id`
    pub name: String,
    /// Report type requested from the API
    pub report_type: ReportType,
    /// Columns hashed into the synthetic key
    pub id_keys: Vec<String>,
    /// Lower bound used when no bookmark exists yet
    pub start_date: Option<i64>,
}

/// Facts about a downloaded report file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReceipt {
    /// Run that produced the file
    pub run_id: String,
    /// Whether the run already existed
    pub reused: bool,
    /// File size in bytes
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the file
    pub sha256: String,
}

/// How a report sync ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// The availability window holds nothing past the resume point
    UpToDate,
    /// The run's file was not ready within the poll budget
    Pending {
        /// Run that was polled
        run_id: String,
    },
    /// A file was downloaded and fully decoded
    Completed(DownloadReceipt),
}

/// Result of one report sync
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSync {
    /// Decoded rows (empty unless completed)
    pub rows: Vec<ExtractedRow>,
    /// Bookmark to persist
    pub bookmark: Option<i64>,
    /// Interval that was requested, if any
    pub interval: Option<ReportInterval>,
    /// Outcome
    pub status: SyncStatus,
}

impl ReportSync {
    fn unchanged(bookmark: Option<i64>, interval: Option<ReportInterval>, status: SyncStatus) -> Self {
        Self {
            rows: Vec::new(),
            bookmark,
            interval,
            status,
        }
    }
}

/// Syncs one report stream
pub struct ReportExtractor {
    api: ReportApi,
    resolver: DownloadResolver,
    stream: ReportStreamConfig,
}

impl ReportExtractor {
    /// Create an extractor over a shared client
    pub fn new(client: Arc<ApiClient>, stream: ReportStreamConfig, policy: PollPolicy) -> Self {
        Self {
            api: ReportApi::new(client),
            resolver: DownloadResolver::new(policy),
            stream,
        }
    }

    /// Stream description
    pub fn stream(&self) -> &ReportStreamConfig {
        &self.stream
    }

    /// Run one sync from `last_bookmark`
    ///
    /// # Errors
    /// Probe, issue, download and CSV failures end the attempt with the
    /// bookmark unchanged.
    pub async fn sync(&self, last_bookmark: Option<i64>) -> ReportResult<ReportSync> {
        let report_type = &self.stream.report_type;
        let start = last_bookmark.or(self.stream.start_date).unwrap_or(0);

        let window = self.api.probe(report_type).await?;
        let interval = window.clamp_from(start);

        if interval.is_empty() {
            debug!(
                stream = %self.stream.name,
                interval_start = interval.start,
                interval_end = interval.end,
                "No new report data available"
            );
            return Ok(ReportSync::unchanged(last_bookmark, None, SyncStatus::UpToDate));
        }

        let (run_id, report_end_at, url, reused) =
            match self.api.find_existing_run(report_type, interval.start).await? {
                Some(existing) => {
                    record_report_reused(report_type.as_str());
                    let url = match existing.result_url {
                        Some(url) => Some(url),
                        None => {
                            self.resolver
                                .resolve_download_url(&self.api, &existing.run_id)
                                .await?
                        }
                    };
                    let end = existing.interval_end.unwrap_or(interval.end);
                    (existing.run_id, end, url, true)
                }
                None => {
                    let run_id = self.api.issue(report_type, interval).await?;
                    record_report_issued(report_type.as_str());
                    let url = self.resolver.resolve_download_url(&self.api, &run_id).await?;
                    (run_id, interval.end, url, false)
                }
            };

        let requested = ReportInterval {
            start: interval.start,
            end: report_end_at,
        };

        let Some(url) = url else {
            info!(
                stream = %self.stream.name,
                run_id = %run_id,
                "Report not ready; bookmark unchanged"
            );
            return Ok(ReportSync::unchanged(
                last_bookmark,
                Some(requested),
                SyncStatus::Pending { run_id },
            ));
        };

        info!(stream = %self.stream.name, run_id = %run_id, "Downloading report");
        let body = self.api.download(&url).await?;
        record_report_download(body.len());

        let ctx = EnrichContext::new(
            &self.stream.name,
            self.stream.id_keys.clone(),
            interval.start,
            report_end_at,
            Utc::now(),
        );
        let rows = decode(&body, &ctx).collect::<ReportResult<Vec<_>>>()?;

        let bookmark = Some(last_bookmark.map_or(report_end_at, |b| b.max(report_end_at)));
        info!(
            stream = %self.stream.name,
            run_id = %run_id,
            rows = rows.len(),
            bookmark = ?bookmark,
            "Report decoded"
        );

        Ok(ReportSync {
            rows,
            bookmark,
            interval: Some(requested),
            status: SyncStatus::Completed(DownloadReceipt {
                run_id,
                reused,
                bytes: body.len() as u64,
                sha256: format!("{:x}", Sha256::digest(&body)),
            }),
        })
    }
}
