//! Report endpoints: availability probe, run registry, issuer, run lookup
//!
//! Each call is a single request through [`ApiClient`]; readiness waiting
//! lives in [`super::resolver`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ReportError, ReportResult};
use crate::client::backoff::PAGE_LIMIT;
use crate::client::pagination::ListPage;
use crate::client::{ApiClient, ClientError, ClientResult};
use crate::{AvailabilityWindow, ReportInterval, ReportRun, ReportType, RunStatus};

const REPORT_TYPES_PATH: &str = "/reporting/report_types";
const REPORT_RUNS_PATH: &str = "/reporting/report_runs";

/// A succeeded run that covers the requested interval start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRun {
    /// Run identifier
    pub run_id: String,
    /// The run's own interval end
    pub interval_end: Option<i64>,
    /// Result file URL, when the listing already carries it
    pub result_url: Option<String>,
}

/// Something that can look up a report run by id
///
/// The download resolver polls through this seam.
#[async_trait]
pub trait ReportRunSource: Send + Sync {
    /// Fetch the current state of one run
    async fn fetch_run(&self, run_id: &str) -> ClientResult<ReportRun>;
}

#[derive(Debug, Default, Deserialize)]
struct RawParameters {
    #[serde(default)]
    interval_start: Option<i64>,
    #[serde(default)]
    interval_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRun {
    id: String,
    #[serde(default)]
    report_type: String,
    #[serde(default)]
    status: RunStatus,
    #[serde(default)]
    parameters: Option<RawParameters>,
    #[serde(default)]
    result: Option<RawResult>,
}

impl From<RawRun> for ReportRun {
    fn from(raw: RawRun) -> Self {
        let parameters = raw.parameters.unwrap_or_default();
        ReportRun {
            id: raw.id,
            report_type: raw.report_type,
            status: raw.status,
            interval_start: parameters.interval_start,
            interval_end: parameters.interval_end,
            result_url: raw.result.and_then(|r| r.url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedRun {
    id: String,
}

/// Client for the reporting endpoints
#[derive(Clone)]
pub struct ReportApi {
    client: Arc<ApiClient>,
}

impl ReportApi {
    /// Wrap a shared API client
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Read the availability window of a report type
    ///
    /// # Errors
    /// [`ReportError::UpstreamUnavailable`] when either bound is missing or
    /// not an integer; [`ReportError::Client`] on transport failure.
    pub async fn probe(&self, report_type: &ReportType) -> ReportResult<AvailabilityWindow> {
        let endpoint = format!("{REPORT_TYPES_PATH}/{}", report_type.as_str());
        let body: Value = self
            .client
            .get_json_labeled("/reporting/report_types/{id}", &endpoint, &[])
            .await?;

        let bound = |field: &str| {
            body.get(field)
                .and_then(Value::as_i64)
                .ok_or_else(|| ReportError::UpstreamUnavailable {
                    report_type: report_type.to_string(),
                    reason: format!("response has no integer {field}"),
                })
        };

        let window = AvailabilityWindow {
            start: bound("data_available_start")?,
            end: bound("data_available_end")?,
        };
        debug!(
            report_type = %report_type,
            start = window.start,
            end = window.end,
            "Report availability probed"
        );
        Ok(window)
    }

    /// List the most recent report runs (one page, server order)
    ///
    /// Entries that do not decode as runs are skipped.
    pub async fn list_runs(&self) -> ReportResult<Vec<ReportRun>> {
        let page: ListPage<Value> = self
            .client
            .get_json(REPORT_RUNS_PATH, &[("limit", PAGE_LIMIT.to_string())])
            .await?;

        let runs = page
            .data
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<RawRun>(value) {
                Ok(raw) => Some(ReportRun::from(raw)),
                Err(e) => {
                    debug!("Skipping undecodable report run entry: {}", e);
                    None
                }
            })
            .collect();
        Ok(runs)
    }

    /// Find a succeeded run of `report_type` starting exactly at `interval_start`
    ///
    /// The first match in server order wins.
    pub async fn find_existing_run(
        &self,
        report_type: &ReportType,
        interval_start: i64,
    ) -> ReportResult<Option<ExistingRun>> {
        info!(report_type = %report_type, "Checking existing report runs");
        let existing = self
            .list_runs()
            .await?
            .into_iter()
            .find(|run| run.is_reusable_for(report_type, interval_start))
            .map(|run| ExistingRun {
                run_id: run.id,
                interval_end: run.interval_end,
                result_url: run.result_url,
            });

        if let Some(run) = &existing {
            info!(
                report_type = %report_type,
                run_id = %run.run_id,
                interval_start,
                interval_end = ?run.interval_end,
                "Reusing existing report run"
            );
        }
        Ok(existing)
    }

    /// Request a new report run and return its id
    pub async fn issue(
        &self,
        report_type: &ReportType,
        interval: ReportInterval,
    ) -> ReportResult<String> {
        info!(
            report_type = %report_type,
            interval_start = interval.start,
            interval_end = interval.end,
            "Issuing report run"
        );
        let form = [
            ("report_type", report_type.to_string()),
            ("parameters[interval_start]", interval.start.to_string()),
            ("parameters[interval_end]", interval.end.to_string()),
        ];
        let created: CreatedRun = self
            .client
            .post_form(REPORT_RUNS_PATH, &form)
            .await
            .map_err(|source| ReportError::IssueFailed {
                report_type: report_type.to_string(),
                source,
            })?;
        info!(report_type = %report_type, run_id = %created.id, "Report run issued");
        Ok(created.id)
    }

    /// Download a result file
    pub async fn download(&self, url: &str) -> ReportResult<Bytes> {
        self.client.download(url).await.map_err(ReportError::Download)
    }
}

#[async_trait]
impl ReportRunSource for ReportApi {
    async fn fetch_run(&self, run_id: &str) -> ClientResult<ReportRun> {
        if run_id.is_empty() || run_id.contains('/') {
            return Err(ClientError::InvalidResponse(format!(
                "invalid report run id: {run_id:?}"
            )));
        }
        let endpoint = format!("{REPORT_RUNS_PATH}/{run_id}");
        let raw: RawRun = self
            .client
            .get_json_labeled("/reporting/report_runs/{id}", &endpoint, &[])
            .await?;
        Ok(raw.into())
    }
}
