//! Observability metrics for the connector
//!
//! Tracks HTTP traffic, report-run lifecycle events and per-stream sync
//! outcomes through the `metrics` facade.
//!
//! ## Architecture
//!
//! - Macros are no-ops until a recorder is installed
//! - [`init_metrics`] installs the Prometheus exporter with a scrape listener
//! - Labels stay low-cardinality: endpoint templates, never object ids

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metrics initialization errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed
    #[error("failed to install Prometheus exporter on {addr}: {reason}")]
    Install {
        /// Requested listen address
        addr: SocketAddr,
        /// Exporter error
        reason: String,
    },
}

/// Install the Prometheus exporter and register metric descriptions
///
/// Idempotent: later calls are ignored once an exporter is installed.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_INITIALIZED.get() {
        debug!("Metrics already initialized on {}, skipping", existing);
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install {
            addr,
            reason: e.to_string(),
        })?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the API"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of transport retry attempts"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "report_runs_issued_total",
        Unit::Count,
        "Report runs requested from the API"
    );
    describe_counter!(
        "report_runs_reused_total",
        Unit::Count,
        "Existing succeeded report runs reused instead of issuing"
    );
    describe_counter!(
        "report_poll_attempts_total",
        Unit::Count,
        "Download-URL polls against report runs"
    );
    describe_counter!(
        "report_downloads_total",
        Unit::Count,
        "Report result files downloaded"
    );
    describe_counter!(
        "records_extracted_total",
        Unit::Count,
        "Records emitted per stream"
    );
    describe_counter!(
        "stream_syncs_total",
        Unit::Count,
        "Stream sync outcomes"
    );
    describe_histogram!(
        "stream_sync_duration_seconds",
        Unit::Seconds,
        "Wall time of one stream sync"
    );

    let _ = METRICS_INITIALIZED.set(addr);
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one HTTP request attempt
pub struct HttpRequestMetrics {
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a request attempt
    pub fn start(endpoint: impl Into<String>, attempt: u32) -> Self {
        let endpoint = endpoint.into();
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            attempt = attempt,
            "Starting HTTP request"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record a response with a status code
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                correlation_id = %self.correlation_id,
                endpoint = %self.endpoint,
                attempt = self.attempt,
                duration_ms = duration.as_millis(),
                "Rate limit error (429) recorded"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a transport failure (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => "network_error",
        )
        .increment(1);

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Correlation ID of this attempt
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a transport retry and its backoff
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!("http_retries_total").increment(1);
    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis(),
        "Retry backoff recorded"
    );
}

/// A new report run was requested
pub fn record_report_issued(report_type: &str) {
    counter!("report_runs_issued_total", "report_type" => report_type.to_string()).increment(1);
}

/// An existing succeeded run was reused
pub fn record_report_reused(report_type: &str) {
    counter!("report_runs_reused_total", "report_type" => report_type.to_string()).increment(1);
}

/// One download-URL poll was made
pub fn record_poll_attempt() {
    counter!("report_poll_attempts_total").increment(1);
}

/// A report result file was downloaded
pub fn record_report_download(bytes: usize) {
    counter!("report_downloads_total").increment(1);
    debug!(bytes = bytes, "Report download recorded");
}

/// Outcome of one stream sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Records emitted and bookmark handled
    Success,
    /// Abandoned by timeout or shutdown
    Abandoned,
    /// Fatal error for this attempt
    Failed,
}

impl SyncOutcome {
    fn as_label(self) -> &'static str {
        match self {
            SyncOutcome::Success => "success",
            SyncOutcome::Abandoned => "abandoned",
            SyncOutcome::Failed => "failed",
        }
    }
}

/// Per-stream sync metrics
pub struct StreamSyncMetrics {
    stream: String,
    start_time: Instant,
}

impl StreamSyncMetrics {
    /// Start timing a stream sync
    pub fn start(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            start_time: Instant::now(),
        }
    }

    /// Record the outcome and the number of records emitted
    pub fn finish(&self, outcome: SyncOutcome, records: u64) {
        let duration = self.start_time.elapsed();

        counter!(
            "stream_syncs_total",
            "stream" => self.stream.clone(),
            "status" => outcome.as_label(),
        )
        .increment(1);

        if records > 0 {
            counter!("records_extracted_total", "stream" => self.stream.clone())
                .increment(records);
        }

        histogram!(
            "stream_sync_duration_seconds",
            "stream" => self.stream.clone(),
        )
        .record(duration.as_secs_f64());
    }

    /// Elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
