//! Sync command implementation

use clap::Args;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

use super::CliError;
use crate::client::ApiClient;
use crate::config::TapConfig;
use crate::metrics::{init_metrics, StreamSyncMetrics, SyncOutcome};
use crate::output::{JsonLinesSink, RecordSink};
use crate::shutdown::SharedShutdown;
use crate::state::{Checkpoint, StateFile, StateLock};
use crate::streams::catalog::{StreamCatalog, StreamDefinition};
use crate::streams::{create_extractor, Extractor, StreamBatch, StreamError};

/// Maximum allowed stream concurrency
const MAX_CONCURRENCY: usize = 16;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Sync command arguments
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Config file (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// State file holding bookmarks; created if missing
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Streams to sync, comma separated; globs allowed (default: all)
    #[arg(long, value_delimiter = ',')]
    pub streams: Vec<String>,

    /// Output file, or `-` for stdout
    #[arg(long, default_value = "-")]
    pub output: String,

    /// Number of streams synced at once
    #[arg(long, default_value = "1", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Abandon a stream that runs longer than this, keeping its bookmark
    #[arg(long)]
    pub stream_timeout_secs: Option<u64>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Show a spinner on stderr
    #[arg(long, default_value_t = false)]
    pub progress: bool,
}

/// Totals of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Streams that finished
    pub synced: Vec<String>,
    /// Streams abandoned by timeout or shutdown
    pub abandoned: Vec<String>,
    /// Streams that failed
    pub failed: Vec<String>,
    /// Records written
    pub records: u64,
}

/// How one stream task ended
enum StreamOutcome {
    Synced(StreamBatch),
    Abandoned,
    TimedOut,
    Failed(StreamError),
}

/// Run one stream under the optional timeout and the shutdown coordinator
async fn run_stream(
    extractor: Box<dyn Extractor>,
    bookmark: Option<i64>,
    timeout: Option<Duration>,
    shutdown: SharedShutdown,
) -> StreamOutcome {
    let sync = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, extractor.sync(bookmark)).await.ok(),
            None => Some(extractor.sync(bookmark).await),
        }
    };

    match shutdown.run_until_shutdown(sync).await {
        None => StreamOutcome::Abandoned,
        Some(None) => StreamOutcome::TimedOut,
        Some(Some(Ok(batch))) => StreamOutcome::Synced(batch),
        Some(Some(Err(e))) => StreamOutcome::Failed(e),
    }
}

fn create_spinner(enabled: bool, total: usize) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("Syncing {total} stream(s)"));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn open_sink(output: &str) -> Result<Box<dyn RecordSink>, CliError> {
    if output == "-" {
        Ok(Box::new(JsonLinesSink::stdout()))
    } else {
        Ok(Box::new(JsonLinesSink::create(output)?))
    }
}

impl SyncArgs {
    /// Execute the sync
    ///
    /// Every stream runs even when others fail; completed bookmarks are
    /// saved before a failure is reported.
    pub async fn execute(
        &self,
        max_retries: Option<u32>,
        shutdown: SharedShutdown,
    ) -> Result<SyncSummary, CliError> {
        let mut config = TapConfig::load(&self.config)?;
        if let Some(retries) = max_retries {
            config.max_retries = retries;
        }

        if let Some(addr) = self.metrics_addr {
            init_metrics(addr)?;
        }

        let catalog = StreamCatalog::load()?;
        let selected = catalog.select(self.streams.as_slice())?;

        let _lock = self
            .state
            .as_deref()
            .map(StateLock::try_acquire)
            .transpose()?;
        let mut state = match &self.state {
            Some(path) => StateFile::load_or_default(path)?,
            None => StateFile::new(),
        };

        let client = Arc::new(ApiClient::new(config.client_settings())?);
        let options = config.extractor_options();

        let mut tasks = Vec::with_capacity(selected.len());
        for definition in selected {
            let extractor = create_extractor(definition, client.clone(), &options)?;
            let bookmark = state.bookmark(definition.name());
            tasks.push((definition, extractor, bookmark));
        }

        let mut sink = open_sink(&self.output)?;
        let spinner = create_spinner(self.progress, tasks.len());
        let timeout = self.stream_timeout_secs.map(Duration::from_secs);
        let total = tasks.len();

        info!(
            streams = total,
            concurrency = self.concurrency,
            "Starting sync"
        );

        let mut results = stream::iter(tasks)
            .map(|(definition, extractor, bookmark)| {
                let shutdown = shutdown.clone();
                let span = info_span!("sync_stream", stream = %definition.name());
                async move {
                    let metrics = StreamSyncMetrics::start(definition.name());
                    info!(bookmark = ?bookmark, strategy = %extractor.strategy(), "Stream sync started");
                    let outcome = run_stream(extractor, bookmark, timeout, shutdown).await;
                    let (label, records) = match &outcome {
                        StreamOutcome::Synced(batch) => {
                            (SyncOutcome::Success, batch.records.len() as u64)
                        }
                        StreamOutcome::Abandoned | StreamOutcome::TimedOut => {
                            (SyncOutcome::Abandoned, 0)
                        }
                        StreamOutcome::Failed(_) => (SyncOutcome::Failed, 0),
                    };
                    metrics.finish(label, records);
                    (definition, outcome)
                }
                .instrument(span)
            })
            .buffer_unordered(self.concurrency.max(1));

        let mut summary = SyncSummary::default();
        let mut done = 0usize;

        while let Some((definition, outcome)) = results.next().await {
            done += 1;
            let name = definition.name();
            spinner.set_message(format!("{done}/{total} {name}"));

            match outcome {
                StreamOutcome::Synced(batch) => {
                    sink.write_records(name, &batch.records)?;
                    summary.records += batch.records.len() as u64;
                    self.commit(&mut state, definition, &batch, sink.as_mut())?;
                    info!(stream = name, records = batch.records.len(), "Stream synced");
                    summary.synced.push(name.to_string());
                }
                StreamOutcome::Abandoned => {
                    warn!(stream = name, "Stream abandoned by shutdown; bookmark unchanged");
                    summary.abandoned.push(name.to_string());
                }
                StreamOutcome::TimedOut => {
                    warn!(
                        stream = name,
                        timeout_secs = ?self.stream_timeout_secs,
                        "Stream timed out; bookmark unchanged"
                    );
                    summary.abandoned.push(name.to_string());
                }
                StreamOutcome::Failed(e) => {
                    error!(stream = name, error = %e, "Stream failed");
                    summary.failed.push(name.to_string());
                }
            }
        }

        spinner.finish_and_clear();
        sink.write_state(&state.to_message())?;
        sink.close()?;

        info!(
            synced = summary.synced.len(),
            abandoned = summary.abandoned.len(),
            failed = summary.failed.len(),
            records = summary.records,
            "Sync finished"
        );

        if !summary.failed.is_empty() {
            let mut failed = summary.failed.clone();
            failed.sort();
            return Err(CliError::StreamsFailed { failed });
        }
        Ok(summary)
    }

    /// Record a finished batch in the state and persist it
    fn commit(
        &self,
        state: &mut StateFile,
        definition: &StreamDefinition,
        batch: &StreamBatch,
        sink: &mut dyn RecordSink,
    ) -> Result<(), CliError> {
        let checkpoint = Checkpoint::from_batch(definition.name(), batch);
        let recorded = checkpoint.is_some();
        if let Some(checkpoint) = checkpoint {
            state.add_checkpoint(checkpoint);
        }

        let advanced = match (batch.bookmark, definition.replication_key()) {
            (Some(value), Some(key)) => state.advance(definition.name(), key, value),
            _ => false,
        };

        if recorded || advanced {
            if let Some(path) = &self.state {
                state.save(path)?;
            }
        }
        if advanced {
            sink.write_state(&state.to_message())?;
        }
        Ok(())
    }
}
