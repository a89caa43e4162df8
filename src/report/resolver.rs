//! Download-URL resolution for report runs
//!
//! Polls a run until its result file URL appears. The wait between polls
//! grows as `base * 2^attempt`; once `max_attempts` polls have been made
//! the resolver gives up and reports "no URL", which is not an error.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::api::ReportRunSource;
use super::{ReportError, ReportResult};
use crate::client::{classify_error, ClientError};
use crate::metrics::record_poll_attempt;
use crate::RunStatus;

/// Default number of polls per run
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Polling policy for [`DownloadResolver`]
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Total polls before giving up
    pub max_attempts: u32,
    /// Base of the exponential wait
    pub backoff_base: Duration,
    /// Optional ceiling for a single wait
    pub max_backoff: Option<Duration>,
    /// Stop on non-retryable HTTP statuses instead of polling on
    pub strict: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_secs(1),
            max_backoff: None,
            strict: false,
        }
    }
}

impl PollPolicy {
    /// Wait after the given 1-based attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        let delay = self.backoff_base.saturating_mul(factor);
        match self.max_backoff {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// What to do with a failed poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Treat as "not ready yet" and poll again
    Retry,
    /// End the sync attempt with an error
    Fatal,
}

/// Decide whether a poll failure is worth retrying
///
/// Lenient polling retries everything. Strict polling stops on statuses the
/// transport layer also refuses to retry (4xx other than 429).
pub fn classify_poll_failure(err: &ClientError, strict: bool) -> PollDecision {
    if !strict {
        return PollDecision::Retry;
    }
    match err {
        ClientError::Http { .. } if !classify_error(err).is_retryable() => PollDecision::Fatal,
        _ => PollDecision::Retry,
    }
}

/// Polls report runs for their result file URL
#[derive(Debug, Clone, Default)]
pub struct DownloadResolver {
    policy: PollPolicy,
}

impl DownloadResolver {
    /// Create a resolver with the given policy
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Active policy
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll `run_id` until its URL is available
    ///
    /// Returns `Ok(None)` once every attempt has been used. No wait follows
    /// the final attempt.
    ///
    /// # Errors
    /// [`ReportError::RunLookup`] only under strict polling, for a
    /// non-retryable HTTP status.
    pub async fn resolve_download_url<S>(
        &self,
        source: &S,
        run_id: &str,
    ) -> ReportResult<Option<String>>
    where
        S: ReportRunSource + ?Sized,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        info!(run_id = %run_id, max_attempts, "Retrieving report download URL");

        for attempt in 1..=max_attempts {
            record_poll_attempt();

            match source.fetch_run(run_id).await {
                Ok(run) => {
                    if let Some(url) = run.result_url {
                        debug!(run_id = %run_id, attempt, "Report download URL available");
                        return Ok(Some(url));
                    }
                    if run.status == RunStatus::Failed {
                        warn!(run_id = %run_id, "Report run failed server-side; no file will appear");
                    } else {
                        debug!(run_id = %run_id, status = %run.status, attempt, "Report not ready");
                    }
                }
                Err(err) => match classify_poll_failure(&err, self.policy.strict) {
                    PollDecision::Retry => {
                        debug!(run_id = %run_id, attempt, error = %err, "Report lookup failed, treating as not ready");
                    }
                    PollDecision::Fatal => {
                        return Err(ReportError::RunLookup {
                            run_id: run_id.to_string(),
                            source: err,
                        });
                    }
                },
            }

            if attempt < max_attempts {
                let delay = self.policy.delay_for(attempt);
                info!(run_id = %run_id, "Backing off for {:.1} seconds", delay.as_secs_f64());
                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            run_id = %run_id,
            max_attempts,
            "Report download URL not available; will retry on the next sync"
        );
        Ok(None)
    }
}
