//! Connector configuration
//!
//! Loaded from a JSON file; `TAP_STRIPE_API_KEY` supplies or overrides the
//! API key so it can stay out of files on disk.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::backoff::{DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS, INITIAL_BACKOFF_MS};
use crate::client::http::{ClientSettings, DEFAULT_BASE_URL, DEFAULT_REQUESTS_PER_SECOND};
use crate::parse_timestamp;
use crate::report::resolver::{PollPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::streams::ExtractorOptions;

/// Environment variable that supplies or overrides `api_key`
pub const API_KEY_ENV: &str = "TAP_STRIPE_API_KEY";

/// Upper bound for `max_retries`
pub const MAX_RETRIES_LIMIT: u32 = 20;

/// Secret API key; `Debug` never prints it
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for the authorization header only
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the key is blank
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.chars().count() > 8 {
            let prefix: String = self.0.chars().take(8).collect();
            write!(f, "ApiKey({prefix}***)")
        } else {
            f.write_str("ApiKey(***)")
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid config JSON
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field failed validation
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Report polling settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Download-URL polls per run before giving up for this sync
    pub max_attempts: u32,
    /// Poll backoff base in seconds; the n-th wait is `base * 2^n`
    pub backoff_base_secs: f64,
    /// Optional ceiling for a single poll wait
    pub max_backoff_secs: Option<f64>,
    /// Surface non-retryable HTTP statuses immediately while polling
    pub strict_polling: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_secs: 1.0,
            max_backoff_secs: None,
            strict_polling: false,
        }
    }
}

/// Connector configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct TapConfig {
    /// Secret API key
    #[serde(default)]
    pub api_key: ApiKey,
    /// Lower bound for the first sync (ISO-8601 or epoch seconds)
    #[serde(default)]
    pub start_date: Option<String>,
    /// API root
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Overall request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Transport retries for 429, 5xx and network errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Outbound request budget per second
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    /// Report polling settings
    #[serde(default)]
    pub report: ReportSettings,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_requests_per_second() -> u32 {
    DEFAULT_REQUESTS_PER_SECOND
}

impl TapConfig {
    /// Load, apply the environment override and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&content)?;
        config.apply_api_key_override(std::env::var(API_KEY_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Replace the key when a non-blank override is given
    pub fn apply_api_key_override(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api_key = ApiKey::new(key);
        }
    }

    /// Validate every field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "api_key is required (set it in the config or via {API_KEY_ENV})"
            )));
        }

        self.start_timestamp()?;

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "base_url must be an http(s) URL, got {}",
                self.base_url
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_retries must be at most {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }

        if self.requests_per_second == 0 {
            return Err(ConfigError::Invalid(
                "requests_per_second must be at least 1".to_string(),
            ));
        }

        if self.report.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "report.max_attempts must be at least 1".to_string(),
            ));
        }

        if !self.report.backoff_base_secs.is_finite() || self.report.backoff_base_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "report.backoff_base_secs must be a non-negative number, got {}",
                self.report.backoff_base_secs
            )));
        }

        if let Some(cap) = self.report.max_backoff_secs {
            if !cap.is_finite() || cap < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "report.max_backoff_secs must be a non-negative number, got {cap}"
                )));
            }
        }

        Ok(())
    }

    /// `start_date` as epoch seconds
    pub fn start_timestamp(&self) -> Result<Option<i64>, ConfigError> {
        match self.start_date.as_deref() {
            None => Ok(None),
            Some(raw) => parse_timestamp(raw).map(Some).ok_or_else(|| {
                ConfigError::Invalid(format!("start_date is not a valid date: {raw}"))
            }),
        }
    }

    /// HTTP client settings
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            requests_per_second: self.requests_per_second,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Download-URL polling policy
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            max_attempts: self.report.max_attempts,
            backoff_base: Duration::try_from_secs_f64(self.report.backoff_base_secs)
                .unwrap_or(Duration::from_secs(1)),
            max_backoff: self
                .report
                .max_backoff_secs
                .and_then(|cap| Duration::try_from_secs_f64(cap).ok()),
            strict: self.report.strict_polling,
        }
    }

    /// Options shared by every extractor of a run
    ///
    /// Call after [`TapConfig::validate`]; an unparseable `start_date` is
    /// treated as absent here.
    pub fn extractor_options(&self) -> ExtractorOptions {
        ExtractorOptions {
            start_date: self.start_timestamp().ok().flatten(),
            poll_policy: self.poll_policy(),
        }
    }
}
