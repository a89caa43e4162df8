//! Bookmark state persistence
//!
//! Writes are atomic: the JSON is written to a temp file in the same
//! directory, synced, then renamed over the target under an fd-lock write
//! lock.

use super::checkpoint::Checkpoint;
use fd_lock::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Current state schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed state file size (10 MB)
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Checkpoints retained in the history
pub const MAX_CHECKPOINTS: usize = 20;

/// Replication bookmark of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    replication_key: String,
    #[serde(deserialize_with = "deserialize_bookmark_value")]
    value: i64,
    updated_at: i64,
}

impl Bookmark {
    /// Field the bookmark tracks
    pub fn replication_key(&self) -> &str {
        &self.replication_key
    }

    /// Bookmark value (epoch seconds)
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Last time the value moved (epoch seconds)
    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

/// Accepts integers, numeric strings and ISO-8601 timestamps
fn deserialize_bookmark_value<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    crate::normalize_bookmark(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized bookmark value {raw}")))
}

/// Persistent bookmark state for all streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    schema_version: String,
    #[serde(default)]
    bookmarks: BTreeMap<String, Bookmark>,
    #[serde(default)]
    checkpoints: Vec<Checkpoint>,
    created_at: i64,
    updated_at: i64,
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

impl StateFile {
    /// Create an empty state
    pub fn new() -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            bookmarks: BTreeMap::new(),
            checkpoints: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Schema version of this state
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Bookmark value for `stream`
    pub fn bookmark(&self, stream: &str) -> Option<i64> {
        self.bookmarks.get(stream).map(Bookmark::value)
    }

    /// All bookmarks by stream name
    pub fn bookmarks(&self) -> &BTreeMap<String, Bookmark> {
        &self.bookmarks
    }

    /// Checkpoint history, oldest first
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Move the bookmark of `stream` forward to `value`
    ///
    /// Returns `false` and leaves the state untouched when `value` is not
    /// past the stored bookmark.
    pub fn advance(&mut self, stream: &str, replication_key: &str, value: i64) -> bool {
        if let Some(current) = self.bookmarks.get(stream) {
            if value <= current.value {
                if value < current.value {
                    warn!(
                        stream,
                        current = current.value,
                        proposed = value,
                        "Refusing to move bookmark backwards"
                    );
                }
                return false;
            }
        }

        let now = chrono::Utc::now().timestamp();
        self.bookmarks.insert(
            stream.to_string(),
            Bookmark {
                replication_key: replication_key.to_string(),
                value,
                updated_at: now,
            },
        );
        self.updated_at = now;
        debug!(stream, value, "Bookmark advanced");
        true
    }

    /// Append a checkpoint, keeping only the most recent ones
    pub fn add_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.push(checkpoint);
        if self.checkpoints.len() > MAX_CHECKPOINTS {
            let drain_count = self.checkpoints.len() - MAX_CHECKPOINTS;
            self.checkpoints.drain(0..drain_count);
        }
        self.updated_at = chrono::Utc::now().timestamp();
    }

    /// Payload of a STATE message: `{"bookmarks": {stream: {...}}}`
    pub fn to_message(&self) -> Value {
        serde_json::json!({ "bookmarks": self.bookmarks })
    }

    /// Validate schema version (accepts current version only)
    pub fn validate_schema_version(&self) -> Result<(), StateError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(StateError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: self.schema_version.clone(),
            });
        }
        Ok(())
    }

    /// Load `path`, or start empty if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, StateError> {
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "No state file; starting without bookmarks");
            Ok(Self::new())
        }
    }

    /// Save state to file with atomic writes and file locking
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        debug!(
            path = %path.display(),
            bookmarks = self.bookmarks.len(),
            "Saving state"
        );

        let parent_dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir).map_err(|e| StateError::Io(e.to_string()))?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StateError::Serialization(e.to_string()))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path.with_extension("lock"))
            .map_err(|e| StateError::Lock(format!("Failed to create lock file: {e}")))?;

        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| StateError::Lock(format!("Failed to acquire write lock: {e}")))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| StateError::Io(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| StateError::Io(format!("Failed to write temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| StateError::Io(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| StateError::Io(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(path)
            .map_err(|e| StateError::Io(format!("Failed to persist temp file: {e}")))?;

        // Make the rename durable
        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        info!(
            path = %path.display(),
            bookmarks = self.bookmarks.len(),
            checkpoints = self.checkpoints.len(),
            "State saved"
        );
        Ok(())
    }

    /// Load state from file under a read lock
    pub fn load(path: &Path) -> Result<Self, StateError> {
        debug!(path = %path.display(), "Loading state");

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path.with_extension("lock"))
            .map_err(|e| StateError::Lock(format!("Failed to create lock file: {e}")))?;

        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| StateError::Lock(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| StateError::Io(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(StateError::TooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|e| StateError::Io(e.to_string()))?;
        let state: StateFile = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize state");
            StateError::Deserialization(e.to_string())
        })?;

        state.validate_schema_version()?;

        info!(
            bookmarks = state.bookmarks.len(),
            checkpoints = state.checkpoints.len(),
            "State loaded"
        );
        Ok(state)
    }
}

/// Errors related to bookmark state
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    TooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Lock error
    #[error("lock error: {0}")]
    Lock(String),
}
