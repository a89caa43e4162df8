//! Exclusive lock held for the duration of a sync run

use super::file::StateError;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Held while a process syncs against one state file
///
/// The lock lives on a sibling `.lock` file, so reads and atomic replaces
/// of the state file itself are unaffected.
pub struct StateLock {
    _lock: RwLock<File>,
    path: PathBuf,
}

impl StateLock {
    /// Try to take the sync lock for the state file at `path`
    ///
    /// Fails immediately if another process holds it.
    pub fn try_acquire(path: &Path) -> Result<Self, StateError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StateError::Io(e.to_string()))?;
        }

        let lock_path = sync_lock_path(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StateError::Lock(format!("Failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);
        {
            // Forgetting the guard keeps the lock until the file handle closes
            let guard = lock.try_write().map_err(|_| {
                StateError::Lock(format!(
                    "{} is in use by another sync",
                    path.display()
                ))
            })?;
            std::mem::forget(guard);
        }

        Ok(Self {
            _lock: lock,
            path: lock_path,
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn sync_lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".sync.lock");
    path.with_file_name(name)
}
