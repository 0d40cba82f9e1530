//! Exclusive lock around a whole upload cycle
//!
//! Held from peek until commit so two cycles never interleave, whether they
//! run in the same process or in separate `pd` invocations.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::HistoryError;

/// Advisory lock on `<history file>.lock`, released on drop
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Lock file path that guards the given history file
    pub fn path_for(history_path: &Path) -> PathBuf {
        let mut name = history_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".lock");
        history_path.with_file_name(name)
    }

    fn open(lock_path: &Path) -> Result<File, HistoryError> {
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|_| HistoryError::Lock(lock_path.to_path_buf()))?;
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(|_| HistoryError::Lock(lock_path.to_path_buf()))
    }

    /// Take the lock without waiting
    pub fn try_acquire(history_path: &Path) -> Result<Self, HistoryError> {
        let path = Self::path_for(history_path);
        debug!(?path, "StoreLock::try_acquire: called");
        let file = Self::open(&path)?;
        file.try_lock_exclusive().map_err(|_| {
            debug!(?path, "StoreLock::try_acquire: already held");
            HistoryError::Lock(path.clone())
        })?;
        Ok(Self { file, path })
    }

    /// Block until the lock is available
    pub fn acquire(history_path: &Path) -> Result<Self, HistoryError> {
        let path = Self::path_for(history_path);
        debug!(?path, "StoreLock::acquire: called");
        let file = Self::open(&path)?;
        file.lock_exclusive().map_err(|_| HistoryError::Lock(path.clone()))?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release store lock");
        }
    }
}
