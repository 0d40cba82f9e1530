//! Durable store backends for the upload history
//!
//! A backend loads and saves the whole [`HistoryMap`] as one unit. The JSON
//! file backend writes through a temp file in the target directory and renames
//! it into place, so the file on disk is always either the previous or the new
//! document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::HistoryError;
use crate::record::HistoryMap;

/// Load/save contract for the upload history document
pub trait HistoryBackend: Send + Sync {
    /// Load the whole store; an absent store is an empty map
    fn load(&self) -> Result<HistoryMap, HistoryError>;

    /// Replace the whole store
    fn save(&self, history: &HistoryMap) -> Result<(), HistoryError>;

    /// Human-readable location for logs and status output
    fn location(&self) -> String;
}

/// Upload history kept in a single pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "JsonFileBackend::new: called");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_err(&self, message: impl ToString) -> HistoryError {
        HistoryError::PersistenceWrite {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }

    fn read_err(&self, message: impl ToString) -> HistoryError {
        HistoryError::PersistenceRead {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }
}

impl HistoryBackend for JsonFileBackend {
    fn load(&self) -> Result<HistoryMap, HistoryError> {
        debug!(path = %self.path.display(), "JsonFileBackend::load: called");
        if !self.path.exists() {
            debug!("JsonFileBackend::load: no history file, starting empty");
            return Ok(HistoryMap::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| self.read_err(e))?;
        if content.trim().is_empty() {
            debug!("JsonFileBackend::load: history file is empty");
            return Ok(HistoryMap::new());
        }

        let history: HistoryMap = serde_json::from_str(&content).map_err(|e| self.read_err(e))?;
        debug!(record_count = history.len(), "JsonFileBackend::load: loaded");
        Ok(history)
    }

    fn save(&self, history: &HistoryMap) -> Result<(), HistoryError> {
        debug!(path = %self.path.display(), record_count = history.len(), "JsonFileBackend::save: called");
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| self.write_err(e))?;

        // Same directory as the target so the rename never crosses filesystems
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.write_err(e))?;
        serde_json::to_writer_pretty(&mut tmp, history).map_err(|e| self.write_err(e))?;
        tmp.write_all(b"\n").map_err(|e| self.write_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_err(e.error))?;

        info!(path = %self.path.display(), record_count = history.len(), "Saved upload history");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory backend for tests and dry runs
///
/// Saves and reads can be made to fail to exercise the tracker's error paths.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    stored: Mutex<Option<HistoryMap>>,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    save_count: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing store
    pub fn with_history(history: HistoryMap) -> Self {
        Self {
            stored: Mutex::new(Some(history)),
            ..Default::default()
        }
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Last successfully saved store, if any
    pub fn stored(&self) -> Option<HistoryMap> {
        self.stored.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }
}

impl HistoryBackend for MemoryBackend {
    fn load(&self) -> Result<HistoryMap, HistoryError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(HistoryError::PersistenceRead {
                path: PathBuf::from(self.location()),
                message: "simulated read failure".to_string(),
            });
        }
        Ok(self.stored().unwrap_or_default())
    }

    fn save(&self, history: &HistoryMap) -> Result<(), HistoryError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(HistoryError::PersistenceWrite {
                path: PathBuf::from(self.location()),
                message: "simulated write failure".to_string(),
            });
        }
        *self.stored.lock().unwrap_or_else(|e| e.into_inner()) = Some(history.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
