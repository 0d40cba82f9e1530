//! Upload history error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the upload history tracker and its backends
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Unknown video: {0}")]
    UnknownVideo(String),

    #[error("Video {0} has no captions configured")]
    EmptyCaptionSet(String),

    #[error("Caption index {index} out of range for {video_id} ({count} captions)")]
    CaptionIndexOutOfRange { video_id: String, index: usize, count: usize },

    #[error("Failed to persist upload history to {path}: {message}")]
    PersistenceWrite { path: PathBuf, message: String },

    #[error("Failed to read upload history from {path}: {message}")]
    PersistenceRead { path: PathBuf, message: String },

    #[error("Upload history is locked by another upload ({0})")]
    Lock(PathBuf),
}

impl HistoryError {
    /// True when the upload itself went through but its outcome was not recorded
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, HistoryError::PersistenceWrite { .. })
    }

    /// True for configuration problems that retrying will not fix
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            HistoryError::UnknownVideo(_) | HistoryError::EmptyCaptionSet(_) | HistoryError::CaptionIndexOutOfRange { .. }
        )
    }
}
