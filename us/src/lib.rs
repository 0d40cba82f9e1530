//! UploadStore - caption rotation and durable upload history
//!
//! Tracks, per video, which pre-written caption was used last and how many
//! times the video was posted, so a scheduled poster can rotate captions
//! round-robin across restarts.
//!
//! # Layout on disk
//!
//! ```text
//! upload_history.json        # { "<video>": { last_caption_index, upload_count, last_upload } }
//! upload_history.json.lock   # held for the duration of one upload cycle
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use uploadstore::{JsonFileBackend, UploadHistoryTracker, VideoCatalog};
//!
//! let catalog = Arc::new(VideoCatalog::default().with_video("clip.mp4", ["A", "B"]));
//! let tracker = UploadHistoryTracker::open(catalog, Arc::new(JsonFileBackend::new("upload_history.json")));
//! let pick = tracker.peek_next_caption("clip.mp4")?;
//! // ... upload ...
//! tracker.commit_upload("clip.mp4", pick.index, true, chrono::Utc::now())?;
//! ```

mod backend;
mod catalog;
mod error;
mod lock;
mod record;
mod tracker;

pub use backend::{HistoryBackend, JsonFileBackend, MemoryBackend};
pub use catalog::{VideoCatalog, VideoEntry};
pub use error::HistoryError;
pub use lock::StoreLock;
pub use record::{HistoryMap, NEVER_USED, UploadRecord, parse_timestamp};
pub use tracker::{CaptionPick, CommitOutcome, UploadHistoryTracker};

/// Default file name for the upload history document
pub const DEFAULT_HISTORY_FILE: &str = "upload_history.json";
