//! Upload History Tracker
//!
//! Decides which caption a video gets next and records successful uploads.
//! Peeking never mutates stored state; only a successful commit advances the
//! rotation, and every commit rewrites the whole store through the backend.
//! A commit whose save failed stays in memory as unsaved; reloads keep it and
//! retry the save until it reaches the backend.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backend::HistoryBackend;
use crate::catalog::VideoCatalog;
use crate::error::HistoryError;
use crate::record::{HistoryMap, UploadRecord};

/// Caption chosen by [`UploadHistoryTracker::peek_next_caption`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionPick {
    pub video_id: String,
    pub index: usize,
    pub caption: String,
    /// Number of captions in the video's rotation
    pub count: usize,
}

/// What a commit did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Rotation advanced and the store was saved
    Recorded(UploadRecord),
    /// Upload failed; nothing changed
    Unchanged,
}

/// Owns the upload history for one catalog and one backend
pub struct UploadHistoryTracker {
    catalog: Arc<VideoCatalog>,
    backend: Arc<dyn HistoryBackend>,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    records: HistoryMap,
    /// Videos advanced in memory whose save failed
    unsaved: BTreeSet<String>,
}

impl UploadHistoryTracker {
    /// Load the store from `backend`
    ///
    /// A store that cannot be read starts empty; that trades a possible
    /// caption repeat for staying available.
    pub fn open(catalog: Arc<VideoCatalog>, backend: Arc<dyn HistoryBackend>) -> Self {
        debug!(location = %backend.location(), "UploadHistoryTracker::open: called");
        let records = load_or_empty(backend.as_ref());
        info!(
            location = %backend.location(),
            record_count = records.len(),
            "Opened upload history"
        );
        Self {
            catalog,
            backend,
            state: Mutex::new(State {
                records,
                unsaved: BTreeSet::new(),
            }),
        }
    }

    pub fn catalog(&self) -> &VideoCatalog {
        &self.catalog
    }

    pub fn location(&self) -> String {
        self.backend.location()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        // Records are plain data; a panic elsewhere cannot leave them half-updated
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace in-memory records with what the backend holds now
    ///
    /// Unsaved records survive unless the backend already has a record with at
    /// least as many uploads. Survivors are saved again; if that fails they
    /// stay unsaved.
    pub fn reload(&self) {
        debug!("UploadHistoryTracker::reload: called");
        let mut fresh = load_or_empty(self.backend.as_ref());
        let mut state = self.lock_state();

        let unsaved = std::mem::take(&mut state.unsaved);
        for video_id in unsaved {
            let Some(ours) = state.records.get(&video_id) else {
                continue;
            };
            let newer_on_disk = fresh
                .get(&video_id)
                .is_some_and(|theirs| theirs.upload_count >= ours.upload_count);
            if newer_on_disk {
                debug!(%video_id, "UploadHistoryTracker::reload: stored record supersedes unsaved one");
                continue;
            }
            fresh.insert(video_id.clone(), ours.clone());
            state.unsaved.insert(video_id);
        }
        state.records = fresh;

        if state.unsaved.is_empty() {
            return;
        }
        match self.backend.save(&state.records) {
            Ok(()) => {
                info!(videos = ?state.unsaved, "Saved previously unsaved uploads");
                state.unsaved.clear();
            }
            Err(e) => {
                warn!(videos = ?state.unsaved, error = %e, "Upload history still not saved");
            }
        }
    }

    /// Videos whose last commit has not reached the backend
    pub fn unsaved(&self) -> Vec<String> {
        self.lock_state().unsaved.iter().cloned().collect()
    }

    /// Next caption for `video_id` without advancing the rotation
    pub fn peek_next_caption(&self, video_id: &str) -> Result<CaptionPick, HistoryError> {
        debug!(%video_id, "UploadHistoryTracker::peek_next_caption: called");
        let captions = self.catalog.get_captions(video_id)?;
        if captions.is_empty() {
            debug!(%video_id, "UploadHistoryTracker::peek_next_caption: empty caption set");
            return Err(HistoryError::EmptyCaptionSet(video_id.to_string()));
        }

        let mut state = self.lock_state();
        let record = state.records.entry(video_id.to_string()).or_default();
        let index = record.next_index(captions.len());
        debug!(%video_id, index, count = captions.len(), "UploadHistoryTracker::peek_next_caption: picked");

        Ok(CaptionPick {
            video_id: video_id.to_string(),
            index,
            caption: captions[index].clone(),
            count: captions.len(),
        })
    }

    /// Record the outcome of an upload that used `caption_index`
    ///
    /// On success the whole store is persisted. If that save fails the
    /// in-memory record stays advanced, is marked unsaved, and
    /// `PersistenceWrite` is returned, so the caller can tell "not recorded"
    /// apart from "upload failed".
    pub fn commit_upload(
        &self,
        video_id: &str,
        caption_index: usize,
        succeeded: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<CommitOutcome, HistoryError> {
        debug!(%video_id, caption_index, succeeded, "UploadHistoryTracker::commit_upload: called");
        let captions = self.catalog.get_captions(video_id)?;
        if captions.is_empty() {
            return Err(HistoryError::EmptyCaptionSet(video_id.to_string()));
        }
        if caption_index >= captions.len() {
            debug!(%video_id, caption_index, "UploadHistoryTracker::commit_upload: index out of range");
            return Err(HistoryError::CaptionIndexOutOfRange {
                video_id: video_id.to_string(),
                index: caption_index,
                count: captions.len(),
            });
        }

        if !succeeded {
            debug!(%video_id, "UploadHistoryTracker::commit_upload: upload failed, rotation unchanged");
            return Ok(CommitOutcome::Unchanged);
        }

        let mut state = self.lock_state();
        let record = state.records.entry(video_id.to_string()).or_default();
        record.record_success(caption_index, timestamp);
        let updated = record.clone();

        if let Err(e) = self.backend.save(&state.records) {
            state.unsaved.insert(video_id.to_string());
            return Err(e);
        }
        state.unsaved.clear();
        info!(
            %video_id,
            caption_index,
            upload_count = updated.upload_count,
            "Recorded successful upload"
        );
        Ok(CommitOutcome::Recorded(updated))
    }

    /// Current record for a video, if one exists
    pub fn record(&self, video_id: &str) -> Option<UploadRecord> {
        self.lock_state().records.get(video_id).cloned()
    }

    /// Snapshot of every record
    pub fn records(&self) -> HistoryMap {
        self.lock_state().records.clone()
    }
}

fn load_or_empty(backend: &dyn HistoryBackend) -> HistoryMap {
    match backend.load() {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "Upload history unreadable, starting from an empty store");
            HistoryMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{JsonFileBackend, MemoryBackend};
    use tempfile::TempDir;

    fn clip_catalog() -> Arc<VideoCatalog> {
        Arc::new(VideoCatalog::default().with_video("clip.mp4", ["A", "B", "C"]))
    }

    fn memory_tracker() -> (UploadHistoryTracker, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let tracker = UploadHistoryTracker::open(clip_catalog(), backend.clone());
        (tracker, backend)
    }

    #[test]
    fn test_new_video_starts_at_first_caption() {
        let (tracker, backend) = memory_tracker();

        let pick = tracker.peek_next_caption("clip.mp4").unwrap();
        assert_eq!(pick.index, 0);
        assert_eq!(pick.caption, "A");
        assert_eq!(pick.count, 3);

        // Lazily created, not persisted
        assert!(tracker.record("clip.mp4").unwrap().is_unseen());
        assert_eq!(backend.save_count(), 0);
    }

    #[test]
    fn test_peek_is_idempotent() {
        let (tracker, _) = memory_tracker();
        let first = tracker.peek_next_caption("clip.mp4").unwrap();
        let second = tracker.peek_next_caption("clip.mp4").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_round_robin_covers_every_caption() {
        let catalog = Arc::new(VideoCatalog::default().with_video("long.mov", ["1", "2", "3", "4", "5"]));
        let tracker = UploadHistoryTracker::open(catalog, Arc::new(MemoryBackend::new()));

        let mut seen = Vec::new();
        for _ in 0..5 {
            let pick = tracker.peek_next_caption("long.mov").unwrap();
            seen.push(pick.index);
            tracker.commit_upload("long.mov", pick.index, true, Utc::now()).unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(tracker.peek_next_caption("long.mov").unwrap().index, 0);
        assert_eq!(tracker.record("long.mov").unwrap().upload_count, 5);
    }

    #[test]
    fn test_failed_upload_does_not_advance() {
        let (tracker, backend) = memory_tracker();

        let pick = tracker.peek_next_caption("clip.mp4").unwrap();
        let outcome = tracker.commit_upload("clip.mp4", pick.index, false, Utc::now()).unwrap();

        assert_eq!(outcome, CommitOutcome::Unchanged);
        assert_eq!(tracker.peek_next_caption("clip.mp4").unwrap(), pick);
        assert_eq!(tracker.record("clip.mp4").unwrap().upload_count, 0);
        assert_eq!(backend.save_count(), 0);
    }

    #[test]
    fn test_concrete_scenario() {
        let (tracker, backend) = memory_tracker();
        let at = Utc::now();

        let pick = tracker.peek_next_caption("clip.mp4").unwrap();
        assert_eq!((pick.index, pick.caption.as_str()), (0, "A"));
        tracker.commit_upload("clip.mp4", 0, true, at).unwrap();
        let record = tracker.record("clip.mp4").unwrap();
        assert_eq!((record.last_caption_index, record.upload_count), (0, 1));

        let pick = tracker.peek_next_caption("clip.mp4").unwrap();
        assert_eq!((pick.index, pick.caption.as_str()), (1, "B"));
        tracker.commit_upload("clip.mp4", 1, true, at).unwrap();
        let record = tracker.record("clip.mp4").unwrap();
        assert_eq!((record.last_caption_index, record.upload_count), (1, 2));

        let pick = tracker.peek_next_caption("clip.mp4").unwrap();
        assert_eq!((pick.index, pick.caption.as_str()), (2, "C"));
        tracker.commit_upload("clip.mp4", 2, false, at).unwrap();
        let record = tracker.record("clip.mp4").unwrap();
        assert_eq!((record.last_caption_index, record.upload_count), (1, 2));

        let pick = tracker.peek_next_caption("clip.mp4").unwrap();
        assert_eq!((pick.index, pick.caption.as_str()), (2, "C"));
        tracker.commit_upload("clip.mp4", 2, true, at).unwrap();
        let record = tracker.record("clip.mp4").unwrap();
        assert_eq!((record.last_caption_index, record.upload_count), (2, 3));
        assert_eq!(record.last_upload, Some(at));

        let pick = tracker.peek_next_caption("clip.mp4").unwrap();
        assert_eq!((pick.index, pick.caption.as_str()), (0, "A"));

        let stored = backend.stored().unwrap();
        assert_eq!(stored["clip.mp4"].upload_count, 3);
    }

    #[test]
    fn test_unknown_video() {
        let (tracker, _) = memory_tracker();
        assert!(matches!(
            tracker.peek_next_caption("missing.mp4"),
            Err(HistoryError::UnknownVideo(id)) if id == "missing.mp4"
        ));
        assert!(matches!(
            tracker.commit_upload("missing.mp4", 0, true, Utc::now()),
            Err(HistoryError::UnknownVideo(_))
        ));
    }

    #[test]
    fn test_empty_caption_set() {
        let catalog = Arc::new(VideoCatalog::default().with_video("silent.mov", Vec::<String>::new()));
        let tracker = UploadHistoryTracker::open(catalog, Arc::new(MemoryBackend::new()));

        assert!(matches!(
            tracker.peek_next_caption("silent.mov"),
            Err(HistoryError::EmptyCaptionSet(_))
        ));
    }

    #[test]
    fn test_commit_index_out_of_range() {
        let (tracker, _) = memory_tracker();
        let err = tracker.commit_upload("clip.mp4", 3, true, Utc::now()).unwrap_err();
        assert!(matches!(err, HistoryError::CaptionIndexOutOfRange { index: 3, count: 3, .. }));
    }

    #[test]
    fn test_persistence_failure_is_distinct() {
        let (tracker, backend) = memory_tracker();
        backend.set_fail_saves(true);

        let pick = tracker.peek_next_caption("clip.mp4").unwrap();
        let err = tracker.commit_upload("clip.mp4", pick.index, true, Utc::now()).unwrap_err();
        assert!(err.is_persistence_failure());

        // This process moves on; the durable store is still pre-commit
        assert_eq!(tracker.peek_next_caption("clip.mp4").unwrap().index, 1);
        assert!(backend.stored().is_none());
        assert_eq!(tracker.unsaved(), vec!["clip.mp4"]);

        // A restart now would start over
        let restarted = UploadHistoryTracker::open(clip_catalog(), backend.clone());
        assert_eq!(restarted.peek_next_caption("clip.mp4").unwrap().index, 0);
    }

    #[test]
    fn test_reload_keeps_unsaved_commit() {
        let (tracker, backend) = memory_tracker();
        backend.set_fail_saves(true);

        let pick = tracker.peek_next_caption("clip.mp4").unwrap();
        assert!(tracker.commit_upload("clip.mp4", pick.index, true, Utc::now()).is_err());

        tracker.reload();
        assert_eq!(tracker.peek_next_caption("clip.mp4").unwrap().index, 1);
        assert_eq!(tracker.unsaved(), vec!["clip.mp4"]);
        assert!(backend.stored().is_none());

        backend.set_fail_saves(false);
        tracker.reload();
        assert!(tracker.unsaved().is_empty());
        assert_eq!(backend.stored().unwrap()["clip.mp4"].upload_count, 1);
        assert_eq!(tracker.peek_next_caption("clip.mp4").unwrap().index, 1);
    }

    #[test]
    fn test_successful_commit_saves_earlier_unsaved() {
        let catalog = Arc::new(
            VideoCatalog::default()
                .with_video("a.mov", ["a1", "a2"])
                .with_video("b.mov", ["b1", "b2"]),
        );
        let backend = Arc::new(MemoryBackend::new());
        let tracker = UploadHistoryTracker::open(catalog, backend.clone());

        backend.set_fail_saves(true);
        assert!(tracker.commit_upload("a.mov", 0, true, Utc::now()).is_err());
        backend.set_fail_saves(false);
        tracker.commit_upload("b.mov", 0, true, Utc::now()).unwrap();

        let stored = backend.stored().unwrap();
        assert_eq!(stored["a.mov"].upload_count, 1);
        assert_eq!(stored["b.mov"].upload_count, 1);
        assert!(tracker.unsaved().is_empty());
    }

    #[test]
    fn test_reload_prefers_newer_stored_record() {
        let (tracker, backend) = memory_tracker();
        backend.set_fail_saves(true);
        assert!(tracker.commit_upload("clip.mp4", 0, true, Utc::now()).is_err());

        // Another process posted twice meanwhile
        let mut theirs = HistoryMap::new();
        let mut record = UploadRecord::default();
        record.record_success(0, Utc::now());
        record.record_success(1, Utc::now());
        theirs.insert("clip.mp4".to_string(), record);
        backend.set_fail_saves(false);
        backend.save(&theirs).unwrap();

        tracker.reload();
        assert!(tracker.unsaved().is_empty());
        assert_eq!(tracker.record("clip.mp4").unwrap().upload_count, 2);
        assert_eq!(tracker.peek_next_caption("clip.mp4").unwrap().index, 2);
    }

    #[test]
    fn test_unreadable_store_starts_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_fail_loads(true);
        let tracker = UploadHistoryTracker::open(clip_catalog(), backend);

        assert!(tracker.records().is_empty());
        assert_eq!(tracker.peek_next_caption("clip.mp4").unwrap().index, 0);
    }

    #[test]
    fn test_survives_restart() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("upload_history.json");

        {
            let tracker = UploadHistoryTracker::open(clip_catalog(), Arc::new(JsonFileBackend::new(&path)));
            let pick = tracker.peek_next_caption("clip.mp4").unwrap();
            tracker.commit_upload("clip.mp4", pick.index, true, Utc::now()).unwrap();
            // Peeked but never committed: simulated crash mid-upload
            tracker.peek_next_caption("clip.mp4").unwrap();
        }

        let tracker = UploadHistoryTracker::open(clip_catalog(), Arc::new(JsonFileBackend::new(&path)));
        let record = tracker.record("clip.mp4").unwrap();
        assert_eq!(record.last_caption_index, 0);
        assert_eq!(record.upload_count, 1);
        assert_eq!(tracker.peek_next_caption("clip.mp4").unwrap().caption, "B");
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("upload_history.json");
        std::fs::write(&path, "{\"clip.mp4\": {\"last_caption_index\": ").unwrap();

        let tracker = UploadHistoryTracker::open(clip_catalog(), Arc::new(JsonFileBackend::new(&path)));
        assert!(tracker.records().is_empty());

        let pick = tracker.peek_next_caption("clip.mp4").unwrap();
        tracker.commit_upload("clip.mp4", pick.index, true, Utc::now()).unwrap();

        // The commit replaced the corrupt document with a valid one
        let reloaded = JsonFileBackend::new(&path).load().unwrap();
        assert_eq!(reloaded["clip.mp4"].upload_count, 1);
    }

    #[test]
    fn test_records_are_independent() {
        let catalog = Arc::new(
            VideoCatalog::default()
                .with_video("a.mov", ["a1", "a2"])
                .with_video("b.mov", ["b1", "b2"]),
        );
        let tracker = UploadHistoryTracker::open(catalog, Arc::new(MemoryBackend::new()));

        tracker.commit_upload("a.mov", 0, true, Utc::now()).unwrap();
        assert_eq!(tracker.peek_next_caption("a.mov").unwrap().index, 1);
        assert_eq!(tracker.peek_next_caption("b.mov").unwrap().index, 0);
    }
}
