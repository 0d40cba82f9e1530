//! One upload attempt, end to end
//!
//! lock -> reload -> peek caption -> resolve video -> caption -> upload to each
//! platform -> commit. The rotation only advances when every platform of the
//! attempt succeeded, and never in a dry run.
//!
//! Pool attempts pick the video under the same lock, from the files in the
//! videos directory that have captions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, Utc};
use rand::seq::IndexedRandom;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uploadstore::{CommitOutcome, HistoryError, StoreLock, UploadHistoryTracker, UploadRecord};

use crate::caption::CaptionGenerator;
use crate::config::PoolConfig;
use crate::schedule::is_pool_entry;
use crate::uploader::{DisabledUploader, Platform, UploadRequest, UploadResult, Uploader};
use crate::video::VideoLibrary;

/// Why an upload attempt could not run or could not be recorded
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("Video file not found: {}", .0.display())]
    VideoNotFound(PathBuf),

    #[error("No platforms selected")]
    NoPlatforms,

    /// No file in the videos directory can be posted from the pool
    #[error("No pool video available in {}", .0.display())]
    PoolEmpty(PathBuf),

    #[error("Store lock task failed: {0}")]
    Join(String),

    /// Uploads went through but the history could not be saved
    #[error("Uploaded {} but the history was not saved: {source}", .outcome.video_id)]
    NotRecorded {
        outcome: Box<UploadOutcome>,
        source: HistoryError,
    },
}

impl UploadError {
    pub fn is_persistence_failure(&self) -> bool {
        match self {
            Self::History(e) | Self::NotRecorded { source: e, .. } => e.is_persistence_failure(),
            _ => false,
        }
    }
}

/// Result of [`Orchestrator::upload_video`]
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub video_id: String,
    pub caption_index: usize,
    pub caption_count: usize,
    /// Caption actually posted
    pub caption: String,
    pub ai_caption: bool,
    pub results: Vec<UploadResult>,
    /// Updated record when the rotation advanced
    pub recorded: Option<UploadRecord>,
    pub dry_run: bool,
}

impl UploadOutcome {
    /// Every platform succeeded
    pub fn succeeded(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.succeeded)
    }
}

/// One video of a slot
#[derive(Debug)]
pub struct SlotEntry {
    pub video_id: String,
    pub result: Result<UploadOutcome, UploadError>,
}

impl SlotEntry {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(outcome) if outcome.succeeded())
    }
}

/// Result of [`Orchestrator::run_slot`]
#[derive(Debug, Default)]
pub struct SlotReport {
    pub entries: Vec<SlotEntry>,
}

impl SlotReport {
    pub fn failures(&self) -> impl Iterator<Item = &SlotEntry> {
        self.entries.iter().filter(|e| !e.succeeded())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Any entry whose history could not be saved
    pub fn has_persistence_failure(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(&e.result, Err(err) if err.is_persistence_failure()))
    }
}

/// Runs upload attempts against a tracker, a video library and uploaders
pub struct Orchestrator {
    tracker: Arc<UploadHistoryTracker>,
    library: VideoLibrary,
    uploaders: BTreeMap<Platform, Arc<dyn Uploader>>,
    captioner: Option<CaptionGenerator>,
    /// History file whose lock guards each attempt
    store_lock: Option<PathBuf>,
    pool: PoolConfig,
    /// Where posted pool videos go when `pool.mark_uploaded` is set
    uploaded_dir: PathBuf,
    dry_run: bool,
}

impl Orchestrator {
    pub fn new(tracker: Arc<UploadHistoryTracker>, library: VideoLibrary) -> Self {
        debug!(location = %tracker.location(), "Orchestrator::new: called");
        Self {
            tracker,
            library,
            uploaders: BTreeMap::new(),
            captioner: None,
            store_lock: None,
            pool: PoolConfig::default(),
            uploaded_dir: PathBuf::from("uploaded"),
            dry_run: false,
        }
    }

    pub fn with_uploader(mut self, platform: Platform, uploader: Arc<dyn Uploader>) -> Self {
        self.uploaders.insert(platform, uploader);
        self
    }

    pub fn with_captioner(mut self, captioner: CaptionGenerator) -> Self {
        self.captioner = Some(captioner);
        self
    }

    /// Hold `<history_path>.lock` for each attempt and reload the history under it
    pub fn with_store_lock(mut self, history_path: impl Into<PathBuf>) -> Self {
        self.store_lock = Some(history_path.into());
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig, uploaded_dir: impl Into<PathBuf>) -> Self {
        self.pool = pool;
        self.uploaded_dir = uploaded_dir.into();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn tracker(&self) -> &UploadHistoryTracker {
        &self.tracker
    }

    async fn lock_store(&self) -> Result<Option<StoreLock>, UploadError> {
        let Some(path) = self.store_lock.clone() else {
            return Ok(None);
        };
        debug!(?path, "Orchestrator::lock_store: called");
        let lock = match StoreLock::try_acquire(&path) {
            Ok(lock) => lock,
            Err(HistoryError::Lock(lock_path)) => {
                info!(lock = %lock_path.display(), "Waiting for another upload to finish");
                tokio::task::spawn_blocking(move || StoreLock::acquire(&path))
                    .await
                    .map_err(|e| UploadError::Join(e.to_string()))??
            }
            Err(e) => return Err(e.into()),
        };
        self.tracker.reload();
        Ok(Some(lock))
    }

    /// Post `video_id` to `platforms` with its next caption
    pub async fn upload_video(&self, video_id: &str, platforms: &[Platform]) -> Result<UploadOutcome, UploadError> {
        debug!(%video_id, ?platforms, dry_run = self.dry_run, "Orchestrator::upload_video: called");
        if platforms.is_empty() {
            return Err(UploadError::NoPlatforms);
        }

        let _lock = self.lock_store().await?;
        self.attempt(video_id, platforms).await
    }

    /// Post the next pool video to `platforms`, skipping the ids in `exclude`
    pub async fn upload_from_pool(
        &self,
        platforms: &[Platform],
        exclude: &[String],
    ) -> Result<UploadOutcome, UploadError> {
        debug!(?platforms, ?exclude, "Orchestrator::upload_from_pool: called");
        if platforms.is_empty() {
            return Err(UploadError::NoPlatforms);
        }

        let _lock = self.lock_store().await?;
        let video_id = self.pick_from_pool(exclude)?;
        info!(%video_id, random = self.pool.random_selection, "Picked pool video");

        let outcome = self.attempt(&video_id, platforms).await?;
        if self.pool.mark_uploaded && outcome.recorded.is_some() {
            self.move_to_uploaded(&video_id);
        }
        Ok(outcome)
    }

    /// Pool candidates: library files with captions, not in `exclude`
    ///
    /// Without random selection the least-posted video wins, then the one
    /// posted longest ago, then the first by name.
    fn pick_from_pool(&self, exclude: &[String]) -> Result<String, UploadError> {
        let files = self.library.list().unwrap_or_else(|e| {
            warn!(error = %e, "Could not list videos for the pool");
            Vec::new()
        });
        let catalog = self.tracker.catalog();
        let candidates: Vec<String> = files
            .into_iter()
            .filter(|id| !exclude.contains(id))
            .filter(|id| catalog.get_captions(id).is_ok_and(|c| !c.is_empty()))
            .collect();
        debug!(count = candidates.len(), "Orchestrator::pick_from_pool: candidates");

        let picked = if self.pool.random_selection {
            candidates.choose(&mut rand::rng()).cloned()
        } else {
            let records = self.tracker.records();
            candidates.into_iter().min_by_key(|id| {
                let record = records.get(id).cloned().unwrap_or_default();
                (record.upload_count, record.last_upload, id.clone())
            })
        };
        picked.ok_or_else(|| UploadError::PoolEmpty(self.library.dir().to_path_buf()))
    }

    /// Move a posted pool video out of the videos directory
    ///
    /// An existing file of the same name gets a `_YYYYmmdd_HHMMSS` suffix.
    /// Failures only warn; the upload is already recorded.
    fn move_to_uploaded(&self, video_id: &str) {
        debug!(%video_id, dir = %self.uploaded_dir.display(), "Orchestrator::move_to_uploaded: called");
        let Some(source) = self.library.resolve(video_id) else {
            return;
        };
        if let Err(e) = std::fs::create_dir_all(&self.uploaded_dir) {
            warn!(dir = %self.uploaded_dir.display(), error = %e, "Could not create uploaded directory");
            return;
        }
        let destination = uploaded_destination(&self.uploaded_dir, video_id);
        match std::fs::rename(&source, &destination) {
            Ok(()) => info!(%video_id, to = %destination.display(), "Moved posted video"),
            Err(e) => warn!(%video_id, error = %e, "Could not move posted video"),
        }
    }

    /// The attempt proper; the caller holds the store lock
    async fn attempt(&self, video_id: &str, platforms: &[Platform]) -> Result<UploadOutcome, UploadError> {
        let pick = self.tracker.peek_next_caption(video_id)?;
        info!(%video_id, caption_index = pick.index, caption_count = pick.count, "Starting upload");

        let Some(path) = self.library.resolve(video_id) else {
            warn!(%video_id, dir = %self.library.dir().display(), "Video file missing, skipping");
            return Err(UploadError::VideoNotFound(self.library.dir().join(video_id)));
        };
        let video_path = if self.dry_run { path } else { self.library.prepare(&path).await };

        let (caption, ai_caption) = match &self.captioner {
            Some(captioner) => {
                let description = self.tracker.catalog().description(video_id);
                match captioner.generate(video_id, description, &pick.caption).await {
                    Ok(caption) => (caption, true),
                    Err(e) => {
                        warn!(%video_id, error = %e, "AI caption failed, using rotated caption");
                        (pick.caption.clone(), false)
                    }
                }
            }
            None => (pick.caption.clone(), false),
        };

        let mut results = Vec::with_capacity(platforms.len());
        for &platform in platforms {
            let request = UploadRequest {
                platform,
                video_path: video_path.clone(),
                caption: caption.clone(),
            };
            let result = match self.uploaders.get(&platform) {
                Some(uploader) => uploader.upload(&request).await,
                None => {
                    DisabledUploader::new(format!("No uploader for {}", platform))
                        .upload(&request)
                        .await
                }
            };
            if result.succeeded {
                info!(%video_id, %platform, media_id = ?result.media_id, "Uploaded");
            } else {
                warn!(%video_id, %platform, error = ?result.error, "Upload failed");
            }
            results.push(result);
        }

        let mut outcome = UploadOutcome {
            video_id: video_id.to_string(),
            caption_index: pick.index,
            caption_count: pick.count,
            caption,
            ai_caption,
            results,
            recorded: None,
            dry_run: self.dry_run,
        };

        if self.dry_run {
            info!(%video_id, "Dry run, history unchanged");
            return Ok(outcome);
        }

        match self
            .tracker
            .commit_upload(video_id, pick.index, outcome.succeeded(), Utc::now())
        {
            Ok(CommitOutcome::Recorded(record)) => {
                outcome.recorded = Some(record);
                Ok(outcome)
            }
            Ok(CommitOutcome::Unchanged) => {
                info!(%video_id, caption_index = pick.index, "Not all platforms succeeded, caption will be retried");
                Ok(outcome)
            }
            Err(source) => {
                error!(%video_id, error = %source, "Failed to record upload");
                Err(UploadError::NotRecorded {
                    outcome: Box::new(outcome),
                    source,
                })
            }
        }
    }

    /// Upload each video in turn; one failure never stops the rest
    ///
    /// Pool entries never repeat a video already posted in the same slot.
    pub async fn run_slot(&self, videos: &[String], platforms: &[Platform]) -> SlotReport {
        debug!(video_count = videos.len(), "Orchestrator::run_slot: called");
        let mut report = SlotReport::default();
        let mut posted: Vec<String> = videos.iter().filter(|v| !is_pool_entry(v)).cloned().collect();
        for entry in videos {
            let result = if is_pool_entry(entry) {
                self.upload_from_pool(platforms, &posted).await
            } else {
                self.upload_video(entry, platforms).await
            };
            let video_id = match &result {
                Ok(outcome) => outcome.video_id.clone(),
                Err(UploadError::NotRecorded { outcome, .. }) => outcome.video_id.clone(),
                Err(_) => entry.clone(),
            };
            if let Err(e) = &result {
                warn!(%video_id, error = %e, "Upload attempt failed");
            }
            posted.push(video_id.clone());
            report.entries.push(SlotEntry { video_id, result });
        }
        info!(
            total = report.entries.len(),
            failed = report.failures().count(),
            "Slot finished"
        );
        report
    }
}

fn uploaded_destination(dir: &Path, video_id: &str) -> PathBuf {
    let destination = dir.join(video_id);
    if !destination.exists() {
        return destination;
    }
    let name = Path::new(video_id);
    let stem = name.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    match name.extension() {
        Some(ext) => dir.join(format!("{}_{}.{}", stem, stamp, ext.to_string_lossy())),
        None => dir.join(format!("{}_{}", stem, stamp)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptionConfig, VideoConfig};
    use crate::llm::CompletionResponse;
    use crate::llm::client::mock::MockLlmClient;
    use crate::prompts::PromptLoader;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use uploadstore::{HistoryBackend, JsonFileBackend, MemoryBackend, VideoCatalog};

    /// Records every request; fails for the platforms it is told to
    #[derive(Default)]
    struct RecordingUploader {
        fail: bool,
        requests: Mutex<Vec<UploadRequest>>,
    }

    impl RecordingUploader {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn captions(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|r| r.caption.clone()).collect()
        }
    }

    #[async_trait]
    impl Uploader for RecordingUploader {
        async fn upload(&self, request: &UploadRequest) -> UploadResult {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                UploadResult::failure(request.platform, "rejected")
            } else {
                UploadResult::success(request.platform, Some("id-1".to_string()))
            }
        }
    }

    struct Fixture {
        dir: TempDir,
        backend: Arc<MemoryBackend>,
        tracker: Arc<UploadHistoryTracker>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("Clair De Lune.MP4"), b"video").unwrap();
            std::fs::write(dir.path().join("river.mov"), b"video").unwrap();

            let catalog = Arc::new(
                VideoCatalog::default()
                    .with_video("Clair De Lune.MP4", ["A", "B", "C"])
                    .with_video("river.mov", ["R1", "R2"])
                    .with_video("ghost.mp4", ["G"]),
            );
            let backend = Arc::new(MemoryBackend::new());
            let tracker = Arc::new(UploadHistoryTracker::open(catalog, backend.clone()));
            Self { dir, backend, tracker }
        }

        fn orchestrator(&self) -> Orchestrator {
            Orchestrator::new(
                self.tracker.clone(),
                VideoLibrary::new(self.dir.path(), VideoConfig::default()),
            )
        }
    }

    #[tokio::test]
    async fn test_success_advances_rotation() {
        let fx = Fixture::new();
        let ig = Arc::new(RecordingUploader::default());
        let orch = fx.orchestrator().with_uploader(Platform::Instagram, ig.clone());

        for _ in 0..4 {
            let outcome = orch.upload_video("Clair De Lune.MP4", &[Platform::Instagram]).await.unwrap();
            assert!(outcome.succeeded());
            assert!(outcome.recorded.is_some());
        }

        assert_eq!(ig.captions(), vec!["A", "B", "C", "A"]);
        let record = fx.tracker.record("Clair De Lune.MP4").unwrap();
        assert_eq!(record.last_caption_index, 0);
        assert_eq!(record.upload_count, 4);
        assert_eq!(fx.backend.save_count(), 4);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_caption() {
        let fx = Fixture::new();
        let ig = Arc::new(RecordingUploader::default());
        let yt = Arc::new(RecordingUploader::failing());
        let orch = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, ig.clone())
            .with_uploader(Platform::Youtube, yt);

        let outcome = orch
            .upload_video("river.mov", &[Platform::Instagram, Platform::Youtube])
            .await
            .unwrap();

        assert!(!outcome.succeeded());
        assert!(outcome.recorded.is_none());
        assert_eq!(fx.backend.save_count(), 0);
        assert_eq!(fx.tracker.peek_next_caption("river.mov").unwrap().caption, "R1");
    }

    #[tokio::test]
    async fn test_missing_uploader_fails_platform() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();

        let outcome = orch.upload_video("river.mov", &[Platform::Tiktok]).await.unwrap();
        assert!(!outcome.succeeded());
        assert!(outcome.results[0].error.as_deref().unwrap().contains("No uploader"));
    }

    #[tokio::test]
    async fn test_missing_file_is_error_and_keeps_rotation() {
        let fx = Fixture::new();
        let orch = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, Arc::new(RecordingUploader::default()));

        let err = orch.upload_video("ghost.mp4", &[Platform::Instagram]).await.unwrap_err();
        assert!(matches!(err, UploadError::VideoNotFound(_)));
        assert!(!err.is_persistence_failure());
        assert_eq!(fx.backend.save_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_video_and_no_platforms() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();

        let err = orch.upload_video("nope.mp4", &[Platform::Instagram]).await.unwrap_err();
        assert!(matches!(err, UploadError::History(HistoryError::UnknownVideo(_))));

        let err = orch.upload_video("river.mov", &[]).await.unwrap_err();
        assert!(matches!(err, UploadError::NoPlatforms));
    }

    #[tokio::test]
    async fn test_persistence_failure_is_distinct() {
        let fx = Fixture::new();
        fx.backend.set_fail_saves(true);
        let orch = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, Arc::new(RecordingUploader::default()));

        let err = orch.upload_video("river.mov", &[Platform::Instagram]).await.unwrap_err();
        assert!(err.is_persistence_failure());
        match err {
            UploadError::NotRecorded { outcome, .. } => {
                assert!(outcome.succeeded());
                assert_eq!(outcome.caption, "R1");
            }
            other => panic!("unexpected error: {other}"),
        }

        // In-memory rotation stays advanced
        assert_eq!(fx.tracker.peek_next_caption("river.mov").unwrap().caption, "R2");
    }

    #[tokio::test]
    async fn test_dry_run_never_commits() {
        let fx = Fixture::new();
        let orch = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, Arc::new(RecordingUploader::default()))
            .dry_run(true);

        let outcome = orch.upload_video("river.mov", &[Platform::Instagram]).await.unwrap();
        assert!(outcome.dry_run);
        assert!(outcome.recorded.is_none());
        assert_eq!(fx.backend.save_count(), 0);
        assert!(fx.tracker.record("river.mov").unwrap().is_unseen());
    }

    #[tokio::test]
    async fn test_ai_caption_and_fallback() {
        let fx = Fixture::new();
        let ig = Arc::new(RecordingUploader::default());
        let llm = Arc::new(MockLlmClient::new(vec![CompletionResponse::text("Fresh words")]));
        let captioner = CaptionGenerator::new(llm, PromptLoader::embedded_only(), CaptionConfig::default(), 500);
        let orch = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, ig.clone())
            .with_captioner(captioner);

        let first = orch.upload_video("river.mov", &[Platform::Instagram]).await.unwrap();
        assert!(first.ai_caption);
        assert_eq!(first.caption, "Fresh words");
        assert_eq!(first.caption_index, 0);

        // Mock is exhausted: falls back to the rotated caption
        let second = orch.upload_video("river.mov", &[Platform::Instagram]).await.unwrap();
        assert!(!second.ai_caption);
        assert_eq!(second.caption, "R2");
        assert_eq!(fx.tracker.record("river.mov").unwrap().upload_count, 2);
    }

    #[tokio::test]
    async fn test_run_slot_continues_after_error() {
        let fx = Fixture::new();
        let orch = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, Arc::new(RecordingUploader::default()));

        let videos = vec!["ghost.mp4".to_string(), "river.mov".to_string()];
        let report = orch.run_slot(&videos, &[Platform::Instagram]).await;

        assert_eq!(report.entries.len(), 2);
        assert!(!report.all_succeeded());
        assert_eq!(report.failures().map(|e| e.video_id.as_str()).collect::<Vec<_>>(), vec!["ghost.mp4"]);
        assert!(report.entries[1].succeeded());
        assert!(!report.has_persistence_failure());
    }

    #[tokio::test]
    async fn test_store_lock_reloads_from_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("river.mov"), b"video").unwrap();
        let history = dir.path().join("state/upload_history.json");
        let catalog = Arc::new(VideoCatalog::default().with_video("river.mov", ["R1", "R2"]));

        let make = || {
            let tracker = Arc::new(UploadHistoryTracker::open(
                catalog.clone(),
                Arc::new(JsonFileBackend::new(&history)),
            ));
            Orchestrator::new(tracker, VideoLibrary::new(dir.path(), VideoConfig::default()))
                .with_uploader(Platform::Instagram, Arc::new(RecordingUploader::default()))
                .with_store_lock(&history)
        };

        // Two independent orchestrators sharing one file, as two processes would
        let first = make();
        let second = make();

        let a = first.upload_video("river.mov", &[Platform::Instagram]).await.unwrap();
        let b = second.upload_video("river.mov", &[Platform::Instagram]).await.unwrap();

        assert_eq!(a.caption, "R1");
        assert_eq!(b.caption, "R2");
        assert_eq!(b.recorded.unwrap().upload_count, 2);
        assert!(StoreLock::path_for(&history).exists());
    }

    #[tokio::test]
    async fn test_unsaved_commit_survives_reload_under_lock() {
        let fx = Fixture::new();
        fx.backend.set_fail_saves(true);
        let ig = Arc::new(RecordingUploader::default());
        let orch = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, ig.clone())
            .with_store_lock(fx.dir.path().join("h.json"));

        for _ in 0..2 {
            let err = orch.upload_video("river.mov", &[Platform::Instagram]).await.unwrap_err();
            assert!(matches!(err, UploadError::NotRecorded { .. }));
        }
        assert_eq!(ig.captions(), vec!["R1", "R2"]);
        assert!(fx.backend.stored().is_none());

        // Saves work again: the backlog is flushed before the next pick
        fx.backend.set_fail_saves(false);
        let outcome = orch.upload_video("river.mov", &[Platform::Instagram]).await.unwrap();
        assert_eq!(outcome.caption, "R1");
        assert_eq!(fx.backend.stored().unwrap()["river.mov"].upload_count, 3);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_take_turns() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("river.mov"), b"video").unwrap();
        let history = dir.path().join("upload_history.json");
        let catalog = Arc::new(VideoCatalog::default().with_video("river.mov", ["R1", "R2"]));

        let make = || {
            let tracker = Arc::new(UploadHistoryTracker::open(
                catalog.clone(),
                Arc::new(JsonFileBackend::new(&history)),
            ));
            Orchestrator::new(tracker, VideoLibrary::new(dir.path(), VideoConfig::default()))
                .with_uploader(Platform::Instagram, Arc::new(RecordingUploader::default()))
                .with_store_lock(&history)
        };
        let first = make();
        let second = make();

        let (a, b) = tokio::join!(
            first.upload_video("river.mov", &[Platform::Instagram]),
            second.upload_video("river.mov", &[Platform::Instagram]),
        );
        let mut captions = vec![a.unwrap().caption, b.unwrap().caption];
        captions.sort();
        assert_eq!(captions, vec!["R1", "R2"]);

        // Same orchestrator from two tasks
        let shared = make();
        let (c, d) = tokio::join!(
            shared.upload_video("river.mov", &[Platform::Instagram]),
            shared.upload_video("river.mov", &[Platform::Instagram]),
        );
        assert_ne!(c.unwrap().caption, d.unwrap().caption);

        let stored = JsonFileBackend::new(&history).load().unwrap();
        assert_eq!(stored["river.mov"].upload_count, 4);
    }

    #[tokio::test]
    async fn test_pool_prefers_least_posted() {
        let fx = Fixture::new();
        std::fs::write(fx.dir.path().join("extra.mp4"), b"video").unwrap();
        let orch = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, Arc::new(RecordingUploader::default()));

        let mut picked = Vec::new();
        for _ in 0..3 {
            let outcome = orch.upload_from_pool(&[Platform::Instagram], &[]).await.unwrap();
            picked.push(outcome.video_id);
        }
        // extra.mp4 has no captions, ghost.mp4 has no file
        assert_eq!(picked, vec!["Clair De Lune.MP4", "river.mov", "Clair De Lune.MP4"]);
        assert_eq!(fx.tracker.record("Clair De Lune.MP4").unwrap().upload_count, 2);
    }

    #[tokio::test]
    async fn test_pool_random_respects_exclude() {
        let fx = Fixture::new();
        let orch = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, Arc::new(RecordingUploader::default()))
            .with_pool(
                PoolConfig {
                    random_selection: true,
                    mark_uploaded: false,
                },
                fx.dir.path().join("uploaded"),
            );

        for _ in 0..5 {
            let outcome = orch
                .upload_from_pool(&[Platform::Instagram], &["river.mov".to_string()])
                .await
                .unwrap();
            assert_eq!(outcome.video_id, "Clair De Lune.MP4");
        }

        let err = orch
            .upload_from_pool(
                &[Platform::Instagram],
                &["river.mov".to_string(), "Clair De Lune.MP4".to_string()],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::PoolEmpty(_)));
    }

    #[tokio::test]
    async fn test_run_slot_pool_entries_do_not_repeat() {
        let fx = Fixture::new();
        let orch = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, Arc::new(RecordingUploader::default()));

        let videos: Vec<String> = ["river.mov", "pool", "pool"].iter().map(|v| v.to_string()).collect();
        let report = orch.run_slot(&videos, &[Platform::Instagram]).await;

        let ids: Vec<&str> = report.entries.iter().map(|e| e.video_id.as_str()).collect();
        assert_eq!(ids, vec!["river.mov", "Clair De Lune.MP4", "pool"]);
        assert!(report.entries[1].succeeded());
        assert!(matches!(report.entries[2].result, Err(UploadError::PoolEmpty(_))));
    }

    #[tokio::test]
    async fn test_pool_marks_uploaded() {
        let fx = Fixture::new();
        let uploaded = fx.dir.path().join("uploaded");
        std::fs::create_dir_all(&uploaded).unwrap();
        std::fs::write(uploaded.join("Clair De Lune.MP4"), b"older").unwrap();
        let pool = PoolConfig {
            random_selection: false,
            mark_uploaded: true,
        };

        let dry = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, Arc::new(RecordingUploader::default()))
            .with_pool(pool.clone(), &uploaded)
            .dry_run(true);
        dry.upload_from_pool(&[Platform::Instagram], &[]).await.unwrap();
        assert!(fx.dir.path().join("Clair De Lune.MP4").exists());

        let orch = fx
            .orchestrator()
            .with_uploader(Platform::Instagram, Arc::new(RecordingUploader::default()))
            .with_pool(pool, &uploaded);
        let outcome = orch.upload_from_pool(&[Platform::Instagram], &[]).await.unwrap();
        assert_eq!(outcome.video_id, "Clair De Lune.MP4");
        assert!(outcome.recorded.is_some());

        assert!(!fx.dir.path().join("Clair De Lune.MP4").exists());
        let mut names: Vec<String> = std::fs::read_dir(&uploaded)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], "Clair De Lune.MP4");
        assert!(names[1].starts_with("Clair De Lune_") && names[1].ends_with(".MP4"));

        // Moved out of the library, so the pool moves on
        let next = orch.upload_from_pool(&[Platform::Instagram], &[]).await.unwrap();
        assert_eq!(next.video_id, "river.mov");
    }
}
