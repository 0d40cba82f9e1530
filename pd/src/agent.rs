//! Wires config into a ready-to-run orchestrator

use std::sync::Arc;

use eyre::{Context, Result};
use tracing::{debug, info};
use uploadstore::{JsonFileBackend, UploadHistoryTracker};

use crate::caption::CaptionGenerator;
use crate::config::{CaptionMode, Config};
use crate::llm::create_client;
use crate::orchestrator::Orchestrator;
use crate::prompts::PromptLoader;
use crate::schedule::WeeklySchedule;
use crate::uploader::{Platform, create_uploader};
use crate::video::VideoLibrary;

/// Open the upload history named by `paths.history-file`
pub fn open_tracker(config: &Config) -> Arc<UploadHistoryTracker> {
    debug!(history = %config.paths.history_file.display(), "open_tracker: called");
    let catalog = Arc::new(config.catalog.clone());
    let backend = Arc::new(JsonFileBackend::new(&config.paths.history_file));
    Arc::new(UploadHistoryTracker::open(catalog, backend))
}

pub fn open_library(config: &Config) -> VideoLibrary {
    VideoLibrary::new(&config.paths.videos_dir, config.video.clone())
}

/// Everything the `upload` and `schedule` commands need
pub struct Agent {
    pub orchestrator: Orchestrator,
    pub schedule: WeeklySchedule,
}

impl Agent {
    pub fn from_config(config: &Config, dry_run: bool) -> Result<Self> {
        debug!(dry_run, caption_mode = ?config.caption.mode, "Agent::from_config: called");
        let schedule = WeeklySchedule::from_config(&config.schedule).context("Invalid schedule")?;

        let mut orchestrator = Orchestrator::new(open_tracker(config), open_library(config))
            .with_store_lock(&config.paths.history_file)
            .with_pool(config.schedule.pool.clone(), &config.paths.uploaded_dir)
            .dry_run(dry_run);

        for platform in Platform::ALL {
            orchestrator =
                orchestrator.with_uploader(platform, create_uploader(platform, config.platforms.get(platform), dry_run));
        }

        if config.caption.mode == CaptionMode::Ai {
            let llm = create_client(&config.llm).context("Failed to create LLM client")?;
            let prompts = PromptLoader::new(config.paths.prompts_dir.clone());
            orchestrator = orchestrator.with_captioner(CaptionGenerator::new(
                llm,
                prompts,
                config.caption.clone(),
                config.llm.max_tokens,
            ));
            info!(provider = %config.llm.provider, model = %config.llm.model, "AI captions enabled");
        }

        Ok(Self { orchestrator, schedule })
    }
}
