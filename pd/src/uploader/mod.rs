//! Platform uploaders
//!
//! Every platform is reached through the [`Uploader`] trait. The real work is
//! done by an external command per platform (a vendor SDK script), so this
//! module only builds the request, runs it and reports the outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

mod command;
mod simple;

pub use command::CommandUploader;
pub use simple::{DisabledUploader, DryRunUploader};

use crate::config::PlatformConfig;

/// Supported social-media platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Tiktok,
    Youtube,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Instagram, Platform::Tiktok, Platform::Youtube];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::Tiktok => "tiktok",
            Self::Youtube => "youtube",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "instagram" | "ig" => Ok(Self::Instagram),
            "tiktok" => Ok(Self::Tiktok),
            "youtube" | "yt" => Ok(Self::Youtube),
            other => Err(format!(
                "Unknown platform: '{}'. Supported: instagram, tiktok, youtube",
                other
            )),
        }
    }
}

/// One upload of one video to one platform
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub platform: Platform,
    pub video_path: PathBuf,
    pub caption: String,
}

/// Outcome of an [`UploadRequest`]
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub platform: Platform,
    pub succeeded: bool,
    pub error: Option<String>,
    /// Identifier reported by the platform, when available
    pub media_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl UploadResult {
    pub fn success(platform: Platform, media_id: Option<String>) -> Self {
        Self {
            platform,
            succeeded: true,
            error: None,
            media_id,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(platform: Platform, error: impl Into<String>) -> Self {
        Self {
            platform,
            succeeded: false,
            error: Some(error.into()),
            media_id: None,
            timestamp: Utc::now(),
        }
    }
}

/// Posts a video with a caption to a platform
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Attempt the upload; failures are reported in the result, never panics
    async fn upload(&self, request: &UploadRequest) -> UploadResult;
}

/// Create the uploader for a platform from its config
pub fn create_uploader(platform: Platform, config: &PlatformConfig, dry_run: bool) -> Arc<dyn Uploader> {
    debug!(%platform, enabled = config.enabled, dry_run, "create_uploader: called");
    if dry_run {
        debug!("create_uploader: dry run");
        return Arc::new(DryRunUploader);
    }
    if !config.enabled {
        debug!("create_uploader: platform disabled");
        return Arc::new(DisabledUploader::new(format!("{} is disabled in config", platform)));
    }
    if config.command.is_empty() {
        debug!("create_uploader: no command configured");
        return Arc::new(DisabledUploader::new(format!(
            "No upload command configured for {}",
            platform
        )));
    }
    Arc::new(CommandUploader::new(
        config.command.clone(),
        Duration::from_millis(config.timeout_ms),
    ))
}
