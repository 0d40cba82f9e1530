//! Uploaders that never touch a platform

use async_trait::async_trait;
use tracing::{debug, info};

use super::{UploadRequest, UploadResult, Uploader};

/// Always fails with a fixed reason (platform disabled or not set up)
pub struct DisabledUploader {
    reason: String,
}

impl DisabledUploader {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl Uploader for DisabledUploader {
    async fn upload(&self, request: &UploadRequest) -> UploadResult {
        debug!(platform = %request.platform, reason = %self.reason, "DisabledUploader::upload: called");
        UploadResult::failure(request.platform, self.reason.clone())
    }
}

/// Logs what would be posted and reports success
pub struct DryRunUploader;

#[async_trait]
impl Uploader for DryRunUploader {
    async fn upload(&self, request: &UploadRequest) -> UploadResult {
        info!(
            platform = %request.platform,
            video = %request.video_path.display(),
            caption_len = request.caption.chars().count(),
            "Dry run: skipping upload"
        );
        UploadResult::success(request.platform, None)
    }
}
