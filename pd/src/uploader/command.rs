//! Upload by running an external command

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{UploadRequest, UploadResult, Uploader};
use crate::exec;

/// Runs a configured argv per upload
///
/// `{video}`, `{caption}` and `{platform}` are substituted into each argument.
/// Exit code 0 means success; the first non-empty stdout line, if any, is
/// taken as the platform's media id.
pub struct CommandUploader {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandUploader {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        debug!(?argv, ?timeout, "CommandUploader::new: called");
        Self { argv, timeout }
    }
}

#[async_trait]
impl Uploader for CommandUploader {
    async fn upload(&self, request: &UploadRequest) -> UploadResult {
        debug!(platform = %request.platform, video = %request.video_path.display(), "CommandUploader::upload: called");
        let video = request.video_path.to_string_lossy();
        let argv = exec::substitute(
            &self.argv,
            &[
                ("video", video.as_ref()),
                ("caption", request.caption.as_str()),
                ("platform", request.platform.as_str()),
            ],
        );

        match exec::run(&argv, self.timeout).await {
            Ok(stdout) => {
                let media_id = stdout
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(str::to_string);
                info!(platform = %request.platform, ?media_id, "Upload command succeeded");
                UploadResult::success(request.platform, media_id)
            }
            Err(e) => {
                warn!(platform = %request.platform, error = %e, "Upload command failed");
                UploadResult::failure(request.platform, e.to_string())
            }
        }
    }
}
