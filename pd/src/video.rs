//! Video files on disk

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::VideoConfig;
use crate::exec;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Size and format of a video file
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub size_mb: f64,
    /// Lowercase extension without the dot, empty when there is none
    pub extension: String,
}

/// The directory of videos named by the catalog
pub struct VideoLibrary {
    dir: PathBuf,
    config: VideoConfig,
}

impl VideoLibrary {
    pub fn new(dir: impl Into<PathBuf>, config: VideoConfig) -> Self {
        let dir = dir.into();
        debug!(?dir, "VideoLibrary::new: called");
        Self { dir, config }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `video_id` if it names an existing file directly inside the library
    pub fn resolve(&self, video_id: &str) -> Option<PathBuf> {
        debug!(%video_id, "VideoLibrary::resolve: called");
        if video_id.is_empty() || video_id.contains(['/', '\\']) || video_id == "." || video_id == ".." {
            debug!(%video_id, "VideoLibrary::resolve: not a plain file name");
            return None;
        }
        let path = self.dir.join(video_id);
        if path.is_file() {
            Some(path)
        } else {
            debug!(?path, "VideoLibrary::resolve: no such file");
            None
        }
    }

    /// Size and extension of the file at `path`
    pub fn info(&self, path: &Path) -> Result<VideoInfo> {
        debug!(?path, "VideoLibrary::info: called");
        let meta = std::fs::metadata(path).context(format!("Failed to stat video {}", path.display()))?;
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Ok(VideoInfo {
            path: path.to_path_buf(),
            size_mb: meta.len() as f64 / BYTES_PER_MB,
            extension,
        })
    }

    /// Whether the file extension is in the configured list (case-insensitive)
    pub fn is_supported(&self, path: &Path) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        let ext = ext.to_string_lossy().to_lowercase();
        self.config.extensions.iter().any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }

    /// Supported video files in the library, sorted by name
    pub fn list(&self) -> Result<Vec<String>> {
        debug!(dir = ?self.dir, "VideoLibrary::list: called");
        let entries = std::fs::read_dir(&self.dir).context(format!("Failed to read {}", self.dir.display()))?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && self.is_supported(p))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }

    /// True when auto-compress is on, a command is set and the file is too large
    pub fn should_compress(&self, info: &VideoInfo) -> bool {
        self.config.auto_compress && !self.config.compress_command.is_empty() && info.size_mb > self.config.max_size_mb
    }

    /// Path to upload for `path`, compressing first when needed
    ///
    /// Compression writes `<name>_compressed<ext>` next to the original. Any
    /// failure falls back to the original file.
    pub async fn prepare(&self, path: &Path) -> PathBuf {
        debug!(?path, "VideoLibrary::prepare: called");
        let info = match self.info(path) {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Could not inspect video, uploading as is");
                return path.to_path_buf();
            }
        };
        if !self.should_compress(&info) {
            debug!(size_mb = info.size_mb, "VideoLibrary::prepare: no compression needed");
            return path.to_path_buf();
        }

        let output = compressed_path(path);
        info!(
            video = %path.display(),
            size_mb = format!("{:.2}", info.size_mb),
            limit_mb = self.config.max_size_mb,
            "Video exceeds size limit, compressing"
        );
        let input = path.to_string_lossy();
        let out = output.to_string_lossy();
        let argv = exec::substitute(
            &self.config.compress_command,
            &[("input", input.as_ref()), ("output", out.as_ref())],
        );

        match exec::run(&argv, Duration::from_millis(self.config.compress_timeout_ms)).await {
            Ok(_) if output.is_file() => {
                info!(output = %output.display(), "Compressed video ready");
                output
            }
            Ok(_) => {
                warn!(output = %output.display(), "Compression produced no file, using original");
                path.to_path_buf()
            }
            Err(e) => {
                warn!(error = %e, "Compression failed, using original");
                path.to_path_buf()
            }
        }
    }
}

/// `<dir>/<stem>_compressed<.ext>`
fn compressed_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_compressed.{}", stem, ext.to_string_lossy()),
        None => format!("{}_compressed", stem),
    };
    path.with_file_name(name)
}
