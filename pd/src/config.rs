//! PostDaemon configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uploadstore::VideoCatalog;

use crate::uploader::Platform;

/// Main PostDaemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// File and directory locations
    pub paths: PathsConfig,

    /// Weekly posting schedule
    pub schedule: ScheduleConfig,

    /// Per-platform upload settings
    pub platforms: PlatformsConfig,

    /// Caption selection and generation
    pub caption: CaptionConfig,

    /// LLM provider for generated captions
    pub llm: LlmConfig,

    /// Video preparation
    pub video: VideoConfig,

    /// Videos and their rotating captions
    pub catalog: VideoCatalog,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Schedule times and weekday names must parse, and generated captions need
    /// an API key unless the provider is a local Ollama server.
    pub fn validate(&self) -> Result<()> {
        debug!("Config::validate: called");
        crate::schedule::WeeklySchedule::from_config(&self.schedule)?;

        if self.caption.mode == CaptionMode::Ai {
            self.llm.get_api_key()?;
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: postdaemon.yml
        let local_config = PathBuf::from("postdaemon.yml");
        if local_config.exists() {
            return Self::load_from_file(&local_config)
                .context(format!("Failed to load config from {}", local_config.display()));
        }

        // Try user config: ~/.config/postdaemon/postdaemon.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("postdaemon").join("postdaemon.yml");
            if user_config.exists() {
                return Self::load_from_file(&user_config)
                    .context(format!("Failed to load config from {}", user_config.display()));
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Any failure here is ignored; the full load reports it later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let value = Self::load_raw(config_path)?;
        value.get("log-level")?.as_str().map(str::to_string)
    }

    /// Read only `paths.log-dir`, before logging is initialized
    pub fn load_log_dir(config_path: Option<&PathBuf>) -> Option<PathBuf> {
        let value = Self::load_raw(config_path)?;
        value.get("paths")?.get("log-dir")?.as_str().map(PathBuf::from)
    }

    fn load_raw(config_path: Option<&PathBuf>) -> Option<serde_yaml::Value> {
        let candidates = match config_path {
            Some(p) => vec![p.clone()],
            None => {
                let mut paths = vec![PathBuf::from("postdaemon.yml")];
                if let Some(dir) = dirs::config_dir() {
                    paths.push(dir.join("postdaemon").join("postdaemon.yml"));
                }
                paths
            }
        };

        let path = candidates.into_iter().find(|p| p.exists())?;
        let content = fs::read_to_string(path).ok()?;
        serde_yaml::from_str(&content).ok()
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// File and directory locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the video files named in the catalog
    #[serde(rename = "videos-dir")]
    pub videos_dir: PathBuf,

    /// Upload history document
    #[serde(rename = "history-file")]
    pub history_file: PathBuf,

    /// Directory for pd.log
    #[serde(rename = "log-dir")]
    pub log_dir: PathBuf,

    /// Optional directory of prompt template overrides
    #[serde(rename = "prompts-dir", skip_serializing_if = "Option::is_none")]
    pub prompts_dir: Option<PathBuf>,

    /// Pool videos are moved here after posting when `schedule.pool.mark-uploaded` is on
    #[serde(rename = "uploaded-dir")]
    pub uploaded_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            videos_dir: PathBuf::from("videos"),
            history_file: PathBuf::from(uploadstore::DEFAULT_HISTORY_FILE),
            log_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("postdaemon")
                .join("logs"),
            prompts_dir: None,
            uploaded_dir: PathBuf::from("uploaded"),
        }
    }
}

/// Weekly posting schedule
///
/// The i-th video of a day is posted at the i-th time; videos beyond the last
/// time share the last time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Posting times of day, `HH:MM` (24-hour)
    pub times: Vec<String>,

    /// Platforms every scheduled video is posted to
    pub platforms: Vec<Platform>,

    /// Weekday name -> ordered video ids
    pub days: BTreeMap<String, DayPlan>,

    /// How `pool` entries pick their video
    pub pool: PoolConfig,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            times: vec!["18:00".to_string()],
            platforms: vec![Platform::Instagram],
            days: BTreeMap::new(),
            pool: PoolConfig::default(),
        }
    }
}

/// Videos of one weekday
///
/// Either a list (`[a.mp4, pool]`) or a single entry. A single `pool` means
/// one pool pick at every upload time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DayPlan {
    Videos(Vec<String>),
    One(String),
}

impl From<Vec<String>> for DayPlan {
    fn from(videos: Vec<String>) -> Self {
        Self::Videos(videos)
    }
}

/// Selection from the videos directory for `pool` entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pick at random instead of least-posted first
    #[serde(rename = "random-selection")]
    pub random_selection: bool,

    /// Move a pool video to `paths.uploaded-dir` once every platform took it
    #[serde(rename = "mark-uploaded")]
    pub mark_uploaded: bool,
}

/// Per-platform upload settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    pub instagram: PlatformConfig,
    pub tiktok: PlatformConfig,
    pub youtube: PlatformConfig,
}

impl PlatformsConfig {
    pub fn get(&self, platform: Platform) -> &PlatformConfig {
        match platform {
            Platform::Instagram => &self.instagram,
            Platform::Tiktok => &self.tiktok,
            Platform::Youtube => &self.youtube,
        }
    }
}

/// Upload settings for one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Whether uploads to this platform are attempted
    pub enabled: bool,

    /// Upload command argv; `{video}`, `{caption}` and `{platform}` are substituted
    pub command: Vec<String>,

    /// Upload command timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: Vec::new(),
            timeout_ms: 600_000,
        }
    }
}

/// Where captions come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionMode {
    /// Next caption from the catalog rotation
    #[default]
    Rotate,
    /// Generated by the LLM, with the rotated caption as reference
    Ai,
}

/// Caption selection and generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub mode: CaptionMode,

    /// Tone requested from the LLM (casual, professional, funny, inspirational)
    pub tone: String,

    /// Maximum generated caption length in characters
    #[serde(rename = "max-length")]
    pub max_length: usize,

    #[serde(rename = "include-emojis")]
    pub include_emojis: bool,

    #[serde(rename = "call-to-action")]
    pub call_to_action: bool,

    /// Optional writing-style guidance for generated captions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<CaptionStyle>,

    pub hashtags: HashtagConfig,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            mode: CaptionMode::Rotate,
            tone: "casual".to_string(),
            max_length: 2200,
            include_emojis: true,
            call_to_action: true,
            style: None,
            hashtags: HashtagConfig::default(),
        }
    }
}

/// Generated hashtags, appended after the caption in AI mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashtagConfig {
    pub enabled: bool,

    /// Total tags per post, custom tags included
    #[serde(rename = "max-count")]
    pub max_count: usize,

    /// Always added, without the `#`
    #[serde(rename = "custom-tags")]
    pub custom_tags: Vec<String>,
}

impl Default for HashtagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_count: 10,
            custom_tags: Vec::new(),
        }
    }
}

/// Writing-style guidance for generated captions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    pub description: Option<String>,
    pub examples: Vec<String>,
    pub structure: Vec<String>,
    #[serde(rename = "common-phrases")]
    pub common_phrases: Vec<String>,
    #[serde(rename = "avoid-phrases")]
    pub avoid_phrases: Vec<String>,
    #[serde(rename = "cta-templates")]
    pub cta_templates: Vec<String>,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("openai" or "ollama")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 500,
            timeout_ms: 60_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    ///
    /// A local Ollama server needs no key, so a missing variable is an empty key there.
    pub fn get_api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) => Ok(key),
            Err(_) if self.provider == "ollama" => Ok(String::new()),
            Err(_) => Err(eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.api_key_env
            )),
        }
    }
}

/// Video preparation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Videos above this size are compressed when `auto-compress` is on
    #[serde(rename = "max-size-mb")]
    pub max_size_mb: f64,

    #[serde(rename = "auto-compress")]
    pub auto_compress: bool,

    /// Compression command argv; `{input}` and `{output}` are substituted
    #[serde(rename = "compress-command")]
    pub compress_command: Vec<String>,

    /// Compression command timeout in milliseconds
    #[serde(rename = "compress-timeout-ms")]
    pub compress_timeout_ms: u64,

    /// Accepted file extensions, lowercase without the dot
    pub extensions: Vec<String>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 100.0,
            auto_compress: false,
            compress_command: Vec::new(),
            compress_timeout_ms: 1_800_000,
            extensions: ["mp4", "mov", "avi", "mkv"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.paths.videos_dir, PathBuf::from("videos"));
        assert_eq!(config.paths.history_file, PathBuf::from("upload_history.json"));
        assert_eq!(config.schedule.times, vec!["18:00"]);
        assert_eq!(config.schedule.platforms, vec![Platform::Instagram]);
        assert_eq!(config.caption.mode, CaptionMode::Rotate);
        assert!(!config.platforms.instagram.enabled);
        assert!(config.catalog.is_empty());
    }

    #[test]
    fn test_llm_config_defaults() {
        let config = LlmConfig::default();

        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.base_url, "https://api.openai.com");
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug
paths:
  videos-dir: /srv/videos
  history-file: /srv/state/upload_history.json
schedule:
  times: ["09:00", "18:00"]
  platforms: [instagram, tiktok]
  days:
    monday: ["Addio.MOV", "Organ 1.mov"]
    friday: pool
    sunday: "Organ 1.mov"
  pool:
    random-selection: true
platforms:
  instagram:
    enabled: true
    command: ["ig-upload", "--reel", "{video}", "{caption}"]
caption:
  mode: ai
  tone: funny
  max-length: 300
  style:
    examples: ["POV: it's 2am"]
    avoid-phrases: ["link in bio"]
  hashtags:
    enabled: true
    max-count: 6
    custom-tags: [organ]
llm:
  provider: ollama
  model: llama3
  base-url: http://localhost:11434
catalog:
  "Addio.MOV":
    captions: ["A", "B"]
  "Organ 1.mov":
    captions: ["Church organ vibes"]
    description: "Pipe organ improvisation"
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.paths.videos_dir, PathBuf::from("/srv/videos"));
        assert_eq!(config.schedule.platforms, vec![Platform::Instagram, Platform::Tiktok]);
        assert_eq!(
            config.schedule.days["monday"],
            DayPlan::Videos(vec!["Addio.MOV".to_string(), "Organ 1.mov".to_string()])
        );
        assert_eq!(config.schedule.days["friday"], DayPlan::One("pool".to_string()));
        assert_eq!(config.schedule.days["sunday"], DayPlan::One("Organ 1.mov".to_string()));
        assert!(config.schedule.pool.random_selection);
        assert!(!config.schedule.pool.mark_uploaded);
        assert!(config.caption.hashtags.enabled);
        assert_eq!(config.caption.hashtags.max_count, 6);
        assert_eq!(config.caption.hashtags.custom_tags, vec!["organ"]);
        assert!(config.platforms.get(Platform::Instagram).enabled);
        assert!(!config.platforms.get(Platform::Youtube).enabled);
        assert_eq!(config.platforms.instagram.timeout_ms, 600_000);
        assert_eq!(config.caption.mode, CaptionMode::Ai);
        assert_eq!(config.caption.max_length, 300);
        let style = config.caption.style.as_ref().unwrap();
        assert_eq!(style.avoid_phrases, vec!["link in bio"]);
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.catalog.len(), 2);
        assert_eq!(config.catalog.description("Organ 1.mov"), Some("Pipe organ improvisation"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
caption:
  tone: professional
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.caption.tone, "professional");
        assert_eq!(config.caption.max_length, 2200);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.video.extensions, vec!["mp4", "mov", "avi", "mkv"]);
        assert_eq!(config.paths.uploaded_dir, PathBuf::from("uploaded"));
        assert!(!config.caption.hashtags.enabled);
        assert_eq!(config.caption.hashtags.max_count, 10);
        assert_eq!(config.schedule.pool, PoolConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_time() {
        let mut config = Config::default();
        config.schedule.times = vec!["6pm".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_weekday() {
        let mut config = Config::default();
        config.schedule.days.insert("someday".to_string(), vec!["a.mov".to_string()].into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            api_key_env: "PD_TEST_UNSET_OLLAMA_KEY".to_string(),
            ..Default::default()
        };
        assert_eq!(config.get_api_key().unwrap(), "");

        let config = LlmConfig {
            api_key_env: "PD_TEST_UNSET_OPENAI_KEY".to_string(),
            ..Default::default()
        };
        assert!(config.get_api_key().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pd.yml");
        fs::write(
            &path,
            "log-level: WARN\npaths:\n  log-dir: /tmp/pd-logs\ncaption:\n  tone: funny\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.caption.tone, "funny");
        assert_eq!(config.paths.log_dir, PathBuf::from("/tmp/pd-logs"));
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("WARN"));
        assert_eq!(Config::load_log_dir(Some(&path)), Some(PathBuf::from("/tmp/pd-logs")));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.yml");
        assert!(Config::load(Some(&path)).is_err());
        assert!(Config::load_log_level(Some(&path)).is_none());
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = serde_yaml::from_str(include_str!("../postdaemon.example.yml")).unwrap();
        config.validate().unwrap();

        assert_eq!(config.catalog.len(), 2);
        assert_eq!(config.catalog.get_captions("Clair De Lune.MP4").unwrap().len(), 3);
        assert!(config.platforms.instagram.enabled);
        assert!(!config.platforms.tiktok.enabled);
        assert_eq!(config.platforms.tiktok.timeout_ms, 600_000);
        assert_eq!(config.video.max_size_mb, 100.0);
        assert_eq!(config.schedule.days["sunday"], DayPlan::One("pool".to_string()));
        assert!(!config.schedule.pool.mark_uploaded);
        assert_eq!(config.paths.uploaded_dir, PathBuf::from("uploaded"));
        assert_eq!(config.caption.hashtags.custom_tags, vec!["piano"]);
    }
}
