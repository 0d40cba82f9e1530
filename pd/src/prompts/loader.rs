//! Prompt Loader
//!
//! Loads prompt templates from the prompts directory or falls back to embedded
//! defaults.

use std::path::PathBuf;

use eyre::{Result, eyre};
use handlebars::{Handlebars, handlebars_helper};
use serde::Serialize;
use tracing::debug;

use super::embedded;
use crate::config::{CaptionConfig, CaptionStyle};

handlebars_helper!(join: |items: array| {
    items.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
});

/// Style block of the caption prompt
#[derive(Debug, Clone, Serialize)]
pub struct StyleContext {
    pub description: Option<String>,
    pub examples: Vec<String>,
    pub structure: Vec<String>,
    pub common_phrases: Vec<String>,
    pub avoid_phrases: Vec<String>,
    /// At most three templates are shown
    pub cta_templates: Vec<String>,
}

impl From<&CaptionStyle> for StyleContext {
    fn from(style: &CaptionStyle) -> Self {
        Self {
            description: style.description.clone(),
            examples: style
                .examples
                .iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            structure: style.structure.clone(),
            common_phrases: style.common_phrases.clone(),
            avoid_phrases: style.avoid_phrases.clone(),
            cta_templates: style.cta_templates.iter().take(3).cloned().collect(),
        }
    }
}

/// Context for rendering the caption template
#[derive(Debug, Clone, Serialize)]
pub struct CaptionPromptContext {
    pub video_name: String,
    pub description: Option<String>,
    /// The rotated caption, offered to the model as reference
    pub seed_caption: Option<String>,
    pub tone: String,
    pub max_length: usize,
    pub include_emojis: bool,
    pub call_to_action: bool,
    pub style: Option<StyleContext>,
}

impl CaptionPromptContext {
    pub fn new(video_name: &str, description: Option<&str>, seed_caption: Option<&str>, config: &CaptionConfig) -> Self {
        debug!(%video_name, has_description = description.is_some(), "CaptionPromptContext::new: called");
        Self {
            video_name: video_name.to_string(),
            description: description.map(str::to_string),
            seed_caption: seed_caption.map(str::to_string),
            tone: config.tone.clone(),
            max_length: config.max_length,
            include_emojis: config.include_emojis,
            call_to_action: config.call_to_action,
            style: config.style.as_ref().map(StyleContext::from),
        }
    }
}

/// Context for rendering the hashtag template
#[derive(Debug, Clone, Serialize)]
pub struct HashtagPromptContext {
    /// Number of tags to ask for
    pub count: usize,
    pub video_name: String,
    pub description: Option<String>,
    /// First 200 characters of the caption
    pub caption: Option<String>,
}

impl HashtagPromptContext {
    pub fn new(count: usize, video_name: &str, description: Option<&str>, caption: Option<&str>) -> Self {
        debug!(count, %video_name, "HashtagPromptContext::new: called");
        Self {
            count,
            video_name: video_name.to_string(),
            description: description.map(str::to_string),
            caption: caption.map(|c| c.chars().take(200).collect()),
        }
    }
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// User override directory (`prompts-dir` in config)
    user_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that prefers templates in `user_dir`
    pub fn new(user_dir: Option<PathBuf>) -> Self {
        debug!(?user_dir, "PromptLoader::new: called");
        let user_dir = user_dir.filter(|dir| {
            let exists = dir.is_dir();
            if !exists {
                debug!(?dir, "PromptLoader::new: prompts directory missing, using embedded prompts");
            }
            exists
        });

        let mut hbs = Handlebars::new();
        // Prompts are plain text, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        hbs.register_helper("join", Box::new(join));

        Self { hbs, user_dir }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self::new(None)
    }

    /// Load a template by name
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref user_dir) = self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read user prompt {}: {}", path.display(), e));
            }
            debug!(?path, "PromptLoader::load_template: not found in user override");
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: found in embedded");
            return Ok(content.to_string());
        }

        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }

    /// Render the caption prompt
    pub fn caption_prompt(&self, context: &CaptionPromptContext) -> Result<String> {
        self.render("caption", context)
    }

    /// Render the hashtag prompt
    pub fn hashtag_prompt(&self, context: &HashtagPromptContext) -> Result<String> {
        self.render("hashtags", context)
    }
}
