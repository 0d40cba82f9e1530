//! AI caption generation
//!
//! Produces a fresh caption for a video from the LLM, seeded with the caption
//! the rotation picked. The seed's hashtags are carried over verbatim so the
//! post keeps its tags even though the model is told not to write any.
//! With `caption.hashtags.enabled` a second call asks for fresh hashtags,
//! which are added after the seed's.

use std::sync::Arc;

use eyre::{Result, eyre};
use tracing::{debug, info, warn};

use crate::config::CaptionConfig;
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::prompts::{CaptionPromptContext, HashtagPromptContext, PromptLoader};

const SYSTEM_PROMPT: &str = "You are a social media expert who creates engaging captions.";

const HASHTAG_SYSTEM_PROMPT: &str = "You are a social media hashtag expert.";

const HASHTAG_MAX_TOKENS: u32 = 300;

/// Used when the hashtag call fails
const FALLBACK_HASHTAGS: [&str; 4] = ["video", "content", "viral", "trending"];

/// Generates captions through an [`LlmClient`]
pub struct CaptionGenerator {
    llm: Arc<dyn LlmClient>,
    prompts: PromptLoader,
    config: CaptionConfig,
    max_tokens: u32,
}

impl CaptionGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: PromptLoader, config: CaptionConfig, max_tokens: u32) -> Self {
        debug!(tone = %config.tone, max_length = config.max_length, "CaptionGenerator::new: called");
        Self {
            llm,
            prompts,
            config,
            max_tokens,
        }
    }

    /// Generate a caption for `video_id`
    ///
    /// Errors when the prompt cannot be rendered, the LLM call fails or the
    /// model returns nothing.
    pub async fn generate(&self, video_id: &str, description: Option<&str>, seed_caption: &str) -> Result<String> {
        debug!(%video_id, "CaptionGenerator::generate: called");
        let context = CaptionPromptContext::new(video_id, description, Some(seed_caption), &self.config);
        let prompt = self.prompts.caption_prompt(&context)?;

        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(prompt)],
            max_tokens: self.max_tokens,
        };

        let response = self.llm.complete(request).await?;
        if response.truncated {
            warn!(%video_id, max_tokens = self.max_tokens, "Caption reply hit the token limit");
        }
        let text = response
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| eyre!("LLM returned an empty caption for {}", video_id))?;

        let mut hashtags = extract_hashtags(seed_caption);
        if self.config.hashtags.enabled {
            for tag in self.generate_hashtags(video_id, description, &text).await {
                let tag = format!("#{}", tag);
                if !hashtags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
                    hashtags.push(tag);
                }
            }
        }

        let caption = finalize_caption(&text, self.config.max_length, &hashtags);
        info!(%video_id, chars = caption.chars().count(), "Generated AI caption");
        Ok(caption)
    }

    /// Hashtags for `video_id`, without the `#`
    ///
    /// Asks the model for `max-count` minus the custom tags, then appends the
    /// custom tags. Never fails: an LLM error yields a generic list.
    pub async fn generate_hashtags(&self, video_id: &str, description: Option<&str>, caption: &str) -> Vec<String> {
        debug!(%video_id, "CaptionGenerator::generate_hashtags: called");
        let config = &self.config.hashtags;
        let count = config.max_count.saturating_sub(config.custom_tags.len());

        let generated = if count == 0 {
            debug!("CaptionGenerator::generate_hashtags: custom tags fill max-count");
            Vec::new()
        } else {
            match self.request_hashtags(count, video_id, description, caption).await {
                Ok(tags) => tags.into_iter().take(count).collect(),
                Err(e) => {
                    warn!(%video_id, error = %e, "Hashtag generation failed, using defaults");
                    FALLBACK_HASHTAGS.iter().map(|t| t.to_string()).collect()
                }
            }
        };

        let mut tags: Vec<String> = Vec::new();
        for tag in generated.into_iter().chain(config.custom_tags.iter().cloned()) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        // Custom tags are kept over generated ones
        while tags.len() > config.max_count {
            let drop = tags
                .iter()
                .rposition(|t| !config.custom_tags.contains(t))
                .unwrap_or(tags.len() - 1);
            tags.remove(drop);
        }
        debug!(count = tags.len(), "CaptionGenerator::generate_hashtags: done");
        tags
    }

    async fn request_hashtags(
        &self,
        count: usize,
        video_id: &str,
        description: Option<&str>,
        caption: &str,
    ) -> Result<Vec<String>> {
        let context = HashtagPromptContext::new(count, video_id, description, Some(caption));
        let prompt = self.prompts.hashtag_prompt(&context)?;

        let request = CompletionRequest {
            system_prompt: HASHTAG_SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(prompt)],
            max_tokens: HASHTAG_MAX_TOKENS.min(self.max_tokens),
        };
        let content = self
            .llm
            .complete(request)
            .await?
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| eyre!("LLM returned no hashtags for {}", video_id))?;
        Ok(parse_hashtags(&content))
    }
}

/// One tag per line; `#` and `-` are stripped, tags under three characters dropped
pub fn parse_hashtags(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.replace(['#', '-'], "").trim().to_string())
        .filter(|tag| tag.chars().count() > 2)
        .collect()
}

/// Hashtags in `text`, in order of first appearance
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let tag = word.trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | ':'));
        if tag.len() > 1 && tag.starts_with('#') && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Trim, cap the body at `max_length` characters and append `hashtags`
///
/// A body over the limit is cut so that it ends in `...` and is exactly
/// `max_length` characters long. Hashtags already present are not repeated.
pub fn finalize_caption(text: &str, max_length: usize, hashtags: &[String]) -> String {
    let text = text.trim();
    let mut body = if text.chars().count() > max_length {
        debug!(max_length, "finalize_caption: truncating");
        let mut cut: String = text.chars().take(max_length.saturating_sub(3)).collect();
        cut.push_str("...");
        cut
    } else {
        text.to_string()
    };

    let missing: Vec<&str> = hashtags
        .iter()
        .map(String::as_str)
        .filter(|tag| !body.split_whitespace().any(|w| w == *tag))
        .collect();
    if !missing.is_empty() {
        body.push_str("\n\n");
        body.push_str(&missing.join(" "));
    }
    body
}
