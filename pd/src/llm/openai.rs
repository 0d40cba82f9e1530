//! OpenAI-compatible chat completions client
//!
//! Also serves Ollama, which exposes the same `/v1/chat/completions` endpoint
//! and ignores the bearer token.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Message, Role, TokenUsage};
use crate::config::LlmConfig;

/// Retries after the first attempt for transient errors
const MAX_RETRIES: u32 = 3;

/// First backoff delay, doubled on every retry
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Longest `Retry-After` honoured
const MAX_RETRY_AFTER_SECS: u64 = 60;

pub struct OpenAIClient {
    model: String,
    /// Empty for providers that need no key
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl OpenAIClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(provider = %config.provider, model = %config.model, "OpenAIClient::from_config: called");
        let api_key = config.get_api_key().map_err(|e| LlmError::Config(e.to_string()))?;
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let max_tokens = request.max_tokens.min(self.max_tokens);
        debug!(model = %self.model, max_tokens, "OpenAIClient::build_request_body: called");

        let system = Message {
            role: Role::System,
            content: request.system_prompt.clone(),
        };
        let messages: Vec<&Message> = std::iter::once(&system).chain(&request.messages).collect();

        // Reasoning models reject max_tokens
        let token_field = if ["gpt-5", "o1", "o3", "o4"].iter().any(|p| self.model.starts_with(p)) {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        body[token_field] = max_tokens.into();
        body
    }

    /// One HTTP round trip, no retries
    async fn send_once(&self, url: &str, body: &serde_json::Value) -> Result<CompletionResponse, LlmError> {
        let mut builder = self.http.post(url).json(body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| LlmError::Decode(e.to_string()))?;
        Ok(parsed.into())
    }
}

/// Delay requested by a 429, falling back to the initial backoff
fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
        .unwrap_or(Duration::from_millis(INITIAL_BACKOFF_MS))
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %self.model, "OpenAIClient::complete: called");
        let url = self.endpoint();
        let body = self.build_request_body(&request);

        let mut attempt = 0;
        loop {
            match self.send_once(&url, &body).await {
                Ok(response) => {
                    debug!(attempt, truncated = response.truncated, "OpenAIClient::complete: success");
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    let delay = match &e {
                        LlmError::RateLimited { retry_after } => backoff(attempt).max(*retry_after),
                        _ => backoff(attempt),
                    };
                    attempt += 1;
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Caption request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "OpenAIClient::complete: giving up");
                    return Err(e);
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl From<ChatResponse> for CompletionResponse {
    fn from(response: ChatResponse) -> Self {
        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        match response.choices.into_iter().next() {
            Some(choice) => Self {
                content: choice.message.content,
                truncated: choice.finish_reason.as_deref() == Some("length"),
                usage,
            },
            None => Self {
                content: None,
                truncated: false,
                usage,
            },
        }
    }
}
