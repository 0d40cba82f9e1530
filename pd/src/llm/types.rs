//! Completion request and response

use serde::Serialize;

/// One stateless completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,

    /// Conversation after the system prompt; captions send a single user turn
    pub messages: Vec<Message>,

    /// Upper bound for the reply, further capped by `llm.max-tokens`
    pub max_tokens: u32,
}

/// A chat turn, serialized as-is into the request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Option<String>,

    /// The model hit the token limit before finishing
    pub truncated: bool,

    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// Finished reply with `content` and no usage, for mocks and tests
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            truncated: false,
            usage: TokenUsage::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}
