//! Provider Adapters (C6): the two wire families behind one trait. Neither
//! adapter sends native tool definitions over the wire — tool use is taught
//! entirely through the system prompt and recovered by the shared Parser
//! (§4.1) — so `chat` takes only the already-assembled request and model id.

use async_trait::async_trait;
use thiserror::Error;

use gateway_core::types::{ChatRequest, TokenUsage};

#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Text handed to the Parser. For Anthropic this is `extract_text` over
    /// the response's content blocks; for OpenAI it is the plain message
    /// content, or — per the content-marshalling rule — the re-serialized
    /// assistant message JSON when the response carried a `tool_calls` array.
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("api error: status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse provider response: {0}")]
    Parse(String),

    #[error("missing credentials for provider {0}")]
    MissingCredentials(String),

    #[error("canceled")]
    Canceled,
}

impl ProviderError {
    pub fn is_non_retryable(&self) -> bool {
        match self {
            ProviderError::Api { status, .. } => gateway_core::error::is_non_retryable_status(*status),
            ProviderError::Canceled => true,
            ProviderError::Transport(_) => false,
            other => scan_for_4xx(&other.to_string()),
        }
    }
}

fn scan_for_4xx(message: &str) -> bool {
    let bytes = message.as_bytes();
    for i in 0..bytes.len().saturating_sub(2) {
        if bytes[i].is_ascii_digit() && bytes[i + 1].is_ascii_digit() && bytes[i + 2].is_ascii_digit() {
            let before_ok = i == 0 || !bytes[i - 1].is_ascii_digit();
            let after_ok = i + 3 == bytes.len() || !bytes[i + 3].is_ascii_digit();
            if before_ok && after_ok {
                if let Ok(n) = message[i..i + 3].parse::<u16>() {
                    if gateway_core::error::is_non_retryable_status(n) {
                        return true;
                    }
                }
            }
        }
    }
    false
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, request: &ChatRequest, model: &str) -> Result<ChatResponse, ProviderError>;
}
