use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use gateway_core::types::ChatRequest;

use crate::provider::{ChatResponse, LlmProvider, ProviderError};

const API_VERSION: &str = "2023-06-01";
const OAUTH_TOKEN_PREFIX: &str = "sk-ant-oat01-";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    is_oauth: bool,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let is_oauth = api_key.starts_with(OAUTH_TOKEN_PREFIX);
        Self { client: reqwest::Client::new(), is_oauth, api_key, base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()) }
    }

    /// OAuth setup tokens (`sk-ant-oat01-…`) go as `Authorization: Bearer`;
    /// ordinary API keys go as `x-api-key`.
    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.is_oauth {
            builder.header("Authorization", format!("Bearer {}", self.api_key))
        } else {
            builder.header("x-api-key", &self.api_key)
        }
    }
}

/// The model-string grammar encodes extended thinking as a `:thinking:{budget}`
/// suffix (§4.6); the adapter strips it before sending the real model id and
/// translates the budget into the native `thinking` request field.
fn split_thinking_suffix(model: &str) -> (&str, Option<u32>) {
    if let Some(idx) = model.find(":thinking:") {
        let (base, rest) = model.split_at(idx);
        let budget = rest.trim_start_matches(":thinking:").parse::<u32>().ok();
        (base, budget)
    } else {
        (model, None)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat(&self, request: &ChatRequest, model: &str) -> Result<ChatResponse, ProviderError> {
        let (base_model, thinking_budget) = split_thinking_suffix(model);
        let thinking_budget = thinking_budget.or_else(|| request.thinking_level.map(|l| l.budget_tokens()));
        let body = build_request_body(request, base_model, thinking_budget);
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = base_model, "sending request to Anthropic");

        let builder = self
            .client
            .post(&url)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let resp = self.apply_auth(builder).send().await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Anthropic API error");
            return Err(ProviderError::Api { status, body: text });
        }

        let api_resp: ApiResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parse_response(api_resp))
    }
}

fn build_request_body(request: &ChatRequest, model: &str, thinking_budget: Option<u32>) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .filter(|m| m.role != gateway_core::types::Role::System)
        .map(|m| {
            serde_json::json!({
                "role": m.role,
                "content": [{"type": "text", "text": m.content}],
            })
        })
        .collect();

    let mut body = serde_json::json!({
        "model": model,
        "max_tokens": request.effective_max_tokens(),
        "system": request.system_prompt,
        "messages": messages,
        "temperature": request.effective_temperature(),
    });

    if let Some(budget) = thinking_budget {
        body["thinking"] = serde_json::json!({ "type": "enabled", "budget_tokens": budget });
    }

    body
}

/// `extract_text(blocks)`: the concatenation of `text` from every block of
/// type `"text"`. Thinking/tool_use/unknown blocks contribute nothing.
fn parse_response(resp: ApiResponse) -> ChatResponse {
    let content = resp.content.into_iter().filter_map(|b| match b {
        ContentBlock::Text { text } => Some(text),
        _ => None,
    }).collect::<Vec<_>>().join("");

    ChatResponse {
        content,
        model: resp.model,
        usage: gateway_core::types::TokenUsage {
            input: resp.usage.input_tokens as u64,
            output: resp.usage.output_tokens as u64,
            cache_read: resp.usage.cache_read_input_tokens.unwrap_or(0) as u64,
            cache_write: resp.usage.cache_creation_input_tokens.unwrap_or(0) as u64,
        },
        stop_reason: resp.stop_reason,
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    #[allow(dead_code)]
    Thinking { thinking: String },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
    cache_creation_input_tokens: Option<u32>,
    cache_read_input_tokens: Option<u32>,
}
