use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use gateway_core::types::ChatRequest;

use crate::provider::{ChatResponse, LlmProvider, ProviderError};

pub struct OpenAiProvider {
    client: reqwest::Client,
    provider_name: String,
    base_url: String,
    chat_path: String,
    api_key: String,
    extra_headers: HashMap<String, String>,
}

impl OpenAiProvider {
    pub fn new(
        provider_name: String,
        base_url: String,
        chat_path: String,
        api_key: String,
        extra_headers: HashMap<String, String>,
    ) -> Self {
        Self { client: reqwest::Client::new(), provider_name, base_url, chat_path, api_key, extra_headers }
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.chat_path)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn chat(&self, request: &ChatRequest, model: &str) -> Result<ChatResponse, ProviderError> {
        let max_tokens = request.max_tokens.filter(|&v| v > 0).unwrap_or(4096);
        let messages = build_messages(request);
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": request.effective_temperature(),
        });

        let url = self.endpoint();
        debug!(provider = %self.provider_name, model, "sending request to OpenAI-compatible provider");

        let mut builder = self.client.post(&url).bearer_auth(&self.api_key).json(&body);
        for (key, value) in &self.extra_headers {
            builder = builder.header(key, value);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            let sanitized = gateway_core::sanitize::scrub(&text);
            warn!(provider = %self.provider_name, status, body = %sanitized, "provider API error");
            return Err(ProviderError::Api { status, body: sanitized });
        }

        let api_resp: ApiResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        parse_response(api_resp)
    }
}

fn build_messages(request: &ChatRequest) -> Vec<Value> {
    let mut out = Vec::with_capacity(request.messages.len() + 1);
    if !request.system_prompt.is_empty() {
        out.push(serde_json::json!({"role": "system", "content": request.system_prompt}));
    }
    for m in &request.messages {
        if m.role == gateway_core::types::Role::System {
            continue;
        }
        out.push(serde_json::json!({"role": m.role, "content": m.content}));
    }
    out
}

/// Per the content-marshalling rule (§4.6): when the assistant message carries
/// a non-empty `tool_calls` array, the Parser needs the *whole* message
/// re-serialized as JSON rather than just the plain `content` string, so a
/// single Parser implementation recovers both wire families' shapes.
fn parse_response(resp: ApiResponse) -> Result<ChatResponse, ProviderError> {
    let choice = resp.choices.into_iter().next().ok_or_else(|| ProviderError::Parse("no choices in response".to_string()))?;
    let message = choice.message;

    let content = if message.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty()) {
        serde_json::to_string(&message).map_err(|e| ProviderError::Parse(e.to_string()))?
    } else {
        message.content.unwrap_or_default()
    };

    Ok(ChatResponse {
        content,
        model: resp.model,
        usage: gateway_core::types::TokenUsage {
            input: resp.usage.as_ref().map(|u| u.prompt_tokens as u64).unwrap_or(0),
            output: resp.usage.as_ref().map(|u| u.completion_tokens as u64).unwrap_or(0),
            cache_read: 0,
            cache_write: 0,
        },
        stop_reason: choice.finish_reason,
    })
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, serde::Serialize)]
struct AssistantMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tool_calls: Option<Vec<Value>>, content: Option<&str>) -> ApiResponse {
        ApiResponse {
            model: "gpt-4o".to_string(),
            choices: vec![Choice {
                message: AssistantMessage { role: "assistant".to_string(), content: content.map(str::to_string), tool_calls },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(Usage { prompt_tokens: 12, completion_tokens: 3 }),
        }
    }

    #[test]
    fn plain_content_passes_through_without_tool_calls() {
        let resp = parse_response(sample(None, Some("hello there"))).unwrap();
        assert_eq!(resp.content, "hello there");
    }

    #[test]
    fn tool_calls_trigger_full_message_reserialization() {
        let calls = vec![serde_json::json!({"id": "1", "type": "function", "function": {"name": "shell", "arguments": "{}"}})];
        let resp = parse_response(sample(Some(calls), None)).unwrap();
        let value: Value = serde_json::from_str(&resp.content).unwrap();
        assert_eq!(value["tool_calls"][0]["function"]["name"], "shell");
    }

    #[test]
    fn empty_tool_calls_array_is_treated_as_plain_content() {
        let resp = parse_response(sample(Some(vec![]), Some("no calls here"))).unwrap();
        assert_eq!(resp.content, "no calls here");
    }

    #[test]
    fn usage_maps_prompt_and_completion_tokens() {
        let resp = parse_response(sample(None, Some("x"))).unwrap();
        assert_eq!(resp.usage.input, 12);
        assert_eq!(resp.usage.output, 3);
    }

    #[test]
    fn endpoint_joins_base_and_chat_path() {
        let provider = OpenAiProvider::new(
            "groq".to_string(),
            "https://api.groq.com/openai/".to_string(),
            "/v1/chat/completions".to_string(),
            "key".to_string(),
            HashMap::new(),
        );
        assert_eq!(provider.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
    }
}
