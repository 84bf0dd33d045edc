use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

/// Caller-chosen identifier grouping a linear conversation. The core treats
/// it as opaque — it never parses or derives meaning from the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single chat turn. Both roles are stringly typed at the wire; the
/// system role appears only as the first element of a compacted history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
}

/// Reasoning-token budget requested via Anthropic's "extended thinking",
/// encoded on the wire as a suffix on the model name (`:thinking:{budget}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Low,
    Medium,
    High,
    Max,
}

impl ThinkingLevel {
    pub fn budget_tokens(self) -> u32 {
        match self {
            ThinkingLevel::Low => 10_000,
            ThinkingLevel::Medium => 20_000,
            ThinkingLevel::High => 40_000,
            ThinkingLevel::Max => 100_000,
        }
    }
}

/// Logical chat request — adapter-agnostic, independent of the Anthropic or
/// OpenAI wire shapes that `gateway-providers` translates it into.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub thinking_level: Option<ThinkingLevel>,
}

impl ChatRequest {
    /// `temperature` defaults to 0.7 when zero or unset; `max_tokens`
    /// defaults to 4096 when unset and the adapter requires a value.
    pub fn effective_temperature(&self) -> f32 {
        match self.temperature {
            None => 0.7,
            Some(t) if t == 0.0 => 0.7,
            Some(t) => t,
        }
    }

    /// `0` means "let the adapter default" — the Runner sends it literally
    /// to ask for the provider's own default rather than omitting the field.
    pub fn effective_max_tokens(&self) -> u32 {
        match self.max_tokens {
            None | Some(0) => 4096,
            Some(n) => n,
        }
    }
}

/// A callable tool's shape, as embedded in the system prompt. Specs are
/// rendered alphabetically by name — stable ordering is observable.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub human_description: String,
    pub parameters_schema: serde_json::Value,
}

/// A tool invocation extracted from free-form model output. Arguments are
/// preserved verbatim as opaque JSON text — the core never reformats them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToolCall {
    pub name: String,
    pub arguments: String,
}

/// Token accounting, additive across every iteration of one tool-loop run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input += rhs.input;
        self.output += rhs.output;
        self.cache_read += rhs.cache_read;
        self.cache_write += rhs.cache_write;
    }
}

/// A named mapping `hint -> (provider, model, api_key?)`, matched when a
/// request's model string is literally `hint:<name>`.
#[derive(Debug, Clone)]
pub struct ModelRoute {
    pub hint: String,
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
}

/// Build the ordered candidate chain: primary first, then configured
/// fallbacks, deduplicated, with unknown fallback names dropped but the
/// (possibly unknown — it may resolve to a custom URL) primary always kept.
pub fn candidates(primary: &str, fallbacks: &[String], known: &dyn Fn(&str) -> bool) -> Vec<String> {
    let mut out = vec![primary.to_string()];
    for fb in fallbacks {
        if fb == primary {
            continue;
        }
        if !known(fb) {
            continue;
        }
        if !out.contains(fb) {
            out.push(fb.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_dedups_and_keeps_primary_first() {
        let known = |name: &str| matches!(name, "anthropic" | "openrouter");
        let fallbacks = vec!["anthropic".to_string(), "openrouter".to_string(), "bogus".to_string()];
        let out = candidates("openrouter", &fallbacks, &known);
        assert_eq!(out, vec!["openrouter".to_string(), "anthropic".to_string()]);
    }

    #[test]
    fn candidates_keeps_unknown_primary() {
        let known = |_: &str| false;
        let out = candidates("custom:https://host/model", &[], &known);
        assert_eq!(out, vec!["custom:https://host/model".to_string()]);
    }

    #[test]
    fn effective_temperature_substitutes_zero() {
        let req = ChatRequest { temperature: Some(0.0), ..Default::default() };
        assert_eq!(req.effective_temperature(), 0.7);
        let req = ChatRequest { temperature: Some(0.3), ..Default::default() };
        assert_eq!(req.effective_temperature(), 0.3);
        let req = ChatRequest::default();
        assert_eq!(req.effective_temperature(), 0.7);
    }

    #[test]
    fn effective_max_tokens_substitutes_zero_and_none() {
        assert_eq!(ChatRequest::default().effective_max_tokens(), 4096);
        let req = ChatRequest { max_tokens: Some(0), ..Default::default() };
        assert_eq!(req.effective_max_tokens(), 4096);
        let req = ChatRequest { max_tokens: Some(256), ..Default::default() };
        assert_eq!(req.effective_max_tokens(), 256);
    }

    #[test]
    fn thinking_budgets_match_spec_table() {
        assert_eq!(ThinkingLevel::Low.budget_tokens(), 10_000);
        assert_eq!(ThinkingLevel::Medium.budget_tokens(), 20_000);
        assert_eq!(ThinkingLevel::High.budget_tokens(), 40_000);
        assert_eq!(ThinkingLevel::Max.budget_tokens(), 100_000);
    }
}
