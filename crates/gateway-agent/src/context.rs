//! External interface shapes (§6): the request/response pair a channel
//! adapter exchanges with the Agent Runner, plus the live text side-channel
//! hook for interstitial assistant text.

use gateway_core::types::TokenUsage;

/// What a channel adapter hands the Runner for one turn.
///
/// `history` carries the adapter's own record of the conversation so far —
/// the Runner holds no session state itself (§5). `images` is accepted for
/// forward compatibility with multimodal channels but is not otherwise
/// interpreted by this crate.
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub session_key: String,
    pub channel: String,
    pub sender: String,
    pub message_id: Option<String>,
    pub text: String,
    pub images: Option<Vec<serde_json::Value>>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
    pub history: Option<Vec<gateway_core::types::ChatMessage>>,
}

/// One resolved tool invocation, reported back for observability.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: String,
    pub output: String,
}

/// What the Runner hands back to the adapter at the end of one turn.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub reply: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub token_usage: TokenUsage,
}

/// Outbound side-channel for interstitial assistant text that arrives
/// alongside tool calls (§4.10 tool case). Adapters implement this to
/// render typing/streaming; the default is silent.
pub trait LiveTextSink: Send + Sync {
    fn print(&self, text: &str);
}

/// A sink that drops everything — the right default when a caller has no
/// live channel to render into.
pub struct NoopSink;

impl LiveTextSink for NoopSink {
    fn print(&self, _text: &str) {}
}
