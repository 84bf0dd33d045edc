//! History Manager (C9): trimming plus LLM-based compaction of conversation
//! history.
//!
//! Grounded on the reference agent loop's `trim_history` (preserve the
//! leading system message, drain the oldest excess non-system messages) for
//! the FIFO half, and on `skynet-agent`'s `pipeline/compact.rs` for the
//! general shape of an auxiliary-model summarization pass — the trigger
//! threshold, batch size, and output format here are the spec's, not the
//! teacher's turn-count/per-fact-extraction scheme.

use crate::types::{ChatMessage, Role};

pub const MAX_HISTORY_MESSAGES: usize = 50;
const COMPACTION_KEEP_VERBATIM: usize = 20;
const TRANSCRIPT_MAX_CHARS: usize = 12_000;
const SUMMARY_MAX_CHARS: usize = 2_000;

const COMPACTION_SYSTEM_PROMPT: &str = "Summarize the following conversation transcript into a concise paragraph \
that preserves facts, decisions, and open threads a continuing assistant would need. \
Do not add commentary about the summarization itself.";

/// A model call used only to summarize the oldest slice of history. Kept as
/// a trait here (rather than depending on `gateway-providers` directly) so
/// `gateway-core` has no dependency on the provider layer; `gateway-agent`
/// supplies the real implementation backed by the Model Manager.
#[async_trait::async_trait]
pub trait CompactionModel: Send + Sync {
    async fn summarize(&self, system_prompt: &str, transcript: &str) -> Result<String, String>;
}

/// Truncate by Unicode code point count: first `max_chars - 1` chars plus an
/// ellipsis. Pass-through when already within budget.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{head}…")
}

/// Keep at most `MAX_HISTORY_MESSAGES` non-system messages, FIFO-evicting
/// the oldest. A leading system message, if present, is always kept intact
/// and does not count against the budget.
pub fn trim_history(history: &mut Vec<ChatMessage>) {
    let has_system = matches!(history.first(), Some(m) if m.role == Role::System);
    let start = if has_system { 1 } else { 0 };
    let non_system_count = history.len() - start;

    if non_system_count <= MAX_HISTORY_MESSAGES {
        return;
    }

    let to_remove = non_system_count - MAX_HISTORY_MESSAGES;
    history.drain(start..start + to_remove);
}

/// When non-system messages exceed `MAX_HISTORY_MESSAGES`, summarize the
/// oldest `n - COMPACTION_KEEP_VERBATIM` into one assistant message prefixed
/// `[Compaction summary]\n`, keeping the newest `COMPACTION_KEEP_VERBATIM`
/// verbatim. On summarization failure, the raw (truncated) transcript is
/// used as the summary instead of failing the turn.
pub async fn compact_if_needed(history: &mut Vec<ChatMessage>, model: &dyn CompactionModel) {
    let has_system = matches!(history.first(), Some(m) if m.role == Role::System);
    let start = if has_system { 1 } else { 0 };
    let non_system_count = history.len() - start;

    if non_system_count <= MAX_HISTORY_MESSAGES {
        return;
    }

    let compact_count = non_system_count - COMPACTION_KEEP_VERBATIM;
    let oldest: Vec<ChatMessage> = history[start..start + compact_count].to_vec();

    let transcript: String = oldest
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    let transcript = truncate_chars(&transcript, TRANSCRIPT_MAX_CHARS);

    let summary = match model.summarize(COMPACTION_SYSTEM_PROMPT, &transcript).await {
        Ok(s) => truncate_chars(&s, SUMMARY_MAX_CHARS),
        Err(_) => truncate_chars(&transcript, SUMMARY_MAX_CHARS),
    };

    let compacted = ChatMessage::assistant(format!("[Compaction summary]\n{summary}"));
    history.splice(start..start + compact_count, std::iter::once(compacted));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, content: &str) -> ChatMessage {
        ChatMessage { role, content: content.to_string() }
    }

    struct AlwaysOk;
    #[async_trait::async_trait]
    impl CompactionModel for AlwaysOk {
        async fn summarize(&self, _system: &str, _transcript: &str) -> Result<String, String> {
            Ok("summary text".to_string())
        }
    }

    struct AlwaysFail;
    #[async_trait::async_trait]
    impl CompactionModel for AlwaysFail {
        async fn summarize(&self, _system: &str, _transcript: &str) -> Result<String, String> {
            Err("model unavailable".to_string())
        }
    }

    #[test]
    fn trim_history_noop_when_within_limit() {
        let mut history: Vec<ChatMessage> =
            (0..10).map(|i| msg(Role::User, &format!("msg {i}"))).collect();
        let before = history.clone();
        trim_history(&mut history);
        assert_eq!(history.len(), before.len());
    }

    #[test]
    fn trim_history_preserves_system_prompt() {
        let mut history = vec![msg(Role::System, "system prompt")];
        history.extend((0..60).map(|i| msg(Role::User, &format!("msg {i}"))));
        trim_history(&mut history);
        assert_eq!(history.first().unwrap().role, Role::System);
        assert_eq!(history.len(), 1 + MAX_HISTORY_MESSAGES);
    }

    #[test]
    fn trim_history_drops_oldest_first() {
        let mut history: Vec<ChatMessage> =
            (0..60).map(|i| msg(Role::User, &format!("msg {i}"))).collect();
        trim_history(&mut history);
        assert_eq!(history.len(), MAX_HISTORY_MESSAGES);
        assert_eq!(history.first().unwrap().content, "msg 10");
        assert_eq!(history.last().unwrap().content, "msg 59");
    }

    #[tokio::test]
    async fn compact_replaces_oldest_with_single_summary_message() {
        let mut history: Vec<ChatMessage> =
            (0..60).map(|i| msg(Role::User, &format!("msg {i}"))).collect();
        compact_if_needed(&mut history, &AlwaysOk).await;
        assert_eq!(history.len(), 1 + COMPACTION_KEEP_VERBATIM);
        assert!(history[0].content.starts_with("[Compaction summary]\n"));
        assert!(history[0].content.contains("summary text"));
        assert_eq!(history.last().unwrap().content, "msg 59");
    }

    #[tokio::test]
    async fn compact_noop_within_limit() {
        let mut history: Vec<ChatMessage> =
            (0..10).map(|i| msg(Role::User, &format!("msg {i}"))).collect();
        let before = history.clone();
        compact_if_needed(&mut history, &AlwaysOk).await;
        assert_eq!(history.len(), before.len());
    }

    #[tokio::test]
    async fn compact_falls_back_to_raw_transcript_on_failure() {
        let mut history: Vec<ChatMessage> =
            (0..60).map(|i| msg(Role::User, &format!("msg {i}"))).collect();
        compact_if_needed(&mut history, &AlwaysFail).await;
        assert!(history[0].content.starts_with("[Compaction summary]\n"));
        assert!(history[0].content.contains("msg 0"));
    }

    #[test]
    fn truncate_chars_respects_code_point_budget() {
        let s = "a".repeat(20);
        let out = truncate_chars(&s, 10);
        assert_eq!(out.chars().count(), 10);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn truncate_chars_passthrough_when_within_budget() {
        let s = "short";
        assert_eq!(truncate_chars(s, 10), "short");
    }
}
