//! Agent Runner (C10): system prompt assembly plus the bounded tool-loop
//! state machine that drives one conversational turn end to end.

pub mod context;
pub mod prompt;
pub mod runner;

pub use context::{IncomingMessage, LiveTextSink, NoopSink, RunResult, ToolCallRecord};
pub use prompt::{PromptBuilder, SessionInfo};
pub use runner::AgentRunner;
