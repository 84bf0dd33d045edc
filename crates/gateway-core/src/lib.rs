//! Shared types, error taxonomy, tool-call parser, history manager, error
//! sanitizer, and the collaborator-facing config shapes for the gateway.
//!
//! This crate has no provider, memory, or tool dependencies — it is the
//! vocabulary the rest of the workspace shares.

pub mod config;
pub mod error;
pub mod history;
pub mod parser;
pub mod sanitize;
pub mod types;

pub use error::{GatewayError, Result};
pub use types::{
    candidates, ChatMessage, ChatRequest, ModelRoute, ParsedToolCall, Role, ThinkingLevel,
    TokenUsage, ToolSpec,
};
