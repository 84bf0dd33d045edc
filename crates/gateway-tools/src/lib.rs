//! Tool Registry (C2) and the built-in tools it ships with: `shell`/`bash`
//! (§4.2-policy-gated command execution) and `memory_store`/`memory_recall`/
//! `memory_forget` (wired to the Memory Store, §4.5).

pub mod memory_tools;
pub mod shell_tool;
pub mod tool_trait;

pub use memory_tools::{MemoryForgetTool, MemoryRecallTool, MemoryStoreTool};
pub use shell_tool::ShellTool;
pub use tool_trait::{Tool, ToolRegistry, ToolResult};
