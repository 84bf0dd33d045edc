//! Tool Registry (C2): a name-indexed catalog of callable tools plus
//! dispatch. Grounded on the teacher's `Tool` async_trait + `ToolResult`
//! shape and `registry.rs`'s static-table-plus-lookup pattern, generalized
//! to a concurrent `name -> Box<dyn Tool>` map via `dashmap`.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use gateway_core::types::ToolSpec;

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text content returned to the LLM.
    pub content: String,
    /// Whether the tool execution failed.
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: true }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> ToolResult;
}

/// Name-indexed catalog of callable tools (§4.3). Registration is expected at
/// startup; lookup/dispatch happens concurrently from the Agent Runner's
/// tool-loop iterations, hence `DashMap` rather than a plain `HashMap`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: DashMap::new() }
    }

    pub fn register(&self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Decodes `args_bytes` as JSON (empty bytes are treated as `{}`), looks
    /// up the handler by name, and invokes it. Callers must check `has()`
    /// first if an unregistered name should surface as `Unknown tool: X`
    /// rather than this returning an error result.
    pub async fn execute_json(&self, name: &str, args_bytes: &[u8]) -> ToolResult {
        let value: Value = if args_bytes.is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_slice(args_bytes) {
                Ok(v) => v,
                Err(e) => return ToolResult::error(format!("invalid tool arguments: {e}")),
            }
        };

        match self.tools.get(name) {
            Some(tool) => tool.execute(value).await,
            None => ToolResult::error(format!("no such tool: {name}")),
        }
    }

    /// All registered tools' specs, alphabetically by name — stable ordering
    /// is observable because specs are rendered into the system prompt.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .iter()
            .map(|entry| ToolSpec {
                name: entry.name().to_string(),
                human_description: entry.description().to_string(),
                parameters_schema: entry.input_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, input: Value) -> ToolResult {
            ToolResult::success(input.to_string())
        }
    }

    #[tokio::test]
    async fn has_reports_registration_state() {
        let registry = ToolRegistry::new();
        assert!(!registry.has("echo"));
        registry.register(Box::new(EchoTool));
        assert!(registry.has("echo"));
    }

    #[tokio::test]
    async fn execute_json_defaults_empty_bytes_to_empty_object() {
        let registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let result = registry.execute_json("echo", b"").await;
        assert!(!result.is_error);
        assert_eq!(result.content, "{}");
    }

    #[tokio::test]
    async fn execute_json_reports_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.execute_json("missing", b"{}").await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn execute_json_reports_invalid_arguments() {
        let registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let result = registry.execute_json("echo", b"not json").await;
        assert!(result.is_error);
    }

    #[test]
    fn specs_are_sorted_alphabetically() {
        struct ZTool;
        #[async_trait]
        impl Tool for ZTool {
            fn name(&self) -> &str {
                "zzz"
            }
            fn description(&self) -> &str {
                "last"
            }
            fn input_schema(&self) -> Value {
                serde_json::json!({})
            }
            async fn execute(&self, _input: Value) -> ToolResult {
                ToolResult::success("")
            }
        }
        let registry = ToolRegistry::new();
        registry.register(Box::new(ZTool));
        registry.register(Box::new(EchoTool));
        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["echo".to_string(), "zzz".to_string()]);
    }
}
