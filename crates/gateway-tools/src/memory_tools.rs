//! `memory_store`/`memory_recall`/`memory_forget` built-ins (§4.3), wired
//! directly to an injected `Arc<dyn MemoryStore>` (§4.5).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use gateway_memory::{MemoryCategory, MemoryMeta, MemoryStore};

use crate::tool_trait::{Tool, ToolResult};

pub struct MemoryStoreTool {
    memory: Arc<dyn MemoryStore>,
}

impl MemoryStoreTool {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self { memory }
    }
}

#[derive(Deserialize)]
struct StoreArgs {
    key: String,
    content: String,
    #[serde(default)]
    category: Option<String>,
}

#[async_trait]
impl Tool for MemoryStoreTool {
    fn name(&self) -> &str {
        "memory_store"
    }

    fn description(&self) -> &str {
        "Save a durable memory entry under a key."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {"type": "string"},
                "content": {"type": "string"},
                "category": {"type": "string", "enum": ["core", "daily", "conversation"]},
            },
            "required": ["key", "content"],
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let args: StoreArgs = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        let category = match args.category.as_deref() {
            Some(c) => match c.parse::<MemoryCategory>() {
                Ok(c) => c,
                Err(_) => return ToolResult::error(format!("unknown category: {c}")),
            },
            None => MemoryCategory::default(),
        };

        match self.memory.store(&args.key, &args.content, category, MemoryMeta::default()).await {
            Ok(()) => ToolResult::success(format!("stored {}", args.key)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct MemoryRecallTool {
    memory: Arc<dyn MemoryStore>,
}

impl MemoryRecallTool {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self { memory }
    }
}

#[derive(Deserialize)]
struct RecallArgs {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for MemoryRecallTool {
    fn name(&self) -> &str {
        "memory_recall"
    }

    fn description(&self) -> &str {
        "Search durable memory by keyword/vector hybrid recall or exact key lookup."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "key": {"type": "string"},
                "limit": {"type": "integer"},
            },
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let args: RecallArgs = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        let query = args.query.unwrap_or_default();
        let limit = args.limit.unwrap_or(5);

        match self.memory.recall(&query, args.key.as_deref(), None, limit).await {
            Ok(entries) if entries.is_empty() => ToolResult::success("no matching memory entries"),
            Ok(entries) => {
                let rendered: Vec<String> = entries.iter().map(|e| format!("- {}: {}", e.key, e.content)).collect();
                ToolResult::success(rendered.join("\n"))
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct MemoryForgetTool {
    memory: Arc<dyn MemoryStore>,
}

impl MemoryForgetTool {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self { memory }
    }
}

#[derive(Deserialize)]
struct ForgetArgs {
    key: String,
}

#[async_trait]
impl Tool for MemoryForgetTool {
    fn name(&self) -> &str {
        "memory_forget"
    }

    fn description(&self) -> &str {
        "Remove a memory entry by key."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"key": {"type": "string"}},
            "required": ["key"],
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let args: ForgetArgs = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        match self.memory.forget(&args.key).await {
            Ok(true) => ToolResult::success(format!("forgot {}", args.key)),
            Ok(false) => ToolResult::success(format!("no entry found for {}", args.key)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use gateway_memory::SqliteMemoryStore;
    use gateway_embeddings::NoopEmbeddingClient;

    use super::*;

    async fn store() -> Arc<dyn MemoryStore> {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMemoryStore::open(dir.path(), Arc::new(NoopEmbeddingClient), 1000, 0.5, 0.5).unwrap();
        store.init().await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn store_then_recall_by_key() {
        let memory = store().await;
        let store_tool = MemoryStoreTool::new(memory.clone());
        let recall_tool = MemoryRecallTool::new(memory.clone());

        let res = store_tool.execute(serde_json::json!({"key": "fact1", "content": "loves dark roast coffee"})).await;
        assert!(!res.is_error);

        let res = recall_tool.execute(serde_json::json!({"key": "fact1"})).await;
        assert!(res.content.contains("dark roast"));
    }

    #[tokio::test]
    async fn forget_reports_whether_a_row_was_removed() {
        let memory = store().await;
        let store_tool = MemoryStoreTool::new(memory.clone());
        let forget_tool = MemoryForgetTool::new(memory.clone());

        store_tool.execute(serde_json::json!({"key": "fact1", "content": "x"})).await;
        let res = forget_tool.execute(serde_json::json!({"key": "fact1"})).await;
        assert_eq!(res.content, "forgot fact1");

        let res = forget_tool.execute(serde_json::json!({"key": "fact1"})).await;
        assert_eq!(res.content, "no entry found for fact1");
    }

    #[tokio::test]
    async fn recall_with_no_matches_reports_empty_result() {
        let memory = store().await;
        let recall_tool = MemoryRecallTool::new(memory);
        let res = recall_tool.execute(serde_json::json!({"query": "anything"})).await;
        assert_eq!(res.content, "no matching memory entries");
    }

    #[tokio::test]
    async fn invalid_category_is_rejected() {
        let memory = store().await;
        let store_tool = MemoryStoreTool::new(memory);
        let res = store_tool.execute(serde_json::json!({"key": "k", "content": "c", "category": "bogus"})).await;
        assert!(res.is_error);
    }
}
