use async_trait::async_trait;

use crate::error::MemoryError;
use crate::types::{MemoryCategory, MemoryEntry, MemoryMeta};

/// Shared interface between the SQLite-backed hybrid store (§4.5.1) and the
/// append-only markdown fallback (§4.5.2).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn init(&self) -> Result<(), MemoryError>;

    async fn store(
        &self,
        key: &str,
        content: &str,
        category: MemoryCategory,
        meta: MemoryMeta,
    ) -> Result<(), MemoryError>;

    /// Returns whether a row was actually removed.
    async fn forget(&self, key: &str) -> Result<bool, MemoryError>;

    async fn get(&self, key: &str) -> Result<Option<MemoryEntry>, MemoryError>;

    async fn list(&self, category: Option<MemoryCategory>) -> Result<Vec<MemoryEntry>, MemoryError>;

    async fn count(&self) -> Result<usize, MemoryError>;

    async fn recall(
        &self,
        query: &str,
        key: Option<&str>,
        session_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// Human-readable location (file path) for diagnostics.
    fn location(&self) -> String;

    async fn health_check(&self) -> Result<(), MemoryError>;
}
