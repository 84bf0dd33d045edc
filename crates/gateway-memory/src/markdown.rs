//! Append-only markdown fallback (§4.5.2), used when the primary SQLite
//! backend is unavailable or disabled. No database, no embeddings — just
//! `MEMORY.md` for `core` entries, daily `memory/YYYY-MM-DD.md` files for
//! `daily` entries, and `memory/conversations/YYYY-MM-DD.md` files for
//! `conversation` entries, appended as Markdown bullets.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::MemoryError;
use crate::store::MemoryStore;
use crate::types::{MemoryCategory, MemoryEntry, MemoryMeta};

pub struct MarkdownMemoryStore {
    workspace: PathBuf,
    lock: Mutex<()>,
}

impl MarkdownMemoryStore {
    pub fn new(workspace: &Path) -> Self {
        Self { workspace: workspace.to_path_buf(), lock: Mutex::new(()) }
    }

    fn core_path(&self) -> PathBuf {
        self.workspace.join("MEMORY.md")
    }

    fn daily_path(&self, date: &str) -> PathBuf {
        self.workspace.join("memory").join(format!("{date}.md"))
    }

    fn conversation_path(&self, date: &str) -> PathBuf {
        self.workspace.join("memory").join("conversations").join(format!("{date}.md"))
    }

    fn path_for(&self, category: MemoryCategory) -> PathBuf {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        match category {
            MemoryCategory::Core => self.core_path(),
            MemoryCategory::Daily => self.daily_path(&today),
            MemoryCategory::Conversation => self.conversation_path(&today),
        }
    }

    fn files_in(dir: &Path) -> Result<Vec<PathBuf>, MemoryError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().map(|ext| ext == "md").unwrap_or(false))
            .collect();
        files.sort();
        Ok(files)
    }

    fn read_entries(&self, path: &Path, category: MemoryCategory) -> Result<Vec<MemoryEntry>, MemoryError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(text.lines().filter_map(|line| parse_bullet(line, category)).collect())
    }
}

/// `- **key**: content`
fn parse_bullet(line: &str, category: MemoryCategory) -> Option<MemoryEntry> {
    let rest = line.trim().strip_prefix("- **")?;
    let (key, rest) = rest.split_once("**:")?;
    let now = Utc::now().to_rfc3339();
    Some(MemoryEntry {
        key: key.trim().to_string(),
        content: rest.trim().to_string(),
        category,
        embedding: None,
        created_at: now.clone(),
        updated_at: now,
        session_key: None,
        channel: None,
        sender: None,
        message_id: None,
        score: 0.0,
    })
}

#[async_trait]
impl MemoryStore for MarkdownMemoryStore {
    async fn init(&self) -> Result<(), MemoryError> {
        std::fs::create_dir_all(self.workspace.join("memory"))?;
        Ok(())
    }

    async fn store(
        &self,
        key: &str,
        content: &str,
        category: MemoryCategory,
        _meta: MemoryMeta,
    ) -> Result<(), MemoryError> {
        let _guard = self.lock.lock().unwrap();
        let path = self.path_for(category);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bullet = format!("- **{key}**: {content}\n");
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(bullet.as_bytes())?;
        Ok(())
    }

    /// The markdown fallback never removes lines it already appended.
    async fn forget(&self, _key: &str) -> Result<bool, MemoryError> {
        Ok(false)
    }

    async fn get(&self, key: &str) -> Result<Option<MemoryEntry>, MemoryError> {
        let all = self.list(None).await?;
        Ok(all.into_iter().find(|e| e.key == key))
    }

    async fn list(&self, category: Option<MemoryCategory>) -> Result<Vec<MemoryEntry>, MemoryError> {
        let _guard = self.lock.lock().unwrap();
        let mut entries = Vec::new();
        if category.is_none() || category == Some(MemoryCategory::Core) {
            entries.extend(self.read_entries(&self.core_path(), MemoryCategory::Core)?);
        }
        if category.is_none() || category == Some(MemoryCategory::Daily) {
            for file in Self::files_in(&self.workspace.join("memory"))? {
                entries.extend(self.read_entries(&file, MemoryCategory::Daily)?);
            }
        }
        if category.is_none() || category == Some(MemoryCategory::Conversation) {
            for file in Self::files_in(&self.workspace.join("memory").join("conversations"))? {
                entries.extend(self.read_entries(&file, MemoryCategory::Conversation)?);
            }
        }
        Ok(entries)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.list(None).await?.len())
    }

    /// Scores by `matched_tokens / total_tokens` of a substring match over
    /// each entry's content against the whitespace-split query tokens.
    async fn recall(
        &self,
        query: &str,
        key: Option<&str>,
        _session_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = key.filter(|k| !k.is_empty());
        let query = query.trim();
        if query.is_empty() && key.is_none() {
            return Ok(Vec::new());
        }

        let entries = self.list(None).await?;
        if let Some(key) = key {
            return Ok(entries
                .into_iter()
                .filter(|e| e.key == key)
                .map(|mut e| {
                    e.score = 1.0;
                    e
                })
                .take(limit)
                .collect());
        }

        let tokens: Vec<&str> = query.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<MemoryEntry> = entries
            .into_iter()
            .filter_map(|mut entry| {
                let lower = entry.content.to_lowercase();
                let matched = tokens.iter().filter(|t| lower.contains(&t.to_lowercase())).count();
                if matched == 0 {
                    return None;
                }
                entry.score = matched as f64 / tokens.len() as f64;
                Some(entry)
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    fn location(&self) -> String {
        self.workspace.display().to_string()
    }

    async fn health_check(&self) -> Result<(), MemoryError> {
        std::fs::create_dir_all(&self.workspace)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_appends_bullet_to_memory_md() {
        let dir = tempfile::tempdir().unwrap();
        let store = MarkdownMemoryStore::new(dir.path());
        store.init().await.unwrap();
        store.store("k1", "likes tea", MemoryCategory::Core, MemoryMeta::default()).await.unwrap();
        let text = std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap();
        assert_eq!(text, "- **k1**: likes tea\n");
    }

    #[tokio::test]
    async fn forget_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = MarkdownMemoryStore::new(dir.path());
        store.init().await.unwrap();
        store.store("k1", "v", MemoryCategory::Core, MemoryMeta::default()).await.unwrap();
        assert!(!store.forget("k1").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn conversation_entries_are_listable_under_their_own_category() {
        let dir = tempfile::tempdir().unwrap();
        let store = MarkdownMemoryStore::new(dir.path());
        store.init().await.unwrap();
        store.store("c1", "turn one", MemoryCategory::Conversation, MemoryMeta::default()).await.unwrap();
        store.store("d1", "a daily note", MemoryCategory::Daily, MemoryMeta::default()).await.unwrap();

        let conversations = store.list(Some(MemoryCategory::Conversation)).await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].key, "c1");
        assert_eq!(conversations[0].category, MemoryCategory::Conversation);

        let daily = store.list(Some(MemoryCategory::Daily)).await.unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].key, "d1");
        assert_eq!(daily[0].category, MemoryCategory::Daily);
    }

    #[tokio::test]
    async fn recall_scores_by_matched_over_total_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = MarkdownMemoryStore::new(dir.path());
        store.init().await.unwrap();
        store.store("k1", "loves dark roast coffee", MemoryCategory::Core, MemoryMeta::default()).await.unwrap();
        let results = store.recall("dark roast espresso", None, None, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - (2.0 / 3.0)).abs() < 1e-9);
    }
}
