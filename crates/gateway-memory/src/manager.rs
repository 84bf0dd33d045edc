use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use tracing::debug;

use gateway_embeddings::EmbeddingClient;

use crate::db;
use crate::error::MemoryError;
use crate::store::MemoryStore;
use crate::types::{MemoryCategory, MemoryEntry, MemoryMeta};

/// SQLite-backed hybrid store (§4.5.1): `memory_entries` + content-linked
/// `memory_entries_fts` for BM25 keyword search, `embedding_cache` for
/// deduplicated embedding calls, merged with an exact-cosine vector pass.
///
/// Every public operation is serialized behind one mutex — the DB connection
/// itself (`max_open_conns=1`) — matching the teacher's `Mutex<Connection>`
/// idiom in the original memory manager.
pub struct SqliteMemoryStore {
    db: Mutex<Connection>,
    path: PathBuf,
    embedder: Arc<dyn EmbeddingClient>,
    embedding_cache_size: usize,
    vector_weight: f64,
    keyword_weight: f64,
}

impl SqliteMemoryStore {
    pub fn open(
        workspace: &Path,
        embedder: Arc<dyn EmbeddingClient>,
        embedding_cache_size: usize,
        vector_weight: f32,
        keyword_weight: f32,
    ) -> Result<Self, MemoryError> {
        let dir = workspace.join("memory");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("brain.db");
        let conn = db::open(&path)?;
        Ok(Self {
            db: Mutex::new(conn),
            path,
            embedder,
            embedding_cache_size,
            vector_weight: vector_weight as f64,
            keyword_weight: keyword_weight as f64,
        })
    }

    async fn get_or_compute_embedding(&self, content: &str) -> Result<Vec<f32>, MemoryError> {
        if self.embedder.dimensions() == 0 {
            return Ok(Vec::new());
        }
        let trimmed = content.trim();
        let hash = content_hash(trimmed);

        let cached: Option<Vec<u8>> = {
            let db = self.db.lock().unwrap();
            db.query_row(
                "SELECT embedding FROM embedding_cache WHERE content_hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?
        };
        if let Some(blob) = cached {
            let db = self.db.lock().unwrap();
            db.execute(
                "UPDATE embedding_cache SET accessed_at = ?1 WHERE content_hash = ?2",
                params![now(), hash],
            )?;
            return Ok(decode_embedding(&blob));
        }

        let embedding = self.embedder.embed_one(trimmed).await?;
        if !embedding.is_empty() {
            let db = self.db.lock().unwrap();
            let ts = now();
            db.execute(
                "INSERT OR REPLACE INTO embedding_cache (content_hash, embedding, created_at, accessed_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![hash, encode_embedding(&embedding), ts],
            )?;
            db.execute(
                "DELETE FROM embedding_cache WHERE content_hash IN (
                    SELECT content_hash FROM embedding_cache ORDER BY accessed_at ASC
                    LIMIT MAX(0, (SELECT COUNT(*) FROM embedding_cache) - ?1)
                 )",
                params![self.embedding_cache_size as i64],
            )?;
        }
        Ok(embedding)
    }

    /// Rebuilds the FTS index and embeds every row still missing a vector.
    /// Returns the number of rows re-embedded.
    pub async fn reindex(&self) -> Result<usize, MemoryError> {
        {
            let db = self.db.lock().unwrap();
            db.execute_batch("INSERT INTO memory_entries_fts(memory_entries_fts) VALUES('rebuild');")?;
        }
        if self.embedder.dimensions() == 0 {
            return Ok(0);
        }

        let pending: Vec<(String, String)> = {
            let db = self.db.lock().unwrap();
            let mut stmt = db.prepare("SELECT key, content FROM memory_entries WHERE embedding IS NULL")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
            rows.filter_map(Result::ok).collect()
        };
        if pending.is_empty() {
            return Ok(0);
        }

        let contents: Vec<String> = pending.iter().map(|(_, c)| c.clone()).collect();
        let embeddings = match self.embedder.embed_batch(&contents).await {
            Ok(embeddings) => embeddings,
            Err(_) => {
                let mut out = Vec::with_capacity(contents.len());
                for content in &contents {
                    out.push(self.embedder.embed_one(content).await.unwrap_or_default());
                }
                out
            }
        };

        let db = self.db.lock().unwrap();
        let mut reembedded = 0usize;
        for ((key, _), embedding) in pending.iter().zip(embeddings.iter()) {
            if embedding.is_empty() {
                continue;
            }
            db.execute(
                "UPDATE memory_entries SET embedding = ?1 WHERE key = ?2",
                params![encode_embedding(embedding), key],
            )?;
            reembedded += 1;
        }
        Ok(reembedded)
    }

    fn exact_lookup(
        &self,
        conn: &Connection,
        key: &str,
        session_key: Option<&str>,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let found: Option<MemoryEntry> = if let Some(sk) = session_key {
            conn.query_row(
                &format!("{ENTRY_COLUMNS} FROM memory_entries m WHERE m.key = ?1 AND m.session_key = ?2"),
                params![key, sk],
                row_to_entry,
            )
            .optional()?
        } else {
            conn.query_row(
                &format!("{ENTRY_COLUMNS} FROM memory_entries m WHERE m.key = ?1"),
                params![key],
                row_to_entry,
            )
            .optional()?
        };
        Ok(match found {
            Some(mut entry) => {
                entry.score = 1.0;
                vec![entry]
            }
            None => Vec::new(),
        })
    }

    fn keyword_search(
        &self,
        conn: &Connection,
        query: &str,
        session_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let expr = build_fts_expr(query);
        if expr.is_empty() {
            return Ok(Vec::new());
        }

        let bm25_result = self.bm25_search(conn, &expr, session_key, limit);
        let results = match bm25_result {
            Ok(rows) if !rows.is_empty() => rows,
            _ => self.like_fallback(conn, query, session_key, limit)?,
        };
        Ok(normalize_scores(results))
    }

    fn bm25_search(
        &self,
        conn: &Connection,
        expr: &str,
        session_key: Option<&str>,
        limit: usize,
    ) -> rusqlite::Result<Vec<MemoryEntry>> {
        let sql = if session_key.is_some() {
            format!(
                "{ENTRY_COLUMNS}, abs(bm25(memory_entries_fts)) AS score
                 FROM memory_entries_fts JOIN memory_entries m ON m.rowid = memory_entries_fts.rowid
                 WHERE memory_entries_fts MATCH ?1 AND m.session_key = ?2
                 ORDER BY bm25(memory_entries_fts) ASC, m.updated_at DESC LIMIT ?3"
            )
        } else {
            format!(
                "{ENTRY_COLUMNS}, abs(bm25(memory_entries_fts)) AS score
                 FROM memory_entries_fts JOIN memory_entries m ON m.rowid = memory_entries_fts.rowid
                 WHERE memory_entries_fts MATCH ?1
                 ORDER BY bm25(memory_entries_fts) ASC, m.updated_at DESC LIMIT ?2"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = if let Some(sk) = session_key {
            stmt.query_map(params![expr, sk, limit as i64], row_to_entry_with_score)?
                .collect::<rusqlite::Result<Vec<_>>>()
        } else {
            stmt.query_map(params![expr, limit as i64], row_to_entry_with_score)?
                .collect::<rusqlite::Result<Vec<_>>>()
        };
        rows
    }

    fn like_fallback(
        &self,
        conn: &Connection,
        query: &str,
        session_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let pattern = format!("%{query}%");
        let sql = if session_key.is_some() {
            format!(
                "{ENTRY_COLUMNS} FROM memory_entries m
                 WHERE (m.key LIKE ?1 OR m.content LIKE ?1) AND m.session_key = ?2
                 ORDER BY m.updated_at DESC LIMIT ?3"
            )
        } else {
            format!(
                "{ENTRY_COLUMNS} FROM memory_entries m
                 WHERE m.key LIKE ?1 OR m.content LIKE ?1
                 ORDER BY m.updated_at DESC LIMIT ?2"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let mut rows: Vec<MemoryEntry> = if let Some(sk) = session_key {
            stmt.query_map(params![pattern, sk, limit as i64], row_to_entry)?
                .filter_map(Result::ok)
                .collect()
        } else {
            stmt.query_map(params![pattern, limit as i64], row_to_entry)?
                .filter_map(Result::ok)
                .collect()
        };
        for row in &mut rows {
            row.score = 1.0;
        }
        Ok(rows)
    }

    fn vector_search(
        &self,
        conn: &Connection,
        query_embedding: &[f32],
        session_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let sql = if session_key.is_some() {
            format!("{ENTRY_COLUMNS} FROM memory_entries m WHERE m.embedding IS NOT NULL AND m.session_key = ?1")
        } else {
            format!("{ENTRY_COLUMNS} FROM memory_entries m WHERE m.embedding IS NOT NULL")
        };
        let mut stmt = conn.prepare(&sql)?;
        let candidates: Vec<MemoryEntry> = if let Some(sk) = session_key {
            stmt.query_map(params![sk], row_to_entry)?.filter_map(Result::ok).collect()
        } else {
            stmt.query_map([], row_to_entry)?.filter_map(Result::ok).collect()
        };

        let mut scored: Vec<MemoryEntry> = candidates
            .into_iter()
            .filter_map(|mut entry| {
                let embedding = entry.embedding.as_ref()?;
                let score = cosine(query_embedding, embedding);
                if score <= 0.0 {
                    return None;
                }
                entry.score = score;
                Some(entry)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

/// `SELECT key, content, ...` column list shared by every entry query so the
/// row mappers stay in sync with the query text.
const ENTRY_COLUMNS: &str =
    "SELECT m.key, m.content, m.category, m.embedding, m.created_at, m.updated_at, m.session_key, m.channel, m.sender, m.message_id";

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn init(&self) -> Result<(), MemoryError> {
        let conn = self.db.lock().unwrap();
        db::init_db(&conn)?;
        Ok(())
    }

    async fn store(
        &self,
        key: &str,
        content: &str,
        category: MemoryCategory,
        meta: MemoryMeta,
    ) -> Result<(), MemoryError> {
        let embedding = self.get_or_compute_embedding(content).await?;
        let blob: Option<Vec<u8>> = if embedding.is_empty() { None } else { Some(encode_embedding(&embedding)) };
        let ts = now();

        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO memory_entries
                (key, content, category, embedding, created_at, session_key, channel, sender, message_id, updated_at)
             VALUES (:key, :content, :category, :embedding, :ts, :session_key, :channel, :sender, :message_id, :ts)
             ON CONFLICT(key) DO UPDATE SET
                content = excluded.content,
                category = excluded.category,
                embedding = excluded.embedding,
                session_key = excluded.session_key,
                channel = excluded.channel,
                sender = excluded.sender,
                message_id = excluded.message_id,
                updated_at = excluded.updated_at",
            rusqlite::named_params! {
                ":key": key,
                ":content": content,
                ":category": category.to_string(),
                ":embedding": blob,
                ":ts": ts,
                ":session_key": meta.session_key,
                ":channel": meta.channel,
                ":sender": meta.sender,
                ":message_id": meta.message_id,
            },
        )?;
        debug!(key, %category, "stored memory entry");
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<bool, MemoryError> {
        let conn = self.db.lock().unwrap();
        let deleted = conn.execute("DELETE FROM memory_entries WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    }

    async fn get(&self, key: &str) -> Result<Option<MemoryEntry>, MemoryError> {
        let conn = self.db.lock().unwrap();
        let entry = conn
            .query_row(&format!("{ENTRY_COLUMNS} FROM memory_entries m WHERE m.key = ?1"), params![key], row_to_entry)
            .optional()?;
        Ok(entry)
    }

    async fn list(&self, category: Option<MemoryCategory>) -> Result<Vec<MemoryEntry>, MemoryError> {
        let conn = self.db.lock().unwrap();
        let rows = if let Some(cat) = category {
            let mut stmt = conn.prepare(&format!(
                "{ENTRY_COLUMNS} FROM memory_entries m WHERE m.category = ?1 ORDER BY m.updated_at DESC"
            ))?;
            stmt.query_map(params![cat.to_string()], row_to_entry)?.filter_map(Result::ok).collect()
        } else {
            let mut stmt =
                conn.prepare(&format!("{ENTRY_COLUMNS} FROM memory_entries m ORDER BY m.updated_at DESC"))?;
            stmt.query_map([], row_to_entry)?.filter_map(Result::ok).collect()
        };
        Ok(rows)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let conn = self.db.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memory_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn recall(
        &self,
        query: &str,
        key: Option<&str>,
        session_key: Option<&str>,
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

        if let Some(key) = key {
            let conn = self.db.lock().unwrap();
            return self.exact_lookup(&conn, key, session_key);
        }

        let keyword_results = {
            let conn = self.db.lock().unwrap();
            self.keyword_search(&conn, query, session_key, limit)?
        };

        if self.embedder.dimensions() == 0 || query.is_empty() {
            let mut out = keyword_results;
            out.truncate(limit);
            return Ok(out);
        }

        let query_embedding = self.embedder.embed_one(query).await?;
        if query_embedding.is_empty() {
            let mut out = keyword_results;
            out.truncate(limit);
            return Ok(out);
        }

        let vector_results = {
            let conn = self.db.lock().unwrap();
            self.vector_search(&conn, &query_embedding, session_key, limit * 2)?
        };

        Ok(merge_keyword_vector(keyword_results, vector_results, self.vector_weight, self.keyword_weight, limit))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn health_check(&self) -> Result<(), MemoryError> {
        let conn = self.db.lock().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

impl SqliteMemoryStore {
    /// Deletes `conversation`-category rows older than `cutoff` (§4.5.3 step 4).
    pub fn delete_conversations_before(&self, cutoff: &str) -> Result<usize, MemoryError> {
        let conn = self.db.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM memory_entries WHERE category = 'conversation' AND updated_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }
}

fn merge_keyword_vector(
    keyword: Vec<MemoryEntry>,
    vector: Vec<MemoryEntry>,
    vector_weight: f64,
    keyword_weight: f64,
    limit: usize,
) -> Vec<MemoryEntry> {
    let mut merged: HashMap<String, (MemoryEntry, f64, f64)> = HashMap::new();

    for entry in keyword {
        let keyword_score = if entry.score == 0.0 { 0.5 } else { entry.score };
        let key = entry.key.clone();
        merged.insert(key, (entry, keyword_score, 0.0));
    }
    for entry in vector {
        let vector_score = entry.score;
        match merged.get_mut(&entry.key) {
            Some(existing) => existing.2 = vector_score,
            None => {
                let key = entry.key.clone();
                merged.insert(key, (entry, 0.0, vector_score));
            }
        }
    }

    let mut results: Vec<MemoryEntry> = merged
        .into_values()
        .map(|(mut entry, keyword_score, vector_score)| {
            let final_score = vector_weight * vector_score + keyword_weight * keyword_score;
            entry.score = if final_score == 0.0 { vector_score } else { final_score };
            entry
        })
        .collect();

    results.sort_by(|a, b| {
        b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    results.truncate(limit);
    results
}

fn normalize_scores(mut entries: Vec<MemoryEntry>) -> Vec<MemoryEntry> {
    let max = entries.iter().map(|e| e.score).fold(0.0_f64, f64::max);
    if max > 0.0 {
        for entry in &mut entries {
            entry.score /= max;
        }
    }
    entries
}

fn build_fts_expr(query: &str) -> String {
    let tokens: Vec<String> =
        query.split_whitespace().map(|token| format!("\"{}\"", token.replace('"', "\"\""))).collect();
    tokens.join(" OR ")
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let category: String = row.get(2)?;
    let blob: Option<Vec<u8>> = row.get(3)?;
    Ok(MemoryEntry {
        key: row.get(0)?,
        content: row.get(1)?,
        category: category.parse().unwrap_or_default(),
        embedding: blob.map(|b| decode_embedding(&b)),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        session_key: row.get(6)?,
        channel: row.get(7)?,
        sender: row.get(8)?,
        message_id: row.get(9)?,
        score: 0.0,
    })
}

fn row_to_entry_with_score(row: &Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let mut entry = row_to_entry(row)?;
    entry.score = row.get(10)?;
    Ok(entry)
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Little-endian IEEE-754 float32 vector, per the on-disk format. A blob with
/// a length not divisible by 4 decodes to empty rather than erroring.
fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    if bytes.len() % 4 != 0 {
        return Vec::new();
    }
    bytes.chunks_exact(4).map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap())).collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_embeddings::NoopEmbeddingClient;

    fn store() -> SqliteMemoryStore {
        let dir = tempfile::tempdir().unwrap();
        SqliteMemoryStore::open(dir.path(), Arc::new(NoopEmbeddingClient), 100, 0.5, 0.5).unwrap()
    }

    #[tokio::test]
    async fn store_then_get_roundtrips() {
        let store = store();
        store.store("greeting", "hello there", MemoryCategory::Core, MemoryMeta::default()).await.unwrap();
        let entry = store.get("greeting").await.unwrap().unwrap();
        assert_eq!(entry.content, "hello there");
        assert_eq!(entry.category, MemoryCategory::Core);
    }

    #[tokio::test]
    async fn store_upserts_by_key() {
        let store = store();
        store.store("k", "first", MemoryCategory::Core, MemoryMeta::default()).await.unwrap();
        store.store("k", "second", MemoryCategory::Core, MemoryMeta::default()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("k").await.unwrap().unwrap().content, "second");
    }

    #[tokio::test]
    async fn forget_reports_whether_a_row_was_removed() {
        let store = store();
        store.store("k", "v", MemoryCategory::Core, MemoryMeta::default()).await.unwrap();
        assert!(store.forget("k").await.unwrap());
        assert!(!store.forget("k").await.unwrap());
    }

    #[tokio::test]
    async fn recall_with_zero_limit_is_empty() {
        let store = store();
        store.store("k", "v", MemoryCategory::Core, MemoryMeta::default()).await.unwrap();
        let results = store.recall("v", None, None, 0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn recall_with_empty_query_and_key_is_empty() {
        let store = store();
        let results = store.recall("", None, None, 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn recall_by_key_is_exact_lookup() {
        let store = store();
        store.store("alpha", "the alpha content", MemoryCategory::Core, MemoryMeta::default()).await.unwrap();
        store.store("beta", "the beta content", MemoryCategory::Core, MemoryMeta::default()).await.unwrap();
        let results = store.recall("", Some("alpha"), None, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "alpha");
    }

    #[tokio::test]
    async fn recall_keyword_matches_via_fts() {
        let store = store();
        store.store("coffee", "likes dark roast coffee in the morning", MemoryCategory::Core, MemoryMeta::default())
            .await
            .unwrap();
        store.store("tea", "prefers green tea in the evening", MemoryCategory::Core, MemoryMeta::default())
            .await
            .unwrap();
        let results = store.recall("coffee morning", None, None, 5).await.unwrap();
        assert_eq!(results[0].key, "coffee");
    }

    #[tokio::test]
    async fn recall_falls_back_to_like_when_fts_has_no_hits() {
        let store = store();
        store.store("k", "Zephyrus unusual-token-xyz", MemoryCategory::Core, MemoryMeta::default()).await.unwrap();
        let results = store.recall("unusual-token-xyz", None, None, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "k");
    }

    #[test]
    fn embedding_round_trips_through_le_f32_bytes() {
        let v = vec![1.0f32, -2.5, 0.0, 3.25];
        let bytes = encode_embedding(&v);
        assert_eq!(decode_embedding(&bytes), v);
    }

    #[test]
    fn corrupt_embedding_blob_decodes_to_empty() {
        assert!(decode_embedding(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_clips_negative_to_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![-1.0f32, 0.0];
        assert_eq!(cosine(&a, &b), 0.0);
    }
}
