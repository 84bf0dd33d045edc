use serde::{Deserialize, Serialize};

/// Which store a memory entry belongs to, per §4.5.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    #[default]
    Core,
    Daily,
    Conversation,
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Daily => write!(f, "daily"),
            Self::Conversation => write!(f, "conversation"),
        }
    }
}

impl std::str::FromStr for MemoryCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(Self::Core),
            "daily" => Ok(Self::Daily),
            "conversation" => Ok(Self::Conversation),
            other => Err(format!("unknown memory category: {other}")),
        }
    }
}

/// One row in `memory_entries`. `embedding` is the decoded float vector, not
/// the on-disk blob — callers never see raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub content: String,
    pub category: MemoryCategory,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    /// Recall score — only populated on entries returned from `recall`.
    #[serde(default)]
    pub score: f64,
}

/// Optional fields a caller may supply to `store` beyond key/content/category.
#[derive(Debug, Clone, Default)]
pub struct MemoryMeta {
    pub session_key: Option<String>,
    pub channel: Option<String>,
    pub sender: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingCacheEntry {
    pub content_hash: String,
    pub embedding: Vec<f32>,
    pub created_at: String,
    pub accessed_at: String,
}
