use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("memory not found: {key}")]
    NotFound { key: String },

    #[error("embedding error: {0}")]
    Embedding(#[from] gateway_embeddings::EmbeddingError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<MemoryError> for gateway_core::GatewayError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Database(e) => gateway_core::GatewayError::Database(e.to_string()),
            MemoryError::Io(e) => gateway_core::GatewayError::Io(e),
            MemoryError::NotFound { key } => gateway_core::GatewayError::Database(format!("not found: {key}")),
            MemoryError::Embedding(e) => e.into(),
            MemoryError::Serialization(s) => gateway_core::GatewayError::Parse(s),
        }
    }
}
