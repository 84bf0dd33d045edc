use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding endpoint returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse embedding response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<EmbeddingError> for gateway_core::GatewayError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::Api { status, .. } => gateway_core::GatewayError::EmbeddingHttp(status),
            other => gateway_core::GatewayError::Transport(other.to_string()),
        }
    }
}
