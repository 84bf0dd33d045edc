//! Embedding clients: an HTTP client against an OpenAI-compatible
//! `/embeddings` endpoint, and a no-op fallback selected when the host has no
//! embedding provider configured.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;

const BATCH_SIZE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        Ok(batch.pop().unwrap_or_default())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Selected when no embedding provider is configured. Every vector is empty,
/// which downstream recall treats as "no vector signal" (§4.5.1 step 4 falls
/// back to keyword-only scoring).
pub struct NoopEmbeddingClient;

#[async_trait]
impl EmbeddingClient for NoopEmbeddingClient {
    fn name(&self) -> &str {
        "noop"
    }

    fn dimensions(&self) -> usize {
        0
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| Vec::new()).collect())
    }
}

pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("embedding http client builds");
        Self { client, base_url: base_url.into(), api_key: api_key.into(), model: model.into(), dimensions }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

/// Derives the `/embeddings` endpoint from a configured base URL:
/// - strips a trailing `/`
/// - if it already ends in `/embeddings`, used as-is
/// - if it ends in `/v1` (or contains `/api/`), `/embeddings` is appended
/// - otherwise `/v1/embeddings` is appended
pub fn embed_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/embeddings") {
        trimmed.to_string()
    } else if trimmed.ends_with("/v1") || trimmed.contains("/api/") {
        format!("{trimmed}/embeddings")
    } else {
        format!("{trimmed}/v1/embeddings")
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut results: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];

        // Indices of non-empty inputs, so empty slots are preserved without
        // wasting a request round-trip on them.
        let non_empty: Vec<usize> =
            texts.iter().enumerate().filter(|(_, t)| !t.trim().is_empty()).map(|(i, _)| i).collect();

        let endpoint = embed_endpoint(&self.base_url);

        for chunk in non_empty.chunks(BATCH_SIZE) {
            let inputs: Vec<String> = chunk.iter().map(|&i| texts[i].clone()).collect();
            let body = EmbeddingRequest {
                model: &self.model,
                input: &inputs,
                dimensions: if self.dimensions > 0 { Some(self.dimensions) } else { None },
            };

            let response = self
                .client
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(EmbeddingError::Api { status: status.as_u16(), body: text });
            }

            let parsed: EmbeddingResponse = response.json().await?;
            for datum in parsed.data {
                if let Some(&original_index) = chunk.get(datum.index) {
                    results[original_index] = datum.embedding;
                }
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_v1_embeddings_by_default() {
        assert_eq!(embed_endpoint("https://api.example.com"), "https://api.example.com/v1/embeddings");
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        assert_eq!(embed_endpoint("https://api.example.com/"), "https://api.example.com/v1/embeddings");
    }

    #[test]
    fn endpoint_used_as_is_when_already_embeddings() {
        assert_eq!(
            embed_endpoint("https://api.example.com/v1/embeddings"),
            "https://api.example.com/v1/embeddings"
        );
    }

    #[test]
    fn endpoint_appends_embeddings_after_v1_suffix() {
        assert_eq!(embed_endpoint("https://api.example.com/v1"), "https://api.example.com/v1/embeddings");
    }

    #[test]
    fn endpoint_appends_embeddings_for_api_path() {
        assert_eq!(
            embed_endpoint("https://gateway.example.com/api/openai"),
            "https://gateway.example.com/api/openai/embeddings"
        );
    }

    #[tokio::test]
    async fn noop_client_returns_empty_vectors_for_every_input() {
        let client = NoopEmbeddingClient;
        let out = client.embed_batch(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(out, vec![Vec::<f32>::new(), Vec::<f32>::new()]);
    }
}
