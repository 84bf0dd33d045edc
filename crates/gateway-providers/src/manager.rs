//! Model Manager (C8): retry, exponential backoff, and candidate failover
//! around the Provider Router (§4.7/§4.8).

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gateway_core::config::{ModelRouteConfig, ProviderCredentials};
use gateway_core::error::GatewayError;
use gateway_core::sanitize::scrub;
use gateway_core::types::ChatRequest;
use std::collections::HashMap;

use crate::provider::ChatResponse;
use crate::router;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_BACKOFF_MS: u64 = 500;

pub struct ModelManager {
    max_attempts: u32,
    base_backoff: Duration,
}

impl ModelManager {
    pub fn new(retries: u32, base_backoff_ms: u64) -> Self {
        Self { max_attempts: retries + 1, base_backoff: Duration::from_millis(base_backoff_ms) }
    }

    #[tracing::instrument(skip(self, request, model_routes, providers_cfg, fallback_providers, cancel))]
    pub async fn chat(
        &self,
        request: &ChatRequest,
        model: &str,
        override_provider: Option<&str>,
        model_routes: &[ModelRouteConfig],
        providers_cfg: &HashMap<String, ProviderCredentials>,
        fallback_providers: &[String],
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, GatewayError> {
        let candidates = router::resolve(model, override_provider, model_routes, providers_cfg, fallback_providers);
        let mut attempt_lines: Vec<String> = Vec::new();

        for candidate in &candidates {
            let provider = match router::build_provider(candidate) {
                Ok(p) => p,
                Err(e) => {
                    attempt_lines.push(format!("{} attempt 1/{}: {}", candidate.provider, self.max_attempts, scrub(&e.to_string())));
                    continue;
                }
            };

            for attempt in 1..=self.max_attempts {
                if cancel.is_cancelled() {
                    return Err(GatewayError::Canceled("model manager canceled before dispatch".to_string()));
                }

                match provider.chat(request, &candidate.model).await {
                    Ok(resp) => {
                        info!(provider = %candidate.provider, model = %candidate.model, attempt, "provider call succeeded");
                        return Ok(resp);
                    }
                    Err(err) => {
                        let sanitized = scrub(&err.to_string());
                        warn!(provider = %candidate.provider, attempt, error = %sanitized, "provider call failed");
                        attempt_lines.push(format!("{} attempt {}/{}: {}", candidate.provider, attempt, self.max_attempts, sanitized));

                        if err.is_non_retryable() {
                            break;
                        }
                        if attempt < self.max_attempts {
                            tokio::select! {
                                _ = tokio::time::sleep(self.base_backoff * 2u32.pow(attempt - 1)) => {}
                                _ = cancel.cancelled() => {
                                    return Err(GatewayError::Canceled("model manager canceled during backoff".to_string()));
                                }
                            }
                        }
                    }
                }
            }
        }

        Err(GatewayError::ApiError {
            status: 0,
            body: format!("All providers failed. Attempts:\n{}", attempt_lines.join("\n")),
        })
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS - 1, DEFAULT_BASE_BACKOFF_MS)
    }
}
