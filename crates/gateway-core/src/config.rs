//! Typed shape of the configuration source the core expects from its host
//! (§6 External Interfaces). The core does not discover or watch config
//! files — parsing the on-disk layout is a collaborator's job — but it
//! ships the concrete struct the host deserializes into, with `figment`
//! layering a TOML file under `GATEWAY_`-prefixed environment overrides,
//! mirroring how the rest of this workspace loads config.

use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub autonomy: AutonomyConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    #[serde(default)]
    pub model_routes: Vec<ModelRouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Root directory the Runner reads project-context markdown files from
    /// and the Memory Store nests `memory/`/`sessions/` under.
    pub workspace: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderCredentials>,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workspace: ".".to_string(),
            model: default_model(),
            providers: HashMap::new(),
            sandbox: SandboxConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Shell-policy gate (§4.2 autonomy gate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    #[serde(default)]
    pub level: AutonomyLevel,
    #[serde(default = "bool_true")]
    pub block_high_risk: bool,
    #[serde(default)]
    pub workspace_only: bool,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            level: AutonomyLevel::default(),
            block_high_risk: true,
            workspace_only: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    Readonly,
    #[default]
    Supervised,
    Autonomous,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self { mode: "default".to_string(), allow: Vec::new(), deny: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    #[serde(default = "bool_true")]
    pub auto_save: bool,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,
    #[serde(default)]
    pub embedding_provider: Option<String>,
    #[serde(default)]
    pub embedding_api_key: Option<String>,
    #[serde(default)]
    pub embedding_base_url: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    #[serde(default = "default_embedding_cache_size")]
    pub embedding_cache_size: usize,
    #[serde(default = "default_archive_after_days")]
    pub archive_after_days: i64,
    #[serde(default = "default_purge_after_days")]
    pub purge_after_days: i64,
    #[serde(default = "default_conversation_retention_days")]
    pub conversation_retention_days: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            auto_save: true,
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            embedding_provider: None,
            embedding_api_key: None,
            embedding_base_url: None,
            embedding_model: None,
            embedding_dimensions: default_embedding_dimensions(),
            embedding_cache_size: default_embedding_cache_size(),
            archive_after_days: default_archive_after_days(),
            purge_after_days: default_purge_after_days(),
            conversation_retention_days: default_conversation_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_provider_retries")]
    pub provider_retries: u32,
    #[serde(default = "default_provider_backoff_ms")]
    pub provider_backoff_ms: u64,
    #[serde(default)]
    pub fallback_providers: Vec<String>,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            provider_retries: default_provider_retries(),
            provider_backoff_ms: default_provider_backoff_ms(),
            fallback_providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRouteConfig {
    pub hint: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4-6".to_string()
}
fn default_memory_backend() -> String {
    "sqlite".to_string()
}
fn default_vector_weight() -> f32 {
    0.5
}
fn default_keyword_weight() -> f32 {
    0.5
}
fn default_embedding_dimensions() -> usize {
    1536
}
fn default_embedding_cache_size() -> usize {
    10_000
}
fn default_archive_after_days() -> i64 {
    30
}
fn default_purge_after_days() -> i64 {
    90
}
fn default_conversation_retention_days() -> i64 {
    14
}
fn default_provider_retries() -> u32 {
    2
}
fn default_provider_backoff_ms() -> u64 {
    500
}

impl GatewayConfig {
    /// Load from an optional TOML file path, layered under `GATEWAY_`-prefixed
    /// environment overrides (e.g. `GATEWAY_AGENT_MODEL`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("GATEWAY_").split("_"));
        figment.extract().map_err(|e| GatewayError::Config(e.to_string()))
    }
}
