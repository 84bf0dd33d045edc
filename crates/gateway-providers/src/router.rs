//! Provider Router (C7): resolves a logical model string plus an optional
//! caller override into an ordered candidate chain of provider ids, each with
//! the model id to send and the credentials to authenticate with.

use std::collections::HashMap;

use gateway_core::config::{ModelRouteConfig, ProviderCredentials};
use gateway_core::types::candidates;

use crate::provider::ProviderError;
use crate::registry;

/// Alias groups that should be tried interchangeably when resolving
/// credentials for a provider id — the same account covers any of them.
const ALIAS_GROUPS: &[&[&str]] = &[&["zai", "z.ai"], &["glm", "zhipu"], &["gemini", "google", "google-gemini"]];

fn alias_set(provider: &str) -> Vec<String> {
    for group in ALIAS_GROUPS {
        if group.iter().any(|g| g.eq_ignore_ascii_case(provider)) {
            return group.iter().map(|s| s.to_string()).collect();
        }
    }
    vec![provider.to_string()]
}

/// Fixed per-provider environment variable precedence (§4.7). Providers not
/// listed here fall through to the generic `<PROVIDER>_API_KEY` convention.
fn fixed_env_vars(provider: &str) -> &'static [&'static str] {
    match provider {
        "anthropic" => &["ANTHROPIC_OAUTH_TOKEN", "ANTHROPIC_API_KEY"],
        "openrouter" => &["OPENROUTER_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        _ => &[],
    }
}

fn generic_env_var(provider: &str) -> String {
    let upper = provider.to_uppercase().replace(['-', '.'], "_");
    format!("{upper}_API_KEY")
}

/// One step of the model-string grammar (§4.7): either a `hint:` route, an
/// explicit `provider/model` or `(anthropic-)custom:` path, or a bare model
/// name carrying no routing information at all.
#[derive(Debug, Clone)]
enum ParsedModel {
    Hint { provider: String, model: String, api_key: Option<String> },
    Explicit { provider: String, model: String },
    Bare(String),
}

fn parse_model_string(model: &str, model_routes: &[ModelRouteConfig]) -> ParsedModel {
    if let Some(hint) = model.strip_prefix("hint:") {
        match model_routes.iter().find(|r| r.hint.eq_ignore_ascii_case(hint)) {
            Some(route) if !route.provider.is_empty() && !route.model.is_empty() => {
                return ParsedModel::Hint {
                    provider: route.provider.clone(),
                    model: route.model.clone(),
                    api_key: route.api_key.clone(),
                };
            }
            _ => {
                tracing::warn!(hint, "no model_routes match for hint, falling through to bare model string");
                return ParsedModel::Bare(model.to_string());
            }
        }
    }

    for tag in ["custom:", "anthropic-custom:"] {
        if let Some(rest) = model.strip_prefix(tag) {
            if let Some(idx) = rest.rfind('/') {
                let provider = format!("{tag}{}", &rest[..idx]);
                let model_id = rest[idx + 1..].to_string();
                return ParsedModel::Explicit { provider, model: model_id };
            }
        }
    }

    if let Some(idx) = model.find('/') {
        let provider = model[..idx].to_lowercase();
        let rest = model[idx + 1..].to_string();
        return ParsedModel::Explicit { provider, model: rest };
    }

    ParsedModel::Bare(model.to_string())
}

/// OpenRouter expects one leading `<vendor>/<model>` segment, so a model
/// already qualified with `openrouter/` would double up; every other
/// provider just loses its own matching prefix if the raw string had one.
/// Cross-provider paths (a prefix naming a *different* provider) pass
/// through untouched.
fn normalize_model_for_provider(provider: &str, raw_model: &str) -> String {
    if provider == "openrouter" {
        return raw_model.strip_prefix("openrouter/").unwrap_or(raw_model).to_string();
    }
    let own_prefix = format!("{provider}/");
    raw_model.strip_prefix(own_prefix.as_str()).unwrap_or(raw_model).to_string()
}

fn is_known_provider(name: &str) -> bool {
    name == "anthropic" || name.starts_with("custom:") || name.starts_with("anthropic-custom:") || registry::lookup(name).is_some()
}

/// Credential resolution for provider `P` (§4.7): configured `providers[alias]`
/// first, then any `model_routes` entry carrying its own key, then a fixed
/// per-provider env var precedence list, then the generic fallback var.
pub fn resolve_credentials(
    provider: &str,
    providers_cfg: &HashMap<String, ProviderCredentials>,
    model_routes: &[ModelRouteConfig],
) -> Option<ProviderCredentials> {
    let aliases = alias_set(provider);

    for alias in &aliases {
        if let Some(cred) = providers_cfg.get(alias) {
            if cred.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
                return Some(cred.clone());
            }
        }
    }

    for route in model_routes {
        if aliases.iter().any(|a| a.eq_ignore_ascii_case(&route.provider)) {
            if let Some(key) = route.api_key.as_ref().filter(|k| !k.is_empty()) {
                return Some(ProviderCredentials {
                    api_key: Some(key.clone()),
                    base_url: providers_cfg.get(provider).and_then(|c| c.base_url.clone()),
                });
            }
        }
    }

    for var in fixed_env_vars(provider) {
        if let Ok(val) = std::env::var(var) {
            if !val.is_empty() {
                return Some(ProviderCredentials { api_key: Some(val), base_url: providers_cfg.get(provider).and_then(|c| c.base_url.clone()) });
            }
        }
    }

    if let Ok(val) = std::env::var(generic_env_var(provider)) {
        if !val.is_empty() {
            return Some(ProviderCredentials { api_key: Some(val), base_url: providers_cfg.get(provider).and_then(|c| c.base_url.clone()) });
        }
    }

    None
}

fn select_primary(
    override_provider: Option<&str>,
    parsed: &ParsedModel,
    providers_cfg: &HashMap<String, ProviderCredentials>,
    model_routes: &[ModelRouteConfig],
) -> String {
    if let Some(p) = override_provider.filter(|p| !p.is_empty()) {
        return p.to_string();
    }
    match parsed {
        ParsedModel::Hint { provider, .. } | ParsedModel::Explicit { provider, .. } => return provider.clone(),
        ParsedModel::Bare(_) => {}
    }
    if resolve_credentials("openrouter", providers_cfg, model_routes).is_some() {
        return "openrouter".to_string();
    }
    let mut keyed: Vec<&String> =
        providers_cfg.iter().filter(|(_, c)| c.api_key.as_deref().is_some_and(|k| !k.is_empty())).map(|(name, _)| name).collect();
    keyed.sort();
    if let Some(first) = keyed.into_iter().next() {
        return first.clone();
    }
    "openrouter".to_string()
}

/// One resolved candidate: the provider id to construct, the model id to send
/// it, and the credentials (if any resolved) to authenticate with.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: String,
    pub model: String,
    pub credentials: Option<ProviderCredentials>,
}

/// Resolves a request's model string plus optional override into the primary
/// provider, its normalized model id, and the full ordered candidate chain.
pub fn resolve(
    model: &str,
    override_provider: Option<&str>,
    model_routes: &[ModelRouteConfig],
    providers_cfg: &HashMap<String, ProviderCredentials>,
    fallback_providers: &[String],
) -> Vec<Candidate> {
    let parsed = parse_model_string(model, model_routes);
    let primary = select_primary(override_provider, &parsed, providers_cfg, model_routes);

    let raw_model = match &parsed {
        ParsedModel::Hint { model, .. } | ParsedModel::Explicit { model, .. } => model.clone(),
        ParsedModel::Bare(m) => m.clone(),
    };
    let hint_api_key = match &parsed {
        ParsedModel::Hint { api_key, .. } => api_key.clone(),
        _ => None,
    };

    let provider_ids = candidates(&primary, fallback_providers, &is_known_provider);

    provider_ids
        .into_iter()
        .map(|provider| {
            let model = normalize_model_for_provider(&provider, &raw_model);
            let mut credentials = resolve_credentials(&provider, providers_cfg, model_routes);
            if provider == primary {
                if let Some(key) = &hint_api_key {
                    credentials = Some(ProviderCredentials {
                        api_key: Some(key.clone()),
                        base_url: credentials.and_then(|c| c.base_url),
                    });
                }
            }
            Candidate { provider, model, credentials }
        })
        .collect()
}

/// Builds the wire adapter for one resolved candidate.
pub fn build_provider(candidate: &Candidate) -> Result<Box<dyn crate::provider::LlmProvider>, ProviderError> {
    let provider = candidate.provider.as_str();
    let credentials = candidate.credentials.clone().unwrap_or_default();

    if provider == "anthropic" {
        let key = credentials.api_key.ok_or_else(|| ProviderError::MissingCredentials(provider.to_string()))?;
        return Ok(Box::new(crate::anthropic::AnthropicProvider::new(key, credentials.base_url)));
    }

    if let Some(rest) = provider.strip_prefix("anthropic-custom:") {
        let key = credentials.api_key.ok_or_else(|| ProviderError::MissingCredentials(provider.to_string()))?;
        return Ok(Box::new(crate::anthropic::AnthropicProvider::new(key, Some(rest.to_string()))));
    }

    if let Some(rest) = provider.strip_prefix("custom:") {
        let key = credentials.api_key.ok_or_else(|| ProviderError::MissingCredentials(provider.to_string()))?;
        return Ok(Box::new(crate::openai::OpenAiProvider::new(
            provider.to_string(),
            rest.to_string(),
            "/chat/completions".to_string(),
            key,
            HashMap::new(),
        )));
    }

    if let Some(known) = registry::lookup(provider) {
        let key = credentials.api_key.ok_or_else(|| ProviderError::MissingCredentials(provider.to_string()))?;
        let base_url = credentials.base_url.unwrap_or_else(|| known.base_url.to_string());
        let mut extra_headers = HashMap::new();
        if provider == "openrouter" {
            extra_headers.insert("HTTP-Referer".to_string(), "https://github.com/gateway-assistant".to_string());
            extra_headers.insert("X-Title".to_string(), "Gateway Assistant".to_string());
        }
        return Ok(Box::new(crate::openai::OpenAiProvider::new(
            provider.to_string(),
            base_url,
            known.chat_path.to_string(),
            key,
            extra_headers,
        )));
    }

    let key = credentials.api_key.ok_or_else(|| ProviderError::MissingCredentials(provider.to_string()))?;
    let base_url = credentials.base_url.ok_or_else(|| ProviderError::MissingCredentials(provider.to_string()))?;
    Ok(Box::new(crate::openai::OpenAiProvider::new(provider.to_string(), base_url, "/chat/completions".to_string(), key, HashMap::new())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_form_resolves_provider_and_model_from_routes() {
        let routes = vec![ModelRouteConfig { hint: "fast".to_string(), provider: "groq".to_string(), model: "llama-3.3-70b".to_string(), api_key: None }];
        let parsed = parse_model_string("hint:fast", &routes);
        match parsed {
            ParsedModel::Hint { provider, model, .. } => {
                assert_eq!(provider, "groq");
                assert_eq!(model, "llama-3.3-70b");
            }
            other => panic!("expected Hint, got {other:?}"),
        }
    }

    #[test]
    fn unknown_hint_falls_through_to_bare() {
        let parsed = parse_model_string("hint:nope", &[]);
        assert!(matches!(parsed, ParsedModel::Bare(_)));
    }

    #[test]
    fn custom_form_splits_at_last_slash_keeping_scheme_in_provider() {
        let parsed = parse_model_string("custom:https://host.example/path/my-model", &[]);
        match parsed {
            ParsedModel::Explicit { provider, model } => {
                assert_eq!(provider, "custom:https://host.example/path");
                assert_eq!(model, "my-model");
            }
            other => panic!("expected Explicit, got {other:?}"),
        }
    }

    #[test]
    fn provider_prefix_form_splits_at_first_slash_case_folded() {
        let parsed = parse_model_string("OpenRouter/openai/gpt-4o", &[]);
        match parsed {
            ParsedModel::Explicit { provider, model } => {
                assert_eq!(provider, "openrouter");
                assert_eq!(model, "openai/gpt-4o");
            }
            other => panic!("expected Explicit, got {other:?}"),
        }
    }

    #[test]
    fn openrouter_prefix_is_stripped_once() {
        assert_eq!(normalize_model_for_provider("openrouter", "openrouter/openai/gpt-4o"), "openai/gpt-4o");
        assert_eq!(normalize_model_for_provider("openrouter", "anthropic/claude-3-opus"), "anthropic/claude-3-opus");
    }

    #[test]
    fn own_provider_prefix_is_dropped() {
        assert_eq!(normalize_model_for_provider("groq", "groq/llama-3.3-70b"), "llama-3.3-70b");
    }

    #[test]
    fn cross_provider_prefix_passes_through_untouched() {
        assert_eq!(normalize_model_for_provider("groq", "anthropic/claude-3-opus"), "anthropic/claude-3-opus");
    }

    #[test]
    fn alias_groups_resolve_credentials_across_names() {
        let mut providers = HashMap::new();
        providers.insert("zai".to_string(), ProviderCredentials { api_key: Some("key-1".to_string()), base_url: None });
        let cred = resolve_credentials("z.ai", &providers, &[]).unwrap();
        assert_eq!(cred.api_key.as_deref(), Some("key-1"));
    }

    #[test]
    fn primary_selection_prefers_override_then_model_prefix_then_lexicographic_key() {
        let mut providers = HashMap::new();
        providers.insert("zzz".to_string(), ProviderCredentials { api_key: Some("k".to_string()), base_url: None });
        providers.insert("aaa".to_string(), ProviderCredentials { api_key: Some("k".to_string()), base_url: None });
        let parsed = ParsedModel::Bare("claude-sonnet-4-6".to_string());
        let primary = select_primary(None, &parsed, &providers, &[]);
        assert_eq!(primary, "aaa");

        let primary = select_primary(Some("explicit-override"), &parsed, &providers, &[]);
        assert_eq!(primary, "explicit-override");
    }

    #[test]
    fn primary_selection_falls_back_to_openrouter_with_no_configured_keys() {
        let primary = select_primary(None, &ParsedModel::Bare("gpt-4o".to_string()), &HashMap::new(), &[]);
        assert_eq!(primary, "openrouter");
    }

    #[test]
    fn candidate_chain_drops_unknown_fallbacks_and_dedups() {
        let routes = vec![];
        let mut providers = HashMap::new();
        providers.insert("anthropic".to_string(), ProviderCredentials { api_key: Some("k".to_string()), base_url: None });
        let fallbacks = vec!["anthropic".to_string(), "totally-bogus".to_string(), "groq".to_string()];
        let resolved = resolve("anthropic/claude-sonnet-4-6", None, &routes, &providers, &fallbacks);
        let ids: Vec<&str> = resolved.iter().map(|c| c.provider.as_str()).collect();
        assert_eq!(ids, vec!["anthropic", "groq"]);
    }
}
