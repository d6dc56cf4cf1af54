//! Backend registry: the fixed, ordered list of backends a request may try.
//!
//! Remote backends come first in the order their configuration keys were
//! declared, followed by the enabled local servers in their configured order.

use std::sync::Arc;
use tracing::{debug, info};

use tollgate_config::{GatewayConfig, LocalProviderKind};
use tollgate_core::{Backend, BackendKind, Error, Result};
use tollgate_telemetry::PricingTable;

use crate::anthropic::AnthropicBackend;
use crate::openai_compat::OpenAiCompatBackend;

#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_backends(backends: Vec<Arc<dyn Backend>>) -> Self {
        Self { backends }
    }

    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.push(backend);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.iter().find(|b| b.name() == name).cloned()
    }

    /// Backends a request may try, in registry order, optionally restricted
    /// to one kind.
    pub fn candidates(&self, kind: Option<BackendKind>) -> Vec<Arc<dyn Backend>> {
        self.backends
            .iter()
            .filter(|b| kind.is_none_or(|k| b.kind() == k))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.backends.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Build the registry described by `config`.
///
/// Fails when a remote provider has no known endpoint and no `base_url`, or
/// no known default model and an empty `models` list.
pub fn build_from_config(config: &GatewayConfig, pricing: Arc<PricingTable>) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();

    for (name, provider) in config.remote_providers.iter() {
        let models = if provider.models.is_empty() {
            default_models(name)
        } else {
            provider.models.clone()
        };
        if models.is_empty() {
            return Err(Error::config(format!(
                "remote provider '{name}' needs at least one entry in `models`"
            )));
        }

        let backend: Arc<dyn Backend> = if name == "anthropic" {
            let mut b = AnthropicBackend::new(&provider.api_key, models, Arc::clone(&pricing));
            if let Some(url) = &provider.base_url {
                b = b.with_base_url(url);
            }
            Arc::new(b)
        } else {
            let base_url = provider
                .base_url
                .clone()
                .or_else(|| default_base_url(name).map(String::from))
                .ok_or_else(|| {
                    Error::config(format!(
                        "unknown remote provider '{name}': set `base_url` for it"
                    ))
                })?;
            Arc::new(OpenAiCompatBackend::remote(
                name,
                base_url,
                &provider.api_key,
                models,
                Arc::clone(&pricing),
            ))
        };

        debug!(backend = %name, kind = "remote", "Registered backend");
        registry.register(backend);
    }

    for kind in config.local_providers() {
        let backend = match kind {
            LocalProviderKind::Ollama => OpenAiCompatBackend::ollama(None),
            LocalProviderKind::Lmstudio => OpenAiCompatBackend::lmstudio(None),
        };
        debug!(backend = %kind.name(), kind = "local", "Registered backend");
        registry.register(Arc::new(backend));
    }

    info!(backends = ?registry.names(), "Backend registry ready");
    Ok(registry)
}

/// Default endpoint for well-known remote providers.
pub fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openai" => Some("https://api.openai.com/v1"),
        "anthropic" => Some(crate::anthropic::DEFAULT_BASE_URL),
        "google" => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        "mistral" => Some("https://api.mistral.ai/v1"),
        "xai" => Some("https://api.x.ai/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        _ => None,
    }
}

/// Models used when a provider is declared without a `models` list.
pub fn default_models(provider_name: &str) -> Vec<String> {
    let models: &[&str] = match provider_name {
        "openai" => &["gpt-4o-mini", "gpt-4o"],
        "anthropic" => &["claude-3-5-haiku-20241022", "claude-3-5-sonnet-20241022"],
        "google" => &["gemini-2.0-flash", "gemini-1.5-pro"],
        "deepseek" => &["deepseek-chat", "deepseek-coder"],
        "mistral" => &["mistral-small-latest", "mistral-large-latest"],
        "xai" => &["grok-2", "grok-2-mini"],
        "together" => &["meta-llama/Llama-3.3-70B-Instruct-Turbo"],
        _ => &[],
    };
    models.iter().map(|m| (*m).to_string()).collect()
}
