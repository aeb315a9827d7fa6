//! Provider lookup by kind.

use std::collections::HashMap;
use std::sync::Arc;

use super::providers::{AnthropicProvider, OpenAiCompatibleProvider};
use super::{LlmProvider, ProviderKind};
use crate::config::AppConfig;
use crate::error::LlmError;

/// Maps each configured [`ProviderKind`] to a client.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build clients for every provider kind from configuration.
    ///
    /// Missing API keys are not an error here: the provider decides whether to
    /// reject an unauthenticated call.
    pub fn from_config(config: &AppConfig) -> Result<Self, LlmError> {
        let mut registry = Self::new();
        let timeout = config.request_timeout();

        for kind in ProviderKind::all() {
            let api_key = config.api_key_for(kind);
            let provider: Arc<dyn LlmProvider> = match kind {
                ProviderKind::Anthropic => Arc::new(AnthropicProvider::with_custom_url(
                    config.base_url_for(kind),
                    api_key,
                    config.model_for(kind),
                    timeout,
                )?),
                ProviderKind::OpenAi | ProviderKind::OpenRouter | ProviderKind::Ollama => {
                    Arc::new(OpenAiCompatibleProvider::with_custom_url(
                        kind,
                        config.base_url_for(kind),
                        api_key,
                        config.model_for(kind),
                        timeout,
                    )?)
                }
            };
            tracing::debug!(provider = %kind, "Registered LLM provider");
            registry.register(kind, provider);
        }

        Ok(registry)
    }

    /// Register (or replace) the client for a kind.
    pub fn register(&mut self, kind: ProviderKind, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(kind, provider);
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with_provider(mut self, kind: ProviderKind, provider: Arc<dyn LlmProvider>) -> Self {
        self.register(kind, provider);
        self
    }

    /// Look up the client for a kind.
    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn LlmProvider>, LlmError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| LlmError::ProviderNotConfigured(kind.to_string()))
    }

    /// Kinds with a registered client, sorted.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.providers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.kinds())
            .finish()
    }
}
