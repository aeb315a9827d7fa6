//! Configuration for prompt-forge.
//!
//! Configuration is read from an optional YAML file; every field has a
//! default, so an absent file is equivalent to an empty one. API keys are
//! never stored in the file, only the name of the environment variable that
//! holds them.
//!
//! ```yaml
//! data_dir: ~/.prompt-forge
//! default_provider: openrouter
//! default_model: anthropic/claude-3.5-haiku
//! providers:
//!   ollama:
//!     base_url: http://gpu-box:11434/v1
//!     model: llama3.1:70b
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::ProviderKind;

/// Default directory for persisted documents.
const DEFAULT_DATA_DIR: &str = "./.prompt-forge";

/// Default provider request timeout.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Per-provider overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// API base URL; the provider's public endpoint when unset.
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Default model for this provider.
    pub model: Option<String>,
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding templates, history and presets.
    pub data_dir: PathBuf,
    /// Provider used when no template tier names one.
    pub default_provider: ProviderKind,
    /// Model used when no template tier names one.
    pub default_model: Option<String>,
    /// Timeout applied to every provider request.
    pub request_timeout_secs: u64,
    /// Per-provider overrides.
    pub providers: BTreeMap<ProviderKind, ProviderSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            default_provider: ProviderKind::OpenAi,
            default_model: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            providers: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Sets the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Sets the default provider.
    pub fn with_default_provider(mut self, provider: ProviderKind) -> Self {
        self.default_provider = provider;
        self
    }

    /// Sets the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Sets the request timeout in seconds.
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Sets overrides for one provider.
    pub fn with_provider(mut self, kind: ProviderKind, settings: ProviderSettings) -> Self {
        self.providers.insert(kind, settings);
        self
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// The fixed provider/model pair used when nothing else names one.
    pub fn default_target(&self) -> (ProviderKind, String) {
        let model = self
            .default_model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.model_for(self.default_provider));
        (self.default_provider, model)
    }

    /// Base URL for a provider.
    pub fn base_url_for(&self, kind: ProviderKind) -> String {
        self.providers
            .get(&kind)
            .and_then(|s| s.base_url.clone())
            .unwrap_or_else(|| kind.default_base_url().to_string())
    }

    /// Default model for a provider.
    pub fn model_for(&self, kind: ProviderKind) -> String {
        self.providers
            .get(&kind)
            .and_then(|s| s.model.clone())
            .unwrap_or_else(|| kind.default_model().to_string())
    }

    /// Name of the environment variable holding a provider's key.
    pub fn api_key_env_for(&self, kind: ProviderKind) -> Option<String> {
        self.providers
            .get(&kind)
            .and_then(|s| s.api_key_env.clone())
            .or_else(|| kind.default_api_key_env().map(str::to_string))
    }

    /// Read a provider's API key from the environment. Absence is not an error.
    pub fn api_key_for(&self, kind: ProviderKind) -> Option<String> {
        self.api_key_env_for(kind)
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.default_provider, ProviderKind::OpenAi);
        assert_eq!(
            config.default_target(),
            (ProviderKind::OpenAi, "gpt-4o-mini".to_string())
        );
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
data_dir: /tmp/pf
default_provider: ollama
request_timeout_secs: 30
providers:
  ollama:
    base_url: http://gpu-box:11434/v1
    model: llama3.1:70b
"#;
        let config = AppConfig::from_yaml(yaml).expect("yaml should parse");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/pf"));
        assert_eq!(config.base_url_for(ProviderKind::Ollama), "http://gpu-box:11434/v1");
        assert_eq!(
            config.default_target(),
            (ProviderKind::Ollama, "llama3.1:70b".to_string())
        );
        assert_eq!(
            config.base_url_for(ProviderKind::OpenAi),
            "https://api.openai.com/v1"
        );
    }

    #[test]
    fn test_unknown_provider_in_yaml_is_error() {
        let err = AppConfig::from_yaml("default_provider: gemini").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(AppConfig::from_yaml("  \n").expect("parse"), AppConfig::default());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = AppConfig::load(temp_dir.path().join("absent.yaml")).expect("load");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_file() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "default_model: gpt-4o\n").expect("write");

        let config = AppConfig::load(&path).expect("load");
        assert_eq!(config.default_target().1, "gpt-4o");
    }

    #[test]
    fn test_builder() {
        let config = AppConfig::default()
            .with_data_dir("/data")
            .with_default_provider(ProviderKind::Anthropic)
            .with_default_model("claude-x")
            .with_request_timeout_secs(0)
            .with_provider(
                ProviderKind::Anthropic,
                ProviderSettings {
                    api_key_env: Some("MY_CLAUDE_KEY".to_string()),
                    ..Default::default()
                },
            );

        assert_eq!(config.default_target(), (ProviderKind::Anthropic, "claude-x".to_string()));
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
        assert_eq!(
            config.api_key_env_for(ProviderKind::Anthropic).as_deref(),
            Some("MY_CLAUDE_KEY")
        );
        assert_eq!(config.api_key_env_for(ProviderKind::Ollama), None);
    }
}
