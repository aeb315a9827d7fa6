//! Error types for prompt-forge operations.
//!
//! Defines the error taxonomy for every subsystem:
//! - LLM provider calls (raw transport/API failures)
//! - Enhancement outcomes (classified failures returned to callers)
//! - Template editing and persistence
//! - Prompt lineage integrity
//! - Document storage and persistence
//! - Preset editing and import validation
//! - Configuration loading

use thiserror::Error;

/// Errors raised by an LLM provider client.
///
/// These are the raw signals from the external black box. The enhancement
/// orchestrator classifies them into [`EnhanceError`] before they reach callers.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key for provider '{0}'")]
    MissingApiKey(String),

    #[error("Provider '{0}' is not configured")]
    ProviderNotConfigured(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Provider returned an empty response")]
    EmptyResponse,
}

/// Classified outcome of a failed enhancement call.
///
/// Every variant is recoverable: the caller may retry with other settings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnhanceError {
    #[error("Nothing to enhance: the prompt is empty")]
    EmptyPrompt,

    #[error("Provider rejected the credentials: {0}")]
    Auth(String),

    #[error("Provider timed out or refused the connection: {0}")]
    Timeout(String),

    #[error("Provider rate limit reached: {0}")]
    RateLimit(String),

    #[error("Provider call failed: {0}")]
    UnknownProvider(String),
}

impl EnhanceError {
    /// Stable name of the failure kind, used in diagnostics and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            EnhanceError::EmptyPrompt => "EmptyPromptError",
            EnhanceError::Auth(_) => "AuthError",
            EnhanceError::Timeout(_) => "TimeoutError",
            EnhanceError::RateLimit(_) => "RateLimitError",
            EnhanceError::UnknownProvider(_) => "UnknownProviderError",
        }
    }

    /// Whether retrying the same request unchanged could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EnhanceError::Timeout(_) | EnhanceError::RateLimit(_))
    }
}

/// Errors from a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid document key '{0}'")]
    InvalidKey(String),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),
}

/// A read or write against a persistence collaborator failed.
///
/// Writers log this and keep their in-memory state.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to read '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to write '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Document '{key}' has an unreadable shape: {message}")]
    Corrupt { key: String, message: String },
}

/// Errors that can occur during lineage operations.
#[derive(Debug, Error)]
pub enum LineageError {
    #[error("Parent entry '{0}' not found or not an original prompt")]
    MissingParent(String),

    #[error("Entry '{0}' not found in prompt history")]
    UnknownEntry(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors that can occur during template operations.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template '{0}' not found")]
    NotFound(String),

    #[error("Template '{0}' has an empty master prompt and cannot be saved")]
    EmptyMasterPrompt(String),

    #[error("Invalid template ID '{0}': must be non-empty and contain only alphanumeric characters, hyphens, and underscores")]
    InvalidTemplateId(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Reasons a preset import document is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportValidationError {
    #[error("Import document is malformed: {0}")]
    Malformed(String),

    #[error("Unsupported preset document version {0}")]
    UnsupportedVersion(u32),

    #[error("Preset #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("Preset #{index} has an empty id")]
    EmptyId { index: usize },

    #[error("Preset #{index} options must be a JSON object")]
    InvalidOptions { index: usize },

    #[error("Preset id '{0}' appears more than once")]
    DuplicateId(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Errors from preset editing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresetError {
    #[error("Preset name must not be empty")]
    EmptyName,

    #[error("Preset '{0}' not found")]
    NotFound(String),
}

/// Errors raised when a facet snapshot crosses a validation boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FacetError {
    #[error("Facet snapshot must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unknown provider '{0}'. Supported: openai, openrouter, anthropic, ollama")]
    UnknownProvider(String),
}
