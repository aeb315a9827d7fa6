//! prompt-forge: enhancement templates, LLM dispatch and prompt lineage for
//! image-generation prompts.
//!
//! The library resolves which enhancement instructions apply to a template
//! id, sends a prompt to the configured LLM provider, and keeps an
//! append-only history linking every enhanced prompt to its original. Named
//! facet presets can be saved, exported and imported alongside.
//!
//! [`studio::PromptStudio`] is the entry point for most callers.

pub mod cli;
pub mod config;
pub mod enhance;
pub mod error;
pub mod facets;
pub mod lineage;
pub mod llm;
pub mod metrics;
pub mod preset;
pub mod storage;
pub mod studio;
pub mod template;

pub use config::AppConfig;
pub use error::{
    EnhanceError, ImportValidationError, LineageError, LlmError, PersistenceError, PresetError,
    TemplateError,
};
pub use studio::PromptStudio;
