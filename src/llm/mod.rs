//! LLM integration for prompt-forge.
//!
//! Providers are request/response black boxes behind the [`LlmProvider`]
//! trait. The enhancement orchestrator picks one through the
//! [`ProviderRegistry`] by [`ProviderKind`].
//!
//! ```ignore
//! use prompt_forge::llm::{GenerationRequest, Message, ProviderKind, ProviderRegistry};
//!
//! let registry = ProviderRegistry::from_config(&config)?;
//! let provider = registry.get(ProviderKind::OpenRouter)?;
//! let response = provider
//!     .generate(GenerationRequest::new("", vec![Message::user("a cat")]))
//!     .await?;
//! ```

pub mod providers;
pub mod registry;
pub mod types;

pub use providers::{AnthropicProvider, OpenAiCompatibleProvider};
pub use registry::ProviderRegistry;
pub use types::{
    Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, ProviderKind, Usage,
};
