//! LLM provider implementations.
//!
//! Each client implements [`LlmProvider`]; the [`super::ProviderRegistry`]
//! maps a [`super::ProviderKind`] to one of them.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiCompatibleProvider;

pub use super::types::LlmProvider;
