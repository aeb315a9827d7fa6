//! Enhancement templates.
//!
//! A template is a named bundle of enhancement instructions plus the
//! provider/model/behavioral defaults used when dispatching them. This module
//! provides:
//! - Built-in instruction texts for every known id ([`builtin`])
//! - The in-memory working copy edited during a session ([`TemplateRegistry`])
//! - Saved templates in the external document store ([`TemplateStore`])
//! - Precedence-ordered resolution of the effective instructions ([`TemplateResolver`])

pub mod builtin;
pub mod registry;
pub mod resolver;
pub mod store;

pub use registry::{SharedTemplateRegistry, TemplateRegistry};
pub use resolver::{
    BuiltinTier, DocumentStoreTier, ExplicitTier, MemoryTier, ResolutionTier, ResolvedTemplate,
    TemplateResolver, TemplateSource, TierMatch,
};
pub use store::TemplateStore;

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::llm::ProviderKind;

/// Lowest accepted compression level.
pub const MIN_COMPRESSION_LEVEL: u8 = 1;

/// Highest accepted compression level.
pub const MAX_COMPRESSION_LEVEL: u8 = 10;

/// An enhancement template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    /// Enhancement instructions sent to the model. Never persisted empty.
    pub master_prompt: String,
    /// Optional output shape the model should follow.
    #[serde(default)]
    pub format_template: String,
    /// Optional extra rules appended to the instructions.
    #[serde(default)]
    pub usage_rules: String,
    pub provider: ProviderKind,
    pub model: String,
    /// Allow conversational filler around the enhanced prompt.
    #[serde(default)]
    pub use_happy_talk: bool,
    #[serde(default)]
    pub compress_prompt: bool,
    /// Compression strength, 1 (light) to 10 (aggressive).
    #[serde(default = "default_compression_level")]
    pub compression_level: u8,
}

fn default_compression_level() -> u8 {
    builtin::DEFAULT_COMPRESSION_LEVEL
}

impl Template {
    /// Merge a partial update into this template.
    ///
    /// The id never changes. The compression level is clamped into range.
    pub fn apply(&mut self, patch: &TemplatePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(master_prompt) = &patch.master_prompt {
            self.master_prompt = master_prompt.clone();
        }
        if let Some(format_template) = &patch.format_template {
            self.format_template = format_template.clone();
        }
        if let Some(usage_rules) = &patch.usage_rules {
            self.usage_rules = usage_rules.clone();
        }
        if let Some(provider) = patch.provider {
            self.provider = provider;
        }
        if let Some(model) = &patch.model {
            self.model = model.clone();
        }
        if let Some(use_happy_talk) = patch.use_happy_talk {
            self.use_happy_talk = use_happy_talk;
        }
        if let Some(compress_prompt) = patch.compress_prompt {
            self.compress_prompt = compress_prompt;
        }
        if let Some(level) = patch.compression_level {
            self.compression_level = clamp_compression_level(level);
        }
    }

    /// Whether the template carries usable instructions.
    pub fn has_instructions(&self) -> bool {
        !self.master_prompt.trim().is_empty()
    }
}

/// A partial template: every field optional.
///
/// Used both for in-memory edits and as the shape of saved template documents,
/// which may omit any field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_rules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_happy_talk: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress_prompt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<i64>,
}

impl TemplatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_master_prompt(mut self, master_prompt: impl Into<String>) -> Self {
        self.master_prompt = Some(master_prompt.into());
        self
    }

    pub fn with_format_template(mut self, format_template: impl Into<String>) -> Self {
        self.format_template = Some(format_template.into());
        self
    }

    pub fn with_usage_rules(mut self, usage_rules: impl Into<String>) -> Self {
        self.usage_rules = Some(usage_rules.into());
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_use_happy_talk(mut self, enabled: bool) -> Self {
        self.use_happy_talk = Some(enabled);
        self
    }

    pub fn with_compression(mut self, enabled: bool, level: i64) -> Self {
        self.compress_prompt = Some(enabled);
        self.compression_level = Some(level);
        self
    }

    /// Patch that reproduces every field of a template.
    pub fn from_template(template: &Template) -> Self {
        Self {
            name: Some(template.name.clone()),
            master_prompt: Some(template.master_prompt.clone()),
            format_template: Some(template.format_template.clone()),
            usage_rules: Some(template.usage_rules.clone()),
            provider: Some(template.provider),
            model: Some(template.model.clone()),
            use_happy_talk: Some(template.use_happy_talk),
            compress_prompt: Some(template.compress_prompt),
            compression_level: Some(i64::from(template.compression_level)),
        }
    }
}

/// Clamp a compression level into `1..=10`.
pub fn clamp_compression_level(level: i64) -> u8 {
    level.clamp(
        i64::from(MIN_COMPRESSION_LEVEL),
        i64::from(MAX_COMPRESSION_LEVEL),
    ) as u8
}

/// Validate a template id: non-empty, ASCII alphanumerics, `-` and `_` only.
pub fn validate_template_id(template_id: &str) -> Result<(), TemplateError> {
    let valid = !template_id.is_empty()
        && template_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(TemplateError::InvalidTemplateId(template_id.to_string()))
    }
}
