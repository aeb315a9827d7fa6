//! Per-call enhancement diagnostics.
//!
//! Diagnostics are ephemeral: they travel with one enhancement result (or
//! failure) and are never written to the lineage store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::ProviderKind;
use crate::template::{ResolvedTemplate, TemplateSource};

/// One handled failure observed while serving a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    /// Component that caught the failure.
    pub handled_by: String,
}

impl DiagnosticError {
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        handled_by: impl Into<String>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            handled_by: handled_by.into(),
        }
    }
}

/// Behavioral parameters the call was made with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmParams {
    pub use_happy_talk: bool,
    pub compress_prompt: bool,
    pub compression_level: u8,
    pub master_prompt_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementDiagnostics {
    pub provider: ProviderKind,
    pub model: String,
    pub template_source: TemplateSource,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: u64,
    pub fallback_used: bool,
    pub llm_params: LlmParams,
    pub errors: Vec<DiagnosticError>,
}

impl EnhancementDiagnostics {
    /// Start diagnostics for a call about to be made with `resolved`.
    pub fn for_resolved(resolved: &ResolvedTemplate) -> Self {
        let template = &resolved.template;
        Self {
            provider: template.provider,
            model: template.model.clone(),
            template_source: resolved.source,
            timestamp: Utc::now(),
            response_time_ms: 0,
            fallback_used: resolved.fallback_used(),
            llm_params: LlmParams {
                use_happy_talk: template.use_happy_talk,
                compress_prompt: template.compress_prompt,
                compression_level: template.compression_level,
                master_prompt_length: template.master_prompt.chars().count(),
                token_count: None,
            },
            errors: resolved.errors.clone(),
        }
    }

    pub fn push_error(&mut self, error: DiagnosticError) {
        self.errors.push(error);
    }
}

/// Rough token estimate for text when the provider reports none.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::builtin;

    fn resolved(source: TemplateSource, errors: Vec<DiagnosticError>) -> ResolvedTemplate {
        ResolvedTemplate {
            template: builtin::template("narrative", ProviderKind::Anthropic, "claude-x"),
            source,
            errors,
        }
    }

    #[test]
    fn test_for_resolved() {
        let diagnostics = EnhancementDiagnostics::for_resolved(&resolved(TemplateSource::Memory, vec![]));

        assert_eq!(diagnostics.provider, ProviderKind::Anthropic);
        assert_eq!(diagnostics.model, "claude-x");
        assert_eq!(diagnostics.template_source, TemplateSource::Memory);
        assert!(!diagnostics.fallback_used);
        assert_eq!(
            diagnostics.llm_params.master_prompt_length,
            builtin::instructions("narrative").chars().count()
        );
        assert!(diagnostics.errors.is_empty());
    }

    #[test]
    fn test_fallback_when_lookup_failed() {
        let error = DiagnosticError::new("PersistenceError", "quota", "TemplateResolver");
        let diagnostics =
            EnhancementDiagnostics::for_resolved(&resolved(TemplateSource::Memory, vec![error.clone()]));
        assert!(diagnostics.fallback_used);
        assert_eq!(diagnostics.errors, vec![error]);
    }

    #[test]
    fn test_serialized_shape() {
        let mut diagnostics =
            EnhancementDiagnostics::for_resolved(&resolved(TemplateSource::Builtin, vec![]));
        diagnostics.push_error(DiagnosticError::new("AuthError", "bad key", "EnhancementOrchestrator"));

        let json = serde_json::to_value(&diagnostics).expect("serialize");
        assert_eq!(json["templateSource"], "builtin");
        assert_eq!(json["fallbackUsed"], true);
        assert_eq!(json["llmParams"]["compressionLevel"], 5);
        assert!(json["llmParams"].get("tokenCount").is_none());
        assert_eq!(json["errors"][0]["type"], "AuthError");
        assert_eq!(json["errors"][0]["handledBy"], "EnhancementOrchestrator");
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
