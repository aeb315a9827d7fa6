//! One enhancement call, end to end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{EnhanceError, LlmError};
use crate::facets::FacetSnapshot;
use crate::lineage::{PromptEntry, PromptLineageStore};
use crate::llm::{GenerationRequest, ProviderRegistry};
use crate::metrics::{MetricsCollector, OUTCOME_SUCCESS};
use crate::template::{ResolvedTemplate, TemplateResolver};

use super::busy::{BusyTracker, TemplateRow};
use super::classify::classify;
use super::compose;
use super::diagnostics::{estimate_tokens, DiagnosticError, EnhancementDiagnostics};

/// Component name recorded on diagnostics raised here.
const HANDLED_BY: &str = "EnhancementOrchestrator";

/// Caller-supplied options for one enhancement.
#[derive(Debug, Clone, Default)]
pub struct EnhanceOptions {
    /// Facet selections that produced the prompt; stored with the lineage entries.
    pub facets: FacetSnapshot,
    /// Instructions to use verbatim instead of resolving the template.
    pub override_instructions: Option<String>,
    /// Credential for this call only.
    pub api_key: Option<String>,
}

impl EnhanceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_facets(mut self, facets: FacetSnapshot) -> Self {
        self.facets = facets;
        self
    }

    pub fn with_override_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.override_instructions = Some(instructions.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// A successful enhancement.
#[derive(Debug, Clone)]
pub struct Enhancement {
    /// Non-empty transformed prompt.
    pub enhanced_prompt: String,
    pub diagnostics: EnhancementDiagnostics,
    /// Lineage record of the input prompt, when recorded.
    pub original_entry: Option<PromptEntry>,
    /// Lineage record of the enhancement, when recorded.
    pub enhanced_entry: Option<PromptEntry>,
}

/// A classified enhancement failure.
///
/// Diagnostics are absent only when the call was rejected before any I/O.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct EnhanceFailure {
    #[source]
    pub error: EnhanceError,
    pub diagnostics: Option<EnhancementDiagnostics>,
}

impl EnhanceFailure {
    fn rejected(error: EnhanceError) -> Self {
        Self {
            error,
            diagnostics: None,
        }
    }
}

/// Sends prompts to providers and records the results.
pub struct EnhancementOrchestrator {
    resolver: Arc<TemplateResolver>,
    providers: Arc<ProviderRegistry>,
    lineage: Arc<PromptLineageStore>,
    busy: BusyTracker,
    metrics: MetricsCollector,
    temperature: Option<f64>,
}

impl EnhancementOrchestrator {
    pub fn new(
        resolver: Arc<TemplateResolver>,
        providers: Arc<ProviderRegistry>,
        lineage: Arc<PromptLineageStore>,
    ) -> Self {
        Self {
            resolver,
            providers,
            lineage,
            busy: BusyTracker::new(),
            metrics: MetricsCollector::new(),
            temperature: None,
        }
    }

    /// Sampling temperature sent with every request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Share a busy tracker with another component.
    pub fn with_busy_tracker(mut self, busy: BusyTracker) -> Self {
        self.busy = busy;
        self
    }

    pub fn busy(&self) -> &BusyTracker {
        &self.busy
    }

    /// Enhance a prompt with a template.
    ///
    /// An empty prompt is rejected before any I/O. On success the original
    /// and the enhanced prompt are appended to the lineage store; on failure
    /// nothing is recorded. The template's row is busy for the duration of
    /// the call.
    pub async fn enhance(
        &self,
        prompt: &str,
        template_id: &str,
        options: EnhanceOptions,
    ) -> Result<Enhancement, EnhanceFailure> {
        if prompt.trim().is_empty() {
            debug!(template_id, "Rejected empty prompt");
            return Err(EnhanceFailure::rejected(EnhanceError::EmptyPrompt));
        }

        let _busy = self.busy.begin(TemplateRow::for_template(template_id));

        let resolved = self
            .resolver
            .resolve(template_id, options.override_instructions.as_deref())
            .await;

        let (enhanced_prompt, mut diagnostics) = self
            .enhance_resolved(prompt, &resolved, options.api_key)
            .await?;

        let original = self
            .lineage
            .add_original(prompt.trim(), options.facets, template_id)
            .await;
        let enhanced = match self
            .lineage
            .try_add_enhanced(&original.id, &enhanced_prompt, template_id)
            .await
        {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(template_id, error = %e, "Enhancement not linked in history");
                diagnostics.push_error(DiagnosticError::new(
                    "LineageIntegrityError",
                    e.to_string(),
                    "PromptLineageStore",
                ));
                None
            }
        };

        Ok(Enhancement {
            enhanced_prompt,
            diagnostics,
            original_entry: Some(original),
            enhanced_entry: enhanced,
        })
    }

    /// Call the provider for an already-resolved template.
    ///
    /// Does not touch busy state or the lineage store.
    pub async fn enhance_resolved(
        &self,
        prompt: &str,
        resolved: &ResolvedTemplate,
        api_key: Option<String>,
    ) -> Result<(String, EnhancementDiagnostics), EnhanceFailure> {
        if prompt.trim().is_empty() {
            return Err(EnhanceFailure::rejected(EnhanceError::EmptyPrompt));
        }

        let template = &resolved.template;
        let diagnostics = EnhancementDiagnostics::for_resolved(resolved);

        let provider = match self.providers.get(template.provider) {
            Ok(provider) => provider,
            Err(e) => return Err(self.fail(&e, diagnostics, Duration::ZERO)),
        };

        let mut request = GenerationRequest::new(
            template.model.clone(),
            compose::messages(template, prompt),
        )
        .with_api_key(api_key);
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        debug!(
            template_id = %template.id,
            provider = %template.provider,
            model = %template.model,
            source = %resolved.source,
            "Dispatching enhancement"
        );

        let started = Instant::now();
        let outcome = provider.generate(request).await;
        let elapsed = started.elapsed();

        let response = match outcome {
            Ok(response) => response,
            Err(e) => return Err(self.fail(&e, diagnostics, elapsed)),
        };

        let enhanced = compose::clean_output(
            response.first_content().unwrap_or_default(),
            template.use_happy_talk,
        );
        if enhanced.is_empty() {
            return Err(self.fail(&LlmError::EmptyResponse, diagnostics, elapsed));
        }

        let token_count = if response.usage.total_tokens > 0 {
            response.usage.total_tokens
        } else {
            estimate_tokens(&template.master_prompt)
        };

        let mut diagnostics = diagnostics;
        diagnostics.response_time_ms = millis(elapsed);
        diagnostics.llm_params.token_count = Some(token_count);

        self.metrics.record_enhancement(
            template.provider.as_str(),
            OUTCOME_SUCCESS,
            elapsed.as_secs_f64(),
            u64::from(token_count),
        );
        info!(
            template_id = %template.id,
            provider = %template.provider,
            response_time_ms = diagnostics.response_time_ms,
            token_count,
            "Enhancement complete"
        );

        Ok((enhanced, diagnostics))
    }

    fn fail(
        &self,
        error: &LlmError,
        mut diagnostics: EnhancementDiagnostics,
        elapsed: Duration,
    ) -> EnhanceFailure {
        let classified = classify(error);
        diagnostics.response_time_ms = millis(elapsed);
        diagnostics.push_error(DiagnosticError::new(
            classified.kind(),
            error.to_string(),
            HANDLED_BY,
        ));

        self.metrics.record_enhancement(
            diagnostics.provider.as_str(),
            classified.kind(),
            elapsed.as_secs_f64(),
            0,
        );
        warn!(
            provider = %diagnostics.provider,
            kind = classified.kind(),
            error = %error,
            "Enhancement failed"
        );

        EnhanceFailure {
            error: classified,
            diagnostics: Some(diagnostics),
        }
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
