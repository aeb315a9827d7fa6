//! Template resolution.
//!
//! The effective instructions for an enhancement call come from an ordered
//! list of tiers, highest precedence first:
//!
//! 1. An explicit override supplied by the caller
//! 2. A saved template in the document store
//! 3. The in-memory working copy
//! 4. The built-in text for the id
//!
//! Each tier answers found / not-found; the first non-empty instruction text
//! wins. Provider, model and behavioral flags come from the first tier that
//! carries template metadata. Resolution never fails: a tier that errors is
//! recorded as a diagnostic and skipped.

use std::fmt;
use std::iter;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::enhance::DiagnosticError;
use crate::error::PersistenceError;
use crate::llm::ProviderKind;
use crate::storage::DocumentStore;

use super::registry::{read_template, SharedTemplateRegistry};
use super::{builtin, validate_template_id, Template, TemplateStore};

/// Component name recorded on diagnostics raised here.
const HANDLED_BY: &str = "TemplateResolver";

/// Which tier supplied the effective instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateSource {
    Explicit,
    Database,
    Memory,
    Builtin,
}

impl TemplateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateSource::Explicit => "explicit",
            TemplateSource::Database => "database",
            TemplateSource::Memory => "memory",
            TemplateSource::Builtin => "builtin",
        }
    }
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a tier found for a template id.
#[derive(Debug, Clone, PartialEq)]
pub struct TierMatch {
    /// Instruction text; empty means this tier cannot supply instructions.
    pub instructions: String,
    /// Full template metadata, when the tier has it.
    pub template: Option<Template>,
}

/// One precedence level consulted during resolution.
#[async_trait]
pub trait ResolutionTier: Send + Sync {
    fn source(&self) -> TemplateSource;

    /// Look up an id. `Ok(None)` is "not found"; errors are recorded and skipped.
    async fn lookup(&self, template_id: &str) -> Result<Option<TierMatch>, PersistenceError>;
}

/// Caller-supplied instructions, used verbatim. Blank text counts as absent.
pub struct ExplicitTier {
    instructions: Option<String>,
}

impl ExplicitTier {
    pub fn new(instructions: Option<&str>) -> Self {
        Self {
            instructions: instructions
                .filter(|text| !text.trim().is_empty())
                .map(str::to_string),
        }
    }
}

#[async_trait]
impl ResolutionTier for ExplicitTier {
    fn source(&self) -> TemplateSource {
        TemplateSource::Explicit
    }

    async fn lookup(&self, _template_id: &str) -> Result<Option<TierMatch>, PersistenceError> {
        Ok(self.instructions.clone().map(|instructions| TierMatch {
            instructions,
            template: None,
        }))
    }
}

/// Saved templates in the external document store.
pub struct DocumentStoreTier {
    store: TemplateStore,
    default_provider: ProviderKind,
    default_model: String,
}

impl DocumentStoreTier {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        default_provider: ProviderKind,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            store: TemplateStore::new(store),
            default_provider,
            default_model: default_model.into(),
        }
    }
}

#[async_trait]
impl ResolutionTier for DocumentStoreTier {
    fn source(&self) -> TemplateSource {
        TemplateSource::Database
    }

    async fn lookup(&self, template_id: &str) -> Result<Option<TierMatch>, PersistenceError> {
        if validate_template_id(template_id).is_err() {
            return Ok(None);
        }

        let Some(patch) = self.store.load(template_id).await? else {
            return Ok(None);
        };

        let mut template =
            builtin::template(template_id, self.default_provider, &self.default_model);
        template.apply(&patch);

        Ok(Some(TierMatch {
            instructions: patch.master_prompt.unwrap_or_default(),
            template: Some(template),
        }))
    }
}

/// The session's in-memory working copy.
pub struct MemoryTier {
    registry: SharedTemplateRegistry,
}

impl MemoryTier {
    pub fn new(registry: SharedTemplateRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ResolutionTier for MemoryTier {
    fn source(&self) -> TemplateSource {
        TemplateSource::Memory
    }

    async fn lookup(&self, template_id: &str) -> Result<Option<TierMatch>, PersistenceError> {
        Ok(read_template(&self.registry, template_id).map(|template| TierMatch {
            instructions: template.master_prompt.clone(),
            template: Some(template),
        }))
    }
}

/// Built-in instructions; always found.
pub struct BuiltinTier {
    default_provider: ProviderKind,
    default_model: String,
}

impl BuiltinTier {
    pub fn new(default_provider: ProviderKind, default_model: impl Into<String>) -> Self {
        Self {
            default_provider,
            default_model: default_model.into(),
        }
    }
}

#[async_trait]
impl ResolutionTier for BuiltinTier {
    fn source(&self) -> TemplateSource {
        TemplateSource::Builtin
    }

    async fn lookup(&self, template_id: &str) -> Result<Option<TierMatch>, PersistenceError> {
        Ok(Some(TierMatch {
            instructions: builtin::instructions(template_id).to_string(),
            template: Some(builtin::template(
                template_id,
                self.default_provider,
                &self.default_model,
            )),
        }))
    }
}

/// The effective template for one enhancement call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTemplate {
    /// Effective template; `master_prompt` holds the winning instructions.
    pub template: Template,
    pub source: TemplateSource,
    /// Tier failures that were caught during resolution.
    pub errors: Vec<DiagnosticError>,
}

impl ResolvedTemplate {
    pub fn instructions(&self) -> &str {
        &self.template.master_prompt
    }

    /// Built-in text was used, or a higher tier failed and was skipped.
    pub fn fallback_used(&self) -> bool {
        self.source == TemplateSource::Builtin || !self.errors.is_empty()
    }
}

/// Resolves template ids through the ordered tier list.
pub struct TemplateResolver {
    tiers: Vec<Box<dyn ResolutionTier>>,
    default_provider: ProviderKind,
    default_model: String,
}

impl TemplateResolver {
    /// Standard chain: document store, then memory, then built-in.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: SharedTemplateRegistry,
        default_provider: ProviderKind,
        default_model: impl Into<String>,
    ) -> Self {
        let default_model = default_model.into();
        let tiers: Vec<Box<dyn ResolutionTier>> = vec![
            Box::new(DocumentStoreTier::new(store, default_provider, default_model.clone())),
            Box::new(MemoryTier::new(registry)),
            Box::new(BuiltinTier::new(default_provider, default_model.clone())),
        ];
        Self::with_tiers(tiers, default_provider, default_model)
    }

    /// Custom chain. The explicit-override tier is always consulted first.
    pub fn with_tiers(
        tiers: Vec<Box<dyn ResolutionTier>>,
        default_provider: ProviderKind,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            tiers,
            default_provider,
            default_model: default_model.into(),
        }
    }

    /// Resolve the effective template for an id. Never fails and never
    /// returns empty instructions.
    pub async fn resolve(
        &self,
        template_id: &str,
        override_instructions: Option<&str>,
    ) -> ResolvedTemplate {
        let explicit = ExplicitTier::new(override_instructions);
        let tiers = iter::once(&explicit as &dyn ResolutionTier)
            .chain(self.tiers.iter().map(|tier| tier.as_ref()));

        let mut instructions: Option<(TemplateSource, String)> = None;
        let mut metadata: Option<Template> = None;
        let mut errors = Vec::new();

        for tier in tiers {
            if instructions.is_some() && metadata.is_some() {
                break;
            }

            match tier.lookup(template_id).await {
                Ok(Some(found)) => {
                    if instructions.is_none() && !found.instructions.trim().is_empty() {
                        instructions = Some((tier.source(), found.instructions));
                    }
                    if metadata.is_none() {
                        metadata = found.template;
                    }
                }
                Ok(None) => {
                    debug!(template_id, tier = %tier.source(), "Template tier had no match");
                }
                Err(e) => {
                    warn!(
                        template_id,
                        tier = %tier.source(),
                        error = %e,
                        "Template lookup failed, falling through"
                    );
                    errors.push(DiagnosticError::new(
                        "TemplateLookupError",
                        e.to_string(),
                        HANDLED_BY,
                    ));
                }
            }
        }

        let mut template = metadata.unwrap_or_else(|| {
            builtin::template(template_id, self.default_provider, &self.default_model)
        });
        let (source, text) = instructions.unwrap_or_else(|| {
            (
                TemplateSource::Builtin,
                builtin::instructions(template_id).to_string(),
            )
        });
        template.master_prompt = text;

        debug!(template_id, source = %source, "Resolved template");
        ResolvedTemplate {
            template,
            source,
            errors,
        }
    }
}
