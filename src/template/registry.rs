//! In-memory template working copy.

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::TemplateError;
use crate::llm::ProviderKind;

use super::{builtin, validate_template_id, Template, TemplatePatch};

/// Registry shared between the resolver and the editing surface.
pub type SharedTemplateRegistry = Arc<RwLock<TemplateRegistry>>;

/// Session-lived catalog of templates, seeded from the built-ins.
///
/// Edits only touch this in-memory copy; saving to the document store is the
/// job of [`super::TemplateStore`].
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
    default_provider: ProviderKind,
    default_model: String,
}

impl TemplateRegistry {
    /// Create a registry seeded with every built-in template.
    pub fn new(default_provider: ProviderKind, default_model: impl Into<String>) -> Self {
        let default_model = default_model.into();
        let templates = builtin::BUILTIN_IDS
            .iter()
            .map(|id| builtin::template(id, default_provider, &default_model))
            .collect();

        Self {
            templates,
            default_provider,
            default_model,
        }
    }

    /// Create a registry with no working copies.
    pub fn empty(default_provider: ProviderKind, default_model: impl Into<String>) -> Self {
        Self {
            templates: Vec::new(),
            default_provider,
            default_model: default_model.into(),
        }
    }

    /// Wrap the registry for sharing.
    pub fn into_shared(self) -> SharedTemplateRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Built-in instruction text for an id; never empty.
    pub fn builtin_instructions(&self, template_id: &str) -> &'static str {
        builtin::instructions(template_id)
    }

    /// The working copy for an id, if present.
    pub fn get(&self, template_id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == template_id)
    }

    /// Merge partial fields into the working copy, creating it from the
    /// built-in defaults if absent.
    pub fn upsert(
        &mut self,
        template_id: &str,
        patch: &TemplatePatch,
    ) -> Result<Template, TemplateError> {
        validate_template_id(template_id)?;

        if let Some(existing) = self.templates.iter_mut().find(|t| t.id == template_id) {
            existing.apply(patch);
            tracing::debug!(template_id, "Updated template working copy");
            return Ok(existing.clone());
        }

        let mut template =
            builtin::template(template_id, self.default_provider, &self.default_model);
        template.apply(patch);
        self.templates.push(template.clone());
        tracing::debug!(template_id, "Created template working copy");
        Ok(template)
    }

    /// All working copies, in stable display order.
    pub fn list(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.default_provider
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

/// Read a working copy out of a shared registry.
pub(crate) fn read_template(
    registry: &SharedTemplateRegistry,
    template_id: &str,
) -> Option<Template> {
    registry
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(template_id)
        .cloned()
}
