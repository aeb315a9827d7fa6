//! Public facade over the prompt-forge core.
//!
//! [`PromptStudio`] wires the template registry, resolver, orchestrator,
//! lineage store and preset store onto one document store, and exposes the
//! operations a UI layer calls.
//!
//! # Example
//!
//! ```rust,ignore
//! use prompt_forge::config::AppConfig;
//! use prompt_forge::enhance::EnhanceOptions;
//! use prompt_forge::studio::PromptStudio;
//!
//! let studio = PromptStudio::open(AppConfig::load("prompt-forge.yaml")?)?;
//! let result = studio.enhance("a cat on a roof", "standard", EnhanceOptions::new()).await?;
//! println!("{}", result.enhanced_prompt);
//! ```

use std::sync::{Arc, PoisonError};

use serde_json::Value;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::enhance::{
    BusySnapshot, EnhanceFailure, EnhanceOptions, Enhancement, EnhancementOrchestrator,
};
use crate::error::{ImportValidationError, LineageError, LlmError, PresetError, TemplateError};
use crate::facets::FacetSnapshot;
use crate::lineage::{
    DocumentLineagePersistence, LineageGroup, MigrationOutcome, PromptEntry, PromptLineageStore,
};
use crate::llm::ProviderRegistry;
use crate::preset::{Preset, PresetEdit, PresetStore};
use crate::storage::{DocumentStore, FileDocumentStore};
use crate::template::{
    ResolvedTemplate, SharedTemplateRegistry, Template, TemplatePatch, TemplateRegistry,
    TemplateResolver, TemplateStore,
};

pub struct PromptStudio {
    templates: SharedTemplateRegistry,
    template_store: TemplateStore,
    resolver: Arc<TemplateResolver>,
    orchestrator: EnhancementOrchestrator,
    lineage: Arc<PromptLineageStore>,
    presets: PresetStore,
}

impl PromptStudio {
    /// Open a studio persisting under the configured data directory, with a
    /// client for every provider kind.
    pub fn open(config: AppConfig) -> Result<Self, LlmError> {
        let store: Arc<dyn DocumentStore> = Arc::new(FileDocumentStore::new(&config.data_dir));
        let providers = ProviderRegistry::from_config(&config)?;
        info!(data_dir = %config.data_dir.display(), "Opened prompt studio");
        Ok(Self::with_parts(&config, store, providers))
    }

    /// Assemble a studio from explicit collaborators.
    pub fn with_parts(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
        providers: ProviderRegistry,
    ) -> Self {
        let (provider, model) = config.default_target();
        let templates = TemplateRegistry::new(provider, model.clone()).into_shared();
        let resolver = Arc::new(TemplateResolver::new(
            store.clone(),
            templates.clone(),
            provider,
            model,
        ));
        let lineage = Arc::new(PromptLineageStore::new(Arc::new(
            DocumentLineagePersistence::new(store.clone()),
        )));
        let orchestrator =
            EnhancementOrchestrator::new(resolver.clone(), Arc::new(providers), lineage.clone());

        Self {
            templates,
            template_store: TemplateStore::new(store.clone()),
            resolver,
            orchestrator,
            lineage,
            presets: PresetStore::new(store),
        }
    }

    /// Effective template for an id. Never fails, never empty.
    pub async fn resolve_template(
        &self,
        template_id: &str,
        override_instructions: Option<&str>,
    ) -> ResolvedTemplate {
        self.resolver
            .resolve(template_id, override_instructions)
            .await
    }

    /// In-memory working copy for an id.
    pub fn template(&self, template_id: &str) -> Option<Template> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(template_id)
            .cloned()
    }

    /// Every in-memory working copy.
    pub fn list_templates(&self) -> Vec<Template> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .list()
            .to_vec()
    }

    /// Edit the in-memory working copy of a template.
    pub fn update_template(
        &self,
        template_id: &str,
        patch: &TemplatePatch,
    ) -> Result<Template, TemplateError> {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert(template_id, patch)
    }

    /// Persist the working copy of a template to the document store.
    pub async fn save_template(&self, template_id: &str) -> Result<Template, TemplateError> {
        let template = self
            .template(template_id)
            .ok_or_else(|| TemplateError::NotFound(template_id.to_string()))?;
        self.template_store.save(&template).await?;
        Ok(template)
    }

    /// Remove a saved template document. Returns whether one existed.
    pub async fn delete_saved_template(&self, template_id: &str) -> Result<bool, TemplateError> {
        self.template_store.delete(template_id).await
    }

    /// Enhance a prompt and record it in the history.
    pub async fn enhance(
        &self,
        prompt: &str,
        template_id: &str,
        options: EnhanceOptions,
    ) -> Result<Enhancement, EnhanceFailure> {
        self.orchestrator.enhance(prompt, template_id, options).await
    }

    /// Enhance one prompt with several templates at once.
    ///
    /// Results come back in the order of `template_ids`.
    pub async fn enhance_many(
        &self,
        prompt: &str,
        template_ids: &[String],
        options: EnhanceOptions,
    ) -> Vec<(String, Result<Enhancement, EnhanceFailure>)> {
        debug!(templates = template_ids.len(), "Enhancing with several templates");
        let calls = template_ids.iter().map(|template_id| {
            let options = options.clone();
            async move {
                let outcome = self.orchestrator.enhance(prompt, template_id, options).await;
                (template_id.clone(), outcome)
            }
        });
        futures::future::join_all(calls).await
    }

    /// Per-row busy state.
    pub fn busy(&self) -> BusySnapshot {
        self.orchestrator.busy().snapshot()
    }

    pub async fn record_original(
        &self,
        prompt: &str,
        options: FacetSnapshot,
        template_used: &str,
    ) -> PromptEntry {
        self.lineage.add_original(prompt, options, template_used).await
    }

    pub async fn record_enhanced(
        &self,
        parent_id: &str,
        enhanced_prompt: &str,
        template_used: &str,
    ) -> Result<PromptEntry, LineageError> {
        self.lineage
            .try_add_enhanced(parent_id, enhanced_prompt, template_used)
            .await
    }

    /// Every history entry, newest first.
    pub async fn list_history(&self) -> Vec<PromptEntry> {
        self.lineage.get_all().await
    }

    pub async fn grouped_history(&self) -> Vec<LineageGroup> {
        self.lineage.grouped().await
    }

    pub async fn selected_history(&self) -> Vec<PromptEntry> {
        self.lineage.selected().await
    }

    pub async fn select_entry(
        &self,
        id: &str,
        explicit: Option<bool>,
    ) -> Result<PromptEntry, LineageError> {
        self.lineage.toggle_selection(id, explicit).await
    }

    pub async fn clear_history(&self) {
        self.lineage.clear_all().await
    }

    /// Convert the legacy flat history, once.
    pub async fn migrate_history(&self) -> Result<MigrationOutcome, LineageError> {
        self.lineage.migrate_legacy().await
    }

    /// Retry any history or preset writes that failed earlier.
    pub async fn flush(&self) -> Result<(), LineageError> {
        self.lineage.flush().await?;
        self.presets.flush().await?;
        Ok(())
    }

    pub async fn save_preset(
        &self,
        name: &str,
        description: Option<&str>,
        options: FacetSnapshot,
        favorite: bool,
    ) -> Result<Preset, PresetError> {
        self.presets.save(name, description, options, favorite).await
    }

    pub async fn edit_preset(&self, id: &str, edit: PresetEdit) -> Result<Preset, PresetError> {
        self.presets.edit(id, edit).await
    }

    pub async fn delete_preset(&self, id: &str) -> bool {
        self.presets.delete(id).await
    }

    pub async fn toggle_favorite(&self, id: &str) -> bool {
        self.presets.toggle_favorite(id).await
    }

    pub async fn get_preset(&self, id: &str) -> Option<Preset> {
        self.presets.get(id).await
    }

    pub async fn list_presets(&self) -> Vec<Preset> {
        self.presets.list().await
    }

    pub async fn export_presets(&self) -> Value {
        self.presets.export_all().await
    }

    /// Merge an exported preset document. `false` means it was rejected and
    /// nothing changed.
    pub async fn import_presets(&self, document: &Value) -> bool {
        self.presets.import_all(document).await
    }

    pub async fn try_import_presets(
        &self,
        document: &Value,
    ) -> Result<usize, ImportValidationError> {
        self.presets.try_import_all(document).await
    }
}
