//! Saved facet presets.
//!
//! A preset is a named facet snapshot the user can re-apply later. Presets
//! live in the document store under [`keys::PRESETS`] and can be exported to,
//! or merged back from, a checksummed JSON document ([`document`]).

pub mod document;

pub use document::{PresetDocument, PRESET_DOCUMENT_VERSION};

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ImportValidationError, PersistenceError, PresetError};
use crate::facets::FacetSnapshot;
use crate::storage::{keys, DocumentStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub options: FacetSnapshot,
}

/// Partial preset edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetEdit {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub options: Option<FacetSnapshot>,
}

impl PresetEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_options(mut self, options: FacetSnapshot) -> Self {
        self.options = Some(options);
        self
    }
}

#[derive(Debug, Default)]
struct PresetState {
    presets: Vec<Preset>,
    loaded: bool,
    dirty: bool,
}

/// Collection of saved presets backed by a document store.
///
/// Mutations persist immediately; a failed write is logged and the in-memory
/// collection kept, to be written by the next successful mutation or
/// [`Self::flush`].
pub struct PresetStore {
    store: Arc<dyn DocumentStore>,
    state: Mutex<PresetState>,
}

impl PresetStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            state: Mutex::new(PresetState::default()),
        }
    }

    /// Save a new preset under a fresh id.
    pub async fn save(
        &self,
        name: &str,
        description: Option<&str>,
        options: FacetSnapshot,
        favorite: bool,
    ) -> Result<Preset, PresetError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PresetError::EmptyName);
        }

        let preset = Preset {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            favorite,
            options,
        };

        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;
        state.presets.push(preset.clone());
        debug!(preset_id = %preset.id, name = %preset.name, "Saved preset");

        self.persist(&mut state).await;
        Ok(preset)
    }

    /// Apply a partial edit to an existing preset.
    pub async fn edit(&self, id: &str, edit: PresetEdit) -> Result<Preset, PresetError> {
        if let Some(name) = &edit.name {
            if name.trim().is_empty() {
                return Err(PresetError::EmptyName);
            }
        }

        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;

        let preset = state
            .presets
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| PresetError::NotFound(id.to_string()))?;
        if let Some(name) = edit.name {
            preset.name = name.trim().to_string();
        }
        if let Some(description) = edit.description {
            preset.description = description;
        }
        if let Some(options) = edit.options {
            preset.options = options;
        }
        let updated = preset.clone();

        self.persist(&mut state).await;
        Ok(updated)
    }

    /// Remove a preset. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;

        let before = state.presets.len();
        state.presets.retain(|p| p.id != id);
        if state.presets.len() == before {
            return false;
        }

        debug!(preset_id = id, "Deleted preset");
        self.persist(&mut state).await;
        true
    }

    /// Flip the favorite flag. Returns whether the preset was found.
    pub async fn toggle_favorite(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;

        let Some(preset) = state.presets.iter_mut().find(|p| p.id == id) else {
            return false;
        };
        preset.favorite = !preset.favorite;

        self.persist(&mut state).await;
        true
    }

    pub async fn get(&self, id: &str) -> Option<Preset> {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;
        state.presets.iter().find(|p| p.id == id).cloned()
    }

    /// Every preset: favorites first, then by name ignoring case.
    pub async fn list(&self) -> Vec<Preset> {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;

        let mut presets = state.presets.clone();
        presets.sort_by(|a, b| {
            b.favorite
                .cmp(&a.favorite)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        presets
    }

    pub async fn len(&self) -> usize {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;
        state.presets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Export every preset as a versioned, checksummed document.
    pub async fn export_all(&self) -> Value {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;

        let document = PresetDocument::new(state.presets.clone());
        info!(presets = document.presets.len(), "Exported presets");
        serde_json::to_value(&document).unwrap_or(Value::Null)
    }

    /// Validate and merge an import document.
    ///
    /// Presets are merged by id: a matching id is replaced, a new id appended.
    /// A document that fails validation changes nothing.
    pub async fn try_import_all(&self, document: &Value) -> Result<usize, ImportValidationError> {
        let incoming = document::parse(document)?;

        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;

        let imported = incoming.len();
        for preset in incoming {
            match state.presets.iter_mut().find(|p| p.id == preset.id) {
                Some(existing) => *existing = preset,
                None => state.presets.push(preset),
            }
        }
        info!(imported, total = state.presets.len(), "Imported presets");

        self.persist(&mut state).await;
        Ok(imported)
    }

    /// Validate and merge an import document, reporting only success.
    pub async fn import_all(&self, document: &Value) -> bool {
        match self.try_import_all(document).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Preset import rejected");
                false
            }
        }
    }

    /// Write the collection if it is ahead of the stored copy.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        if !state.dirty {
            return Ok(());
        }
        self.write(&state.presets).await?;
        state.dirty = false;
        Ok(())
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    async fn ensure_loaded(&self, state: &mut PresetState) -> Result<(), PersistenceError> {
        if state.loaded {
            return Ok(());
        }

        match self.read().await {
            Ok(stored) => {
                let pending = std::mem::take(&mut state.presets);
                state.dirty = !pending.is_empty();

                let pending_ids: HashSet<String> = pending.iter().map(|p| p.id.clone()).collect();
                state.presets = stored
                    .into_iter()
                    .filter(|s| !pending_ids.contains(&s.id))
                    .chain(pending)
                    .collect();
                state.loaded = true;
                debug!(presets = state.presets.len(), "Loaded presets");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Presets unavailable, working in memory");
                Err(e)
            }
        }
    }

    async fn read(&self) -> Result<Vec<Preset>, PersistenceError> {
        let key = keys::PRESETS;
        let Some(document) = self
            .store
            .get(key)
            .await
            .map_err(|source| PersistenceError::Read {
                key: key.to_string(),
                source,
            })?
        else {
            return Ok(Vec::new());
        };

        serde_json::from_value(document).map_err(|e| PersistenceError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    async fn write(&self, presets: &[Preset]) -> Result<(), PersistenceError> {
        let key = keys::PRESETS;
        let document = serde_json::to_value(presets).map_err(|e| PersistenceError::Write {
            key: key.to_string(),
            source: e.into(),
        })?;
        self.store
            .put(key, document)
            .await
            .map_err(|source| PersistenceError::Write {
                key: key.to_string(),
                source,
            })
    }

    async fn persist(&self, state: &mut PresetState) {
        if !state.loaded {
            state.dirty = true;
            return;
        }

        match self.write(&state.presets).await {
            Ok(()) => state.dirty = false,
            Err(e) => {
                warn!(error = %e, "Failed to persist presets, keeping in-memory state");
                state.dirty = true;
            }
        }
    }
}
