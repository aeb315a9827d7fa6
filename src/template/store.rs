//! Saved templates in the external document store.

use std::sync::Arc;

use crate::error::{PersistenceError, TemplateError};
use crate::storage::{keys, DocumentStore};

use super::{validate_template_id, Template, TemplatePatch};

/// Reads and writes template documents under `templates/<id>`.
#[derive(Clone)]
pub struct TemplateStore {
    store: Arc<dyn DocumentStore>,
}

impl TemplateStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Load the saved document for an id.
    ///
    /// Absent is `Ok(None)`. A document that is not a template shape is
    /// [`PersistenceError::Corrupt`].
    pub async fn load(&self, template_id: &str) -> Result<Option<TemplatePatch>, PersistenceError> {
        let key = keys::template(template_id);
        let Some(document) = self
            .store
            .get(&key)
            .await
            .map_err(|source| PersistenceError::Read {
                key: key.clone(),
                source,
            })?
        else {
            return Ok(None);
        };

        if !document.is_object() {
            return Err(PersistenceError::Corrupt {
                key,
                message: "template document must be a JSON object".to_string(),
            });
        }

        serde_json::from_value(document)
            .map(Some)
            .map_err(|e| PersistenceError::Corrupt {
                key,
                message: e.to_string(),
            })
    }

    /// Save a template. Templates with empty instructions are refused.
    pub async fn save(&self, template: &Template) -> Result<(), TemplateError> {
        validate_template_id(&template.id)?;
        if !template.has_instructions() {
            return Err(TemplateError::EmptyMasterPrompt(template.id.clone()));
        }

        let key = keys::template(&template.id);
        let document =
            serde_json::to_value(TemplatePatch::from_template(template)).map_err(|e| {
                PersistenceError::Write {
                    key: key.clone(),
                    source: e.into(),
                }
            })?;

        self.store
            .put(&key, document)
            .await
            .map_err(|source| PersistenceError::Write { key, source })?;

        tracing::info!(template_id = %template.id, "Saved template");
        Ok(())
    }

    /// Remove a saved template. Returns whether one existed.
    pub async fn delete(&self, template_id: &str) -> Result<bool, TemplateError> {
        validate_template_id(template_id)?;
        let key = keys::template(template_id);
        let removed = self
            .store
            .delete(&key)
            .await
            .map_err(|source| PersistenceError::Write { key, source })?;
        Ok(removed)
    }
}
