//! Lineage persistence collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PersistenceError;
use crate::storage::{keys, DocumentStore};

use super::entry::{LegacyEntry, PromptEntry};

/// Current lineage document version.
pub const LINEAGE_DOCUMENT_VERSION: u32 = 2;

/// Whole-sequence storage for prompt history, plus the legacy source.
#[async_trait]
pub trait LineagePersistence: Send + Sync {
    /// Load the stored sequence; absent is empty.
    async fn load(&self) -> Result<Vec<PromptEntry>, PersistenceError>;

    /// Replace the stored sequence.
    async fn save(&self, entries: &[PromptEntry]) -> Result<(), PersistenceError>;

    /// Load the pre-lineage flat history; absent is empty.
    async fn load_legacy(&self) -> Result<Vec<LegacyEntry>, PersistenceError>;

    /// Remove the legacy source, marking migration complete.
    async fn clear_legacy(&self) -> Result<(), PersistenceError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct LineageDocument {
    version: u32,
    entries: Vec<PromptEntry>,
}

/// Lineage persistence over a [`DocumentStore`].
///
/// History lives under `lineage/history` as `{"version": 2, "entries": [...]}`;
/// a bare array (version 1) is accepted on read. The legacy source is a bare
/// array under `lineage/legacy`.
pub struct DocumentLineagePersistence {
    store: Arc<dyn DocumentStore>,
}

impl DocumentLineagePersistence {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn read(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        self.store
            .get(key)
            .await
            .map_err(|source| PersistenceError::Read {
                key: key.to_string(),
                source,
            })
    }
}

fn corrupt(key: &str, message: impl ToString) -> PersistenceError {
    PersistenceError::Corrupt {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl LineagePersistence for DocumentLineagePersistence {
    async fn load(&self) -> Result<Vec<PromptEntry>, PersistenceError> {
        let key = keys::LINEAGE_HISTORY;
        match self.read(key).await? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(array @ Value::Array(_)) => {
                serde_json::from_value(array).map_err(|e| corrupt(key, e))
            }
            Some(document) => {
                let document: LineageDocument =
                    serde_json::from_value(document).map_err(|e| corrupt(key, e))?;
                if document.version > LINEAGE_DOCUMENT_VERSION {
                    return Err(corrupt(
                        key,
                        format!("unsupported lineage document version {}", document.version),
                    ));
                }
                Ok(document.entries)
            }
        }
    }

    async fn save(&self, entries: &[PromptEntry]) -> Result<(), PersistenceError> {
        let key = keys::LINEAGE_HISTORY;
        let document = serde_json::json!({
            "version": LINEAGE_DOCUMENT_VERSION,
            "entries": entries,
        });
        self.store
            .put(key, document)
            .await
            .map_err(|source| PersistenceError::Write {
                key: key.to_string(),
                source,
            })
    }

    async fn load_legacy(&self) -> Result<Vec<LegacyEntry>, PersistenceError> {
        let key = keys::LINEAGE_LEGACY;
        match self.read(key).await? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(document) => serde_json::from_value(document).map_err(|e| corrupt(key, e)),
        }
    }

    async fn clear_legacy(&self) -> Result<(), PersistenceError> {
        let key = keys::LINEAGE_LEGACY;
        self.store
            .delete(key)
            .await
            .map(|_| ())
            .map_err(|source| PersistenceError::Write {
                key: key.to_string(),
                source,
            })
    }
}
