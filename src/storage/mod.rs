//! Document storage collaborators.
//!
//! The core treats persistence as a key → JSON document service with no
//! transactional guarantees beyond "last successful write wins". Two backends
//! are provided:
//! - **MemoryDocumentStore**: process-local map, used by tests and ephemeral sessions
//! - **FileDocumentStore**: one JSON file per key under a root directory
//!
//! # Usage
//!
//! ```rust,ignore
//! use prompt_forge::storage::{keys, DocumentStore, FileDocumentStore};
//!
//! let store = FileDocumentStore::new("/var/lib/prompt-forge");
//! store.put(&keys::template("standard"), serde_json::json!({"masterPrompt": "..."})).await?;
//! let doc = store.get(&keys::template("standard")).await?;
//! ```

pub mod file;
pub mod memory;

pub use file::FileDocumentStore;
pub use memory::MemoryDocumentStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Key layout shared by every component that writes to a document store.
pub mod keys {
    /// Full newest-first prompt history document.
    pub const LINEAGE_HISTORY: &str = "lineage/history";
    /// Flat pre-lineage history, migrated once and then cleared.
    pub const LINEAGE_LEGACY: &str = "lineage/legacy";
    /// Saved preset collection.
    pub const PRESETS: &str = "presets/collection";

    /// Key of a saved template document.
    pub fn template(template_id: &str) -> String {
        format!("templates/{}", template_id)
    }
}

/// Key → document get/put service.
///
/// A missing key is `Ok(None)`, never an error.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the document stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the document stored under `key`.
    async fn put(&self, key: &str, document: Value) -> Result<(), StoreError>;

    /// Remove the document stored under `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Check that a key is a relative, slash-separated path of safe segments.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        });

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
