//! File-backed document store.
//!
//! Each key maps to `<root>/<key>.json`. Writes go to a sibling temporary file
//! that is renamed over the target, so a crash mid-write never leaves a
//! truncated document behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use super::{validate_key, DocumentStore};
use crate::error::StoreError;

/// Extension used for stored documents.
const DOCUMENT_EXTENSION: &str = "json";

/// Document store persisting JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the file path for a key.
    fn document_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{}.{}", key, DOCUMENT_EXTENSION)))
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.document_path(key)?;
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn put(&self, key: &str, document: Value) -> Result<(), StoreError> {
        let path = self.document_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(&document)?;
        let tmp_path = path.with_extension(format!("{}.tmp", DOCUMENT_EXTENSION));
        fs::write(&tmp_path, contents).await?;
        fs::rename(&tmp_path, &path).await?;

        tracing::trace!(key = key, path = %path.display(), "Wrote document");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.document_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_document_is_none() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let store = FileDocumentStore::new(temp_dir.path());
        assert!(store.get("lineage/history").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_put_creates_nested_directories() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let store = FileDocumentStore::new(temp_dir.path());

        store
            .put("templates/custom1", json!({"masterPrompt": "noir"}))
            .await
            .expect("put should succeed");

        assert!(temp_dir.path().join("templates").join("custom1.json").exists());
        assert!(!temp_dir.path().join("templates").join("custom1.json.tmp").exists());

        let doc = store.get("templates/custom1").await.expect("get");
        assert_eq!(doc, Some(json!({"masterPrompt": "noir"})));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let store = FileDocumentStore::new(temp_dir.path());

        store.put("presets/collection", json!([1])).await.expect("put");
        store.put("presets/collection", json!([1, 2])).await.expect("put");

        let doc = store.get("presets/collection").await.expect("get");
        assert_eq!(doc, Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let store = FileDocumentStore::new(temp_dir.path());

        store.put("lineage/legacy", json!([])).await.expect("put");
        assert!(store.delete("lineage/legacy").await.expect("delete"));
        assert!(!store.delete("lineage/legacy").await.expect("delete"));
    }

    #[tokio::test]
    async fn test_corrupt_document_is_json_error() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("lineage")).expect("mkdir");
        std::fs::write(temp_dir.path().join("lineage").join("history.json"), "{not json")
            .expect("write");

        let store = FileDocumentStore::new(temp_dir.path());
        let err = store.get("lineage/history").await.unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
    }

    #[tokio::test]
    async fn test_traversal_key_rejected() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let store = FileDocumentStore::new(temp_dir.path());
        let err = store.put("../outside", json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
