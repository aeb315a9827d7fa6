//! The prompt lineage store.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{LineageError, PersistenceError};
use crate::facets::FacetSnapshot;

use super::entry::{EntryType, LegacyEntry, LineageGroup, PromptEntry};
use super::migrate::{self, MigrationOutcome};
use super::persistence::LineagePersistence;

#[derive(Debug, Default)]
struct LineageState {
    /// Newest first.
    entries: Vec<PromptEntry>,
    /// The persisted sequence has been read at least once.
    loaded: bool,
    /// In-memory entries are ahead of the persisted copy.
    dirty: bool,
}

/// Append-only history of original and enhanced prompts.
///
/// Every mutation runs under one async lock, so writes (including their
/// persistence side effect) are applied one at a time. Persistence failures
/// are logged and the in-memory sequence is kept; [`Self::flush`] retries.
pub struct PromptLineageStore {
    persistence: Arc<dyn LineagePersistence>,
    state: Mutex<LineageState>,
}

impl PromptLineageStore {
    pub fn new(persistence: Arc<dyn LineagePersistence>) -> Self {
        Self {
            persistence,
            state: Mutex::new(LineageState::default()),
        }
    }

    /// Record a newly generated prompt.
    pub async fn add_original(
        &self,
        prompt: &str,
        options: FacetSnapshot,
        template_used: &str,
    ) -> PromptEntry {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;

        let entry = PromptEntry::original(prompt, options, template_used);
        state.entries.insert(0, entry.clone());
        debug!(entry_id = %entry.id, template_used, "Recorded original prompt");

        self.persist(&mut state).await;
        entry
    }

    /// Record an enhancement of an existing original entry.
    ///
    /// Fails with [`LineageError::MissingParent`] when `parent_id` does not
    /// name an original entry; the sequence is left untouched.
    pub async fn try_add_enhanced(
        &self,
        parent_id: &str,
        enhanced_prompt: &str,
        template_used: &str,
    ) -> Result<PromptEntry, LineageError> {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;

        let entry = {
            let parent = state
                .entries
                .iter()
                .find(|e| e.id == parent_id && e.is_original())
                .ok_or_else(|| LineageError::MissingParent(parent_id.to_string()))?;
            PromptEntry::enhanced(parent, enhanced_prompt, template_used)
        };

        state.entries.insert(0, entry.clone());
        debug!(entry_id = %entry.id, parent_id, "Recorded enhanced prompt");

        self.persist(&mut state).await;
        Ok(entry)
    }

    /// Record an enhancement and return the resulting sequence.
    ///
    /// A missing parent is logged and the unchanged sequence returned.
    pub async fn add_enhanced(
        &self,
        parent_id: &str,
        enhanced_prompt: &str,
        template_used: &str,
    ) -> Vec<PromptEntry> {
        if let Err(e) = self
            .try_add_enhanced(parent_id, enhanced_prompt, template_used)
            .await
        {
            warn!(parent_id, error = %e, "Enhanced prompt not recorded");
        }
        self.get_all().await
    }

    /// Every entry, newest first.
    pub async fn get_all(&self) -> Vec<PromptEntry> {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;
        state.entries.clone()
    }

    pub async fn get(&self, id: &str) -> Option<PromptEntry> {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;
        state.entries.iter().find(|e| e.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;
        state.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Originals with their enhancements, newest original first.
    pub async fn grouped(&self) -> Vec<LineageGroup> {
        let entries = self.get_all().await;

        entries
            .iter()
            .filter(|e| e.is_original())
            .map(|original| LineageGroup {
                original: original.clone(),
                enhanced: entries
                    .iter()
                    .filter(|e| {
                        e.is_enhanced() && e.parent_id.as_deref() == Some(original.id.as_str())
                    })
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    /// Entries currently selected, newest first.
    pub async fn selected(&self) -> Vec<PromptEntry> {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;
        state
            .entries
            .iter()
            .filter(|e| e.is_selected)
            .cloned()
            .collect()
    }

    /// Flip, or set when `explicit` is given, the selection of one entry.
    pub async fn toggle_selection(
        &self,
        id: &str,
        explicit: Option<bool>,
    ) -> Result<PromptEntry, LineageError> {
        let mut state = self.state.lock().await;
        let _ = self.ensure_loaded(&mut state).await;

        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| LineageError::UnknownEntry(id.to_string()))?;
        entry.is_selected = explicit.unwrap_or(!entry.is_selected);
        let updated = entry.clone();

        self.persist(&mut state).await;
        Ok(updated)
    }

    /// Remove every entry. Irreversible.
    pub async fn clear_all(&self) {
        let mut state = self.state.lock().await;
        let removed = state.entries.len();
        state.entries.clear();
        // The persisted copy is replaced wholesale, so it no longer needs reading.
        state.loaded = true;
        info!(removed, "Cleared prompt history");
        self.persist(&mut state).await;
    }

    /// Convert the legacy flat history held by the persistence layer.
    ///
    /// Runs only while the store is empty. The legacy source is cleared once
    /// the converted sequence has been persisted, which is what makes a
    /// second call a no-op.
    pub async fn migrate_legacy(&self) -> Result<MigrationOutcome, LineageError> {
        let legacy = self.persistence.load_legacy().await?;
        if legacy.is_empty() {
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        let outcome = self.migrate_entries(&legacy).await?;
        if matches!(outcome, MigrationOutcome::Migrated { .. }) {
            self.persistence.clear_legacy().await?;
            info!("Legacy prompt history cleared after migration");
        }
        Ok(outcome)
    }

    /// Convert caller-supplied legacy entries into this store.
    ///
    /// Skipped when the store already holds entries. The converted sequence
    /// must persist; otherwise the store is left as it was.
    pub async fn migrate_entries(
        &self,
        legacy: &[LegacyEntry],
    ) -> Result<MigrationOutcome, LineageError> {
        if legacy.is_empty() {
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;

        if !state.entries.is_empty() {
            info!(
                existing_entries = state.entries.len(),
                "Prompt history not empty, legacy migration skipped"
            );
            return Ok(MigrationOutcome::Skipped {
                existing_entries: state.entries.len(),
            });
        }

        let converted = migrate::convert(legacy);
        self.persistence.save(&converted).await?;

        let created_entries = converted.len();
        state.entries = converted;
        state.dirty = false;

        info!(
            legacy_entries = legacy.len(),
            created_entries, "Migrated legacy prompt history"
        );
        Ok(MigrationOutcome::Migrated {
            legacy_entries: legacy.len(),
            created_entries,
        })
    }

    /// Write the in-memory sequence if it is ahead of the persisted copy.
    pub async fn flush(&self) -> Result<(), LineageError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        if !state.dirty {
            return Ok(());
        }

        self.persistence.save(&state.entries).await?;
        state.dirty = false;
        Ok(())
    }

    /// Whether some change has not reached the persistence layer yet.
    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    /// Read the persisted sequence once, merging anything recorded while it
    /// was unreadable in front of it.
    ///
    /// Failures are logged; callers that can work in memory ignore them.
    async fn ensure_loaded(&self, state: &mut LineageState) -> Result<(), PersistenceError> {
        if state.loaded {
            return Ok(());
        }

        match self.persistence.load().await {
            Ok(stored) => {
                let stored = drop_orphans(stored);
                let pending = std::mem::take(&mut state.entries);
                state.dirty = !pending.is_empty();

                let pending_ids: HashSet<String> = pending.iter().map(|e| e.id.clone()).collect();
                state.entries = pending
                    .into_iter()
                    .chain(stored.into_iter().filter(|e| !pending_ids.contains(&e.id)))
                    .collect();
                state.loaded = true;
                debug!(entries = state.entries.len(), "Loaded prompt history");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Prompt history unavailable, working in memory");
                Err(e)
            }
        }
    }

    /// Persist the sequence, keeping in-memory state on failure.
    async fn persist(&self, state: &mut LineageState) {
        if !state.loaded {
            // Writing now would overwrite history that was never read.
            state.dirty = true;
            return;
        }

        match self.persistence.save(&state.entries).await {
            Ok(()) => state.dirty = false,
            Err(e) => {
                warn!(
                    error = %e,
                    entries = state.entries.len(),
                    "Failed to persist prompt history, keeping in-memory state"
                );
                state.dirty = true;
            }
        }
    }
}

/// Remove enhanced entries whose parent is not an original in the sequence.
fn drop_orphans(entries: Vec<PromptEntry>) -> Vec<PromptEntry> {
    let originals: HashSet<String> = entries
        .iter()
        .filter(|e| e.is_original())
        .map(|e| e.id.clone())
        .collect();

    let before = entries.len();
    let kept: Vec<PromptEntry> = entries
        .into_iter()
        .filter(|e| match e.entry_type {
            EntryType::Original => e.parent_id.is_none(),
            EntryType::Enhanced => e
                .parent_id
                .as_ref()
                .is_some_and(|parent| originals.contains(parent)),
        })
        .collect();

    if kept.len() != before {
        warn!(dropped = before - kept.len(), "Dropped orphaned history entries on load");
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::persistence::DocumentLineagePersistence;
    use crate::storage::memory::MemoryDocumentStore;
    use crate::storage::{keys, DocumentStore};
    use serde_json::json;

    fn setup() -> (Arc<MemoryDocumentStore>, PromptLineageStore) {
        let store = Arc::new(MemoryDocumentStore::new());
        let lineage =
            PromptLineageStore::new(Arc::new(DocumentLineagePersistence::new(store.clone())));
        (store, lineage)
    }

    async fn persisted_len(store: &MemoryDocumentStore) -> usize {
        store
            .get(keys::LINEAGE_HISTORY)
            .await
            .expect("get")
            .and_then(|doc| doc["entries"].as_array().map(Vec::len))
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_original_then_enhanced() {
        let (store, lineage) = setup();
        let original = lineage.add_original("a cat", FacetSnapshot::new(), "standard").await;
        let all = lineage.add_enhanced(&original.id, "a majestic cat", "standard").await;

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].entry_type, EntryType::Enhanced);
        assert_eq!(all[0].parent_id.as_deref(), Some(all[1].id.as_str()));
        assert_eq!(all[1].id, original.id);
        assert_eq!(persisted_len(&store).await, 2);
        assert!(!lineage.is_dirty().await);
    }

    #[tokio::test]
    async fn test_missing_parent_leaves_sequence_unchanged() {
        let (_store, lineage) = setup();
        lineage.add_original("a cat", FacetSnapshot::new(), "standard").await;
        let before = lineage.get_all().await;

        let after = lineage.add_enhanced("no-such-id", "ghost", "standard").await;
        assert_eq!(after, before);

        let err = lineage.try_add_enhanced("no-such-id", "ghost", "standard").await.unwrap_err();
        assert!(matches!(err, LineageError::MissingParent(ref id) if id == "no-such-id"));
    }

    #[tokio::test]
    async fn test_enhanced_cannot_parent_enhanced() {
        let (_store, lineage) = setup();
        let original = lineage.add_original("a cat", FacetSnapshot::new(), "standard").await;
        let child = lineage
            .try_add_enhanced(&original.id, "a majestic cat", "standard")
            .await
            .expect("parent exists");

        let err = lineage.try_add_enhanced(&child.id, "more", "standard").await.unwrap_err();
        assert!(matches!(err, LineageError::MissingParent(_)));
        assert_eq!(lineage.len().await, 2);
    }

    #[tokio::test]
    async fn test_toggle_selection() {
        let (_store, lineage) = setup();
        let a = lineage.add_original("a", FacetSnapshot::new(), "standard").await;
        let b = lineage.add_original("b", FacetSnapshot::new(), "standard").await;

        assert!(lineage.toggle_selection(&a.id, None).await.expect("toggle").is_selected);
        assert!(lineage.toggle_selection(&a.id, Some(true)).await.expect("set").is_selected);
        assert!(!lineage.get(&b.id).await.expect("b").is_selected);
        assert_eq!(lineage.selected().await.len(), 1);

        assert!(!lineage.toggle_selection(&a.id, None).await.expect("toggle").is_selected);
        assert!(matches!(
            lineage.toggle_selection("missing", None).await.unwrap_err(),
            LineageError::UnknownEntry(_)
        ));
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (store, lineage) = setup();
        lineage.add_original("a", FacetSnapshot::new(), "standard").await;
        lineage.clear_all().await;

        assert!(lineage.is_empty().await);
        assert_eq!(persisted_len(&store).await, 0);
    }

    #[tokio::test]
    async fn test_grouped() {
        let (_store, lineage) = setup();
        let cat = lineage.add_original("a cat", FacetSnapshot::new(), "standard").await;
        let dog = lineage.add_original("a dog", FacetSnapshot::new(), "standard").await;
        lineage.add_enhanced(&cat.id, "cat v1", "standard").await;
        lineage.add_enhanced(&cat.id, "cat v2", "longform").await;

        let groups = lineage.grouped().await;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].original.id, dog.id);
        assert!(groups[0].enhanced.is_empty());
        assert_eq!(groups[1].original.id, cat.id);
        let texts: Vec<&str> = groups[1].enhanced.iter().map(|e| e.display_text()).collect();
        assert_eq!(texts, vec!["cat v2", "cat v1"]);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_state_and_flush_recovers() {
        let (store, lineage) = setup();
        lineage.get_all().await;
        store.set_fail_writes(true);

        let entry = lineage.add_original("a cat", FacetSnapshot::new(), "standard").await;
        assert_eq!(lineage.get_all().await, vec![entry]);
        assert!(lineage.is_dirty().await);
        assert!(lineage.flush().await.is_err());

        store.set_fail_writes(false);
        lineage.flush().await.expect("flush");
        assert!(!lineage.is_dirty().await);
        assert_eq!(persisted_len(&store).await, 1);
    }

    #[tokio::test]
    async fn test_unreadable_history_is_not_overwritten() {
        let (store, lineage) = setup();
        let existing = PromptEntry::original("old", FacetSnapshot::new(), "standard");
        store
            .put(keys::LINEAGE_HISTORY, json!({"version": 2, "entries": [existing]}))
            .await
            .expect("put");
        store.set_fail_reads(true);

        let fresh = lineage.add_original("new", FacetSnapshot::new(), "standard").await;
        assert!(lineage.is_dirty().await);
        assert!(lineage.flush().await.is_err());

        store.set_fail_reads(false);
        assert_eq!(persisted_len(&store).await, 1);
        let all = lineage.get_all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, fresh.id);
        lineage.flush().await.expect("flush");
        assert_eq!(persisted_len(&store).await, 2);
    }

    #[tokio::test]
    async fn test_orphans_dropped_on_load() {
        let (store, lineage) = setup();
        let parent = PromptEntry::original("a cat", FacetSnapshot::new(), "standard");
        let child = PromptEntry::enhanced(&parent, "a majestic cat", "standard");
        let mut orphan = PromptEntry::enhanced(&parent, "lost", "standard");
        orphan.parent_id = Some("gone".to_string());
        store
            .put(
                keys::LINEAGE_HISTORY,
                json!({"version": 2, "entries": [orphan, child, parent]}),
            )
            .await
            .expect("put");

        let all = lineage.get_all().await;
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|e| e.enhanced_prompt.as_deref() != Some("lost")));
    }

    #[tokio::test]
    async fn test_migrate_legacy_is_idempotent() {
        let (store, lineage) = setup();
        store
            .put(
                keys::LINEAGE_LEGACY,
                json!([
                    {"id": "2", "prompt": "a dog", "enhancedPrompt": "a loyal dog"},
                    {"id": "1", "prompt": "a cat"}
                ]),
            )
            .await
            .expect("put");

        let first = lineage.migrate_legacy().await.expect("migrate");
        assert_eq!(
            first,
            MigrationOutcome::Migrated {
                legacy_entries: 2,
                created_entries: 3
            }
        );
        let after_first = lineage.get_all().await;

        let second = lineage.migrate_legacy().await.expect("migrate");
        assert_eq!(second, MigrationOutcome::NothingToMigrate);
        assert_eq!(lineage.get_all().await, after_first);
        assert!(store.get(keys::LINEAGE_LEGACY).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_migrate_skipped_when_store_not_empty() {
        let (store, lineage) = setup();
        lineage.add_original("current", FacetSnapshot::new(), "standard").await;
        store
            .put(keys::LINEAGE_LEGACY, json!([{"prompt": "old"}]))
            .await
            .expect("put");

        let outcome = lineage.migrate_legacy().await.expect("migrate");
        assert_eq!(outcome, MigrationOutcome::Skipped { existing_entries: 1 });
        assert!(store.get(keys::LINEAGE_LEGACY).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_migrate_entries_write_failure_changes_nothing() {
        let (store, lineage) = setup();
        lineage.get_all().await;
        store.set_fail_writes(true);
        let legacy: Vec<LegacyEntry> =
            serde_json::from_value(json!([{"prompt": "a cat"}])).expect("parse");

        assert!(lineage.migrate_entries(&legacy).await.is_err());
        assert!(lineage.is_empty().await);
    }
}
