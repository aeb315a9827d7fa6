//! Conversion of flat legacy history into lineage entries.
//!
//! Ids are derived from the legacy record (UUID v5), so converting the same
//! legacy source twice yields identical entries.

use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::facets::FacetSnapshot;
use crate::template::builtin::DEFAULT_TEMPLATE_ID;

use super::entry::{EntryType, LegacyEntry, PromptEntry};

/// Namespace for ids of migrated entries.
const MIGRATION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93b7_4d0a_8e55_c1f0_7a3d_b912);

/// Result of a migration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MigrationOutcome {
    /// Legacy entries were converted and the legacy source cleared.
    #[serde(rename_all = "camelCase")]
    Migrated {
        legacy_entries: usize,
        created_entries: usize,
    },
    /// The legacy source was empty or absent.
    NothingToMigrate,
    /// The store already holds history; the legacy source was left in place.
    #[serde(rename_all = "camelCase")]
    Skipped { existing_entries: usize },
}

/// Convert legacy records, preserving their order (newest first).
///
/// Each record becomes an `Original`, preceded by a linked `Enhanced` child
/// when it carries a non-empty enhancement.
pub fn convert(legacy: &[LegacyEntry]) -> Vec<PromptEntry> {
    let mut entries = Vec::with_capacity(legacy.len() * 2);

    for (index, record) in legacy.iter().enumerate() {
        let key = legacy_key(index, record);
        let timestamp = record
            .timestamp
            .as_ref()
            .map(|t| t.to_datetime())
            .unwrap_or_default();
        let template_used = record
            .template_used
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TEMPLATE_ID.to_string());
        let options = FacetSnapshot::try_from(record.options.clone()).unwrap_or_else(|e| {
            if !record.options.is_null() {
                tracing::warn!(legacy_key = %key, error = %e, "Dropping unreadable legacy options");
            }
            FacetSnapshot::new()
        });

        let original = PromptEntry {
            id: Uuid::new_v5(&MIGRATION_NAMESPACE, key.as_bytes()).to_string(),
            timestamp,
            prompt: record.prompt.clone(),
            enhanced_prompt: None,
            options,
            template_used: template_used.clone(),
            parent_id: None,
            is_selected: record.is_selected,
            entry_type: EntryType::Original,
        };

        if let Some(enhanced) = record
            .enhanced_prompt
            .as_deref()
            .filter(|text| !text.trim().is_empty())
        {
            let child_key = format!("{}/enhanced", key);
            entries.push(PromptEntry {
                id: Uuid::new_v5(&MIGRATION_NAMESPACE, child_key.as_bytes()).to_string(),
                timestamp,
                prompt: original.prompt.clone(),
                enhanced_prompt: Some(enhanced.to_string()),
                options: original.options.clone(),
                template_used,
                parent_id: Some(original.id.clone()),
                is_selected: false,
                entry_type: EntryType::Enhanced,
            });
        }

        entries.push(original);
    }

    entries
}

/// Stable identity for a legacy record: its position plus its own id, or a
/// digest of its content.
fn legacy_key(index: usize, record: &LegacyEntry) -> String {
    if let Some(id) = record.id.as_deref().filter(|id| !id.trim().is_empty()) {
        return format!("id:{}:{}", index, id);
    }

    let mut hasher = Sha256::new();
    hasher.update(index.to_le_bytes());
    hasher.update(record.prompt.as_bytes());
    if let Some(timestamp) = &record.timestamp {
        hasher.update(timestamp.to_datetime().timestamp_millis().to_le_bytes());
    }
    format!("digest:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy(value: serde_json::Value) -> Vec<LegacyEntry> {
        serde_json::from_value(value).expect("legacy fixture should parse")
    }

    #[test]
    fn test_convert_links_enhancements() {
        let records = legacy(json!([
            {"id": "b", "timestamp": 2000, "prompt": "a dog", "enhancedPrompt": "a loyal dog", "templateUsed": "longform"},
            {"id": "a", "timestamp": 1000, "prompt": "a cat", "options": {"pose": "sitting"}}
        ]));

        let entries = convert(&records);
        assert_eq!(entries.len(), 3);

        assert!(entries[0].is_enhanced());
        assert_eq!(entries[0].parent_id.as_deref(), Some(entries[1].id.as_str()));
        assert_eq!(entries[0].enhanced_prompt.as_deref(), Some("a loyal dog"));
        assert_eq!(entries[0].prompt, "a dog");
        assert_eq!(entries[0].template_used, "longform");

        assert!(entries[1].is_original());
        assert!(entries[2].is_original());
        assert_eq!(entries[2].template_used, DEFAULT_TEMPLATE_ID);
        assert_eq!(entries[2].options.get("pose"), Some(&json!("sitting")));
    }

    #[test]
    fn test_convert_is_deterministic() {
        let records = legacy(json!([
            {"prompt": "no id here", "enhancedPrompt": "still fine"},
            {"id": "x", "prompt": "has id"}
        ]));
        assert_eq!(convert(&records), convert(&records));
    }

    #[test]
    fn test_blank_enhancement_creates_no_child() {
        let records = legacy(json!([{"id": "a", "prompt": "a cat", "enhancedPrompt": "   "}]));
        let entries = convert(&records);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_original());
    }

    #[test]
    fn test_identical_records_without_ids_get_distinct_ids() {
        let records = legacy(json!([{"prompt": "same"}, {"prompt": "same"}]));
        let entries = convert(&records);
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[test]
    fn test_shared_legacy_ids_stay_distinct() {
        let records = legacy(json!([
            {"id": "1700000000000", "prompt": "a cat", "enhancedPrompt": "a regal cat"},
            {"id": "1700000000000", "prompt": "a dog", "enhancedPrompt": "a loyal dog"}
        ]));

        let entries = convert(&records);
        assert_eq!(entries.len(), 4);

        let ids: std::collections::HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 4);

        assert_eq!(entries[0].parent_id.as_deref(), Some(entries[1].id.as_str()));
        assert_eq!(entries[1].prompt, "a cat");
        assert_eq!(entries[2].parent_id.as_deref(), Some(entries[3].id.as_str()));
        assert_eq!(entries[3].prompt, "a dog");
        assert_eq!(convert(&records), entries);
    }

    #[test]
    fn test_non_object_options_are_dropped() {
        let records = legacy(json!([{"id": "a", "prompt": "a cat", "options": ["pose"]}]));
        assert!(convert(&records)[0].options.is_empty());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(MigrationOutcome::Migrated {
            legacy_entries: 2,
            created_entries: 3,
        })
        .expect("serialize");
        assert_eq!(json, json!({"status": "migrated", "legacyEntries": 2, "createdEntries": 3}));
    }
}
