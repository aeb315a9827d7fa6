//! Prompt history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::facets::FacetSnapshot;

/// Whether an entry is a generated prompt or an enhancement of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Original,
    Enhanced,
}

/// One record in the prompt history.
///
/// `Enhanced` entries always carry the id of an `Original` parent; `Original`
/// entries never have a parent. Only `is_selected` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_prompt: Option<String>,
    #[serde(default)]
    pub options: FacetSnapshot,
    pub template_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

impl PromptEntry {
    /// A new original entry with a fresh id and the current time.
    pub fn original(
        prompt: impl Into<String>,
        options: FacetSnapshot,
        template_used: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            prompt: prompt.into(),
            enhanced_prompt: None,
            options,
            template_used: template_used.into(),
            parent_id: None,
            is_selected: false,
            entry_type: EntryType::Original,
        }
    }

    /// A new enhanced entry linked to `parent`.
    ///
    /// The parent's prompt text and options are copied so the entry renders
    /// on its own.
    pub fn enhanced(
        parent: &PromptEntry,
        enhanced_prompt: impl Into<String>,
        template_used: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            prompt: parent.prompt.clone(),
            enhanced_prompt: Some(enhanced_prompt.into()),
            options: parent.options.clone(),
            template_used: template_used.into(),
            parent_id: Some(parent.id.clone()),
            is_selected: false,
            entry_type: EntryType::Enhanced,
        }
    }

    pub fn is_original(&self) -> bool {
        self.entry_type == EntryType::Original
    }

    pub fn is_enhanced(&self) -> bool {
        self.entry_type == EntryType::Enhanced
    }

    /// Text to show or reuse: the enhancement when present, else the prompt.
    pub fn display_text(&self) -> &str {
        self.enhanced_prompt.as_deref().unwrap_or(&self.prompt)
    }
}

/// An original entry with its enhancements, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageGroup {
    pub original: PromptEntry,
    pub enhanced: Vec<PromptEntry>,
}

/// Legacy timestamps were stored as epoch milliseconds or RFC 3339 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyTimestamp {
    Millis(i64),
    Rfc3339(DateTime<Utc>),
}

impl LegacyTimestamp {
    pub fn to_datetime(&self) -> DateTime<Utc> {
        match self {
            LegacyTimestamp::Millis(ms) => DateTime::from_timestamp_millis(*ms).unwrap_or_default(),
            LegacyTimestamp::Rfc3339(at) => *at,
        }
    }
}

/// Flat history record from before lineage tracking. No parent, no type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<LegacyTimestamp>,
    pub prompt: String,
    #[serde(default)]
    pub enhanced_prompt: Option<String>,
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub template_used: Option<String>,
    #[serde(default)]
    pub is_selected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_original_entry() {
        let entry = PromptEntry::original("a cat", FacetSnapshot::new(), "standard");
        assert!(entry.is_original());
        assert!(entry.parent_id.is_none());
        assert!(entry.enhanced_prompt.is_none());
        assert!(!entry.is_selected);
        assert!(Uuid::parse_str(&entry.id).is_ok());
    }

    #[test]
    fn test_enhanced_entry_copies_parent() {
        let options = FacetSnapshot::new().with("pose", "sitting");
        let parent = PromptEntry::original("a cat", options.clone(), "standard");
        let child = PromptEntry::enhanced(&parent, "a majestic cat", "longform");

        assert!(child.is_enhanced());
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
        assert_eq!(child.prompt, "a cat");
        assert_eq!(child.options, options);
        assert_eq!(child.template_used, "longform");
        assert_eq!(child.display_text(), "a majestic cat");
        assert_ne!(child.id, parent.id);
    }

    #[test]
    fn test_entry_serialized_shape() {
        let parent = PromptEntry::original("a cat", FacetSnapshot::new(), "standard");
        let json = serde_json::to_value(&parent).expect("serialize");

        assert_eq!(json["type"], "original");
        assert_eq!(json["templateUsed"], "standard");
        assert_eq!(json["isSelected"], false);
        assert!(json.get("parentId").is_none());
    }

    #[test]
    fn test_legacy_entry_parses_both_timestamp_forms() {
        let raw = json!([
            {"id": "1", "timestamp": 1700000000000i64, "prompt": "a cat", "enhancedPrompt": "a majestic cat"},
            {"timestamp": "2024-01-02T03:04:05Z", "prompt": "a dog", "options": null}
        ]);
        let entries: Vec<LegacyEntry> = serde_json::from_value(raw).expect("parse");

        assert_eq!(
            entries[0].timestamp.as_ref().map(|t| t.to_datetime().timestamp_millis()),
            Some(1_700_000_000_000)
        );
        assert_eq!(
            entries[1].timestamp.as_ref().map(|t| t.to_datetime().to_rfc3339()),
            Some("2024-01-02T03:04:05+00:00".to_string())
        );
        assert!(entries[1].template_used.is_none());
    }
}
