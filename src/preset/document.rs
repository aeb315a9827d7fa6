//! Preset export documents and import validation.
//!
//! An export document looks like:
//!
//! ```json
//! {
//!   "version": 1,
//!   "exportedAt": "2024-05-01T10:00:00Z",
//!   "checksum": "<sha256 hex of the presets array>",
//!   "presets": [{"id": "...", "name": "...", "favorite": false, "options": {}}]
//! }
//! ```
//!
//! A bare array of presets is also accepted on import. Validation covers the
//! whole document before anything is merged.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::ImportValidationError;
use crate::facets::FacetSnapshot;

use super::Preset;

/// Current export document version.
pub const PRESET_DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetDocument {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub checksum: String,
    pub presets: Vec<Preset>,
}

impl PresetDocument {
    pub fn new(presets: Vec<Preset>) -> Self {
        Self {
            version: PRESET_DOCUMENT_VERSION,
            exported_at: Utc::now(),
            checksum: checksum(&presets),
            presets,
        }
    }
}

/// SHA-256 (hex) of the canonical JSON encoding of a preset list.
pub fn checksum(presets: &[Preset]) -> String {
    let canonical = serde_json::to_vec(presets).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

/// Validate an import document and return its presets.
pub fn parse(document: &Value) -> Result<Vec<Preset>, ImportValidationError> {
    let (items, expected_checksum) = match document {
        Value::Array(items) => (items, None),
        Value::Object(fields) => {
            let version = fields
                .get("version")
                .and_then(Value::as_u64)
                .ok_or_else(|| malformed("missing or non-numeric 'version'"))?;
            if version != u64::from(PRESET_DOCUMENT_VERSION) {
                return Err(ImportValidationError::UnsupportedVersion(
                    u32::try_from(version).unwrap_or(u32::MAX),
                ));
            }

            let items = fields
                .get("presets")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed("'presets' must be an array"))?;

            let expected = match fields.get("checksum") {
                None | Some(Value::Null) => None,
                Some(Value::String(sum)) => Some(sum.as_str()),
                Some(_) => return Err(malformed("'checksum' must be a string")),
            };
            (items, expected)
        }
        _ => return Err(malformed("expected an object or an array")),
    };

    let mut seen = HashSet::new();
    let mut presets = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let preset = parse_preset(index, item)?;
        if !seen.insert(preset.id.clone()) {
            return Err(ImportValidationError::DuplicateId(preset.id));
        }
        presets.push(preset);
    }

    if let Some(expected) = expected_checksum {
        let actual = checksum(&presets);
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(ImportValidationError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
    }

    Ok(presets)
}

fn parse_preset(index: usize, item: &Value) -> Result<Preset, ImportValidationError> {
    let fields = item
        .as_object()
        .ok_or_else(|| malformed(format!("preset #{} must be an object", index)))?;

    let id = non_empty_str(fields, "id").ok_or(ImportValidationError::EmptyId { index })?;
    let name = non_empty_str(fields, "name").ok_or(ImportValidationError::EmptyName { index })?;

    let description = match fields.get("description") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => {
            return Err(malformed(format!(
                "preset #{} description must be a string",
                index
            )))
        }
    };

    let favorite = match fields.get("favorite") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(malformed(format!(
                "preset #{} favorite must be a boolean",
                index
            )))
        }
    };

    let options = match fields.get("options") {
        None => FacetSnapshot::new(),
        Some(value) => FacetSnapshot::try_from(value.clone())
            .map_err(|_| ImportValidationError::InvalidOptions { index })?,
    };

    Ok(Preset {
        id,
        name,
        description,
        favorite,
        options,
    })
}

fn non_empty_str(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn malformed(message: impl Into<String>) -> ImportValidationError {
    ImportValidationError::Malformed(message.into())
}
