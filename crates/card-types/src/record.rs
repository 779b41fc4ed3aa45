//! Card catalog records.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::CardError;

/// Primary identifier column
pub const CARD_ID_COLUMN: &str = "card_id";

/// Identifier column used when `card_id` is absent
pub const FALLBACK_ID_COLUMN: &str = "id";

/// Reference image URL column
pub const IMAGE_URL_COLUMN: &str = "image_url";

/// Extension used for every stored reference image.
pub const REFERENCE_EXTENSION: &str = "png";

/// One row of the source catalog.
///
/// `fields` is the complete row in column order, including the identifier
/// and image URL columns. It is written verbatim as the row's metadata in
/// the index; nothing downstream relies on keys other than the two above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    /// Join key (not required to be unique)
    pub card_id: String,
    /// Where the reference image can be downloaded from
    pub image_url: String,
    /// Full catalog row
    pub fields: Map<String, Value>,
}

impl CardRecord {
    /// Create a record with no extra fields.
    pub fn new(card_id: impl Into<String>, image_url: impl Into<String>) -> Self {
        let card_id = card_id.into();
        let image_url = image_url.into();
        let mut fields = Map::new();
        fields.insert(CARD_ID_COLUMN.to_string(), Value::String(card_id.clone()));
        fields.insert(IMAGE_URL_COLUMN.to_string(), Value::String(image_url.clone()));
        Self {
            card_id,
            image_url,
            fields,
        }
    }

    /// Build a record from a parsed catalog row.
    ///
    /// `row` is the 1-based data row number, used only for diagnostics.
    pub fn from_row(
        row: usize,
        id_column: &str,
        fields: Map<String, Value>,
    ) -> Result<Self, CardError> {
        let card_id = fields
            .get(id_column)
            .and_then(value_as_text)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| CardError::InvalidRecord {
                row,
                reason: format!("empty {}", id_column),
            })?;

        // An absent URL is not fatal: the image may already be on disk, and
        // otherwise the fetch fails and the record is skipped.
        let image_url = fields
            .get(IMAGE_URL_COLUMN)
            .and_then(value_as_text)
            .unwrap_or_default();

        Ok(Self {
            card_id,
            image_url,
            fields,
        })
    }

    /// Add an extra catalog field (builder pattern).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Serialized copy of the full row, stored as index metadata.
    pub fn metadata_json(&self) -> Result<String, CardError> {
        Ok(serde_json::to_string(&self.fields)?)
    }

    /// Deterministic local path of this card's reference image.
    pub fn reference_path(&self, ref_dir: &Path) -> PathBuf {
        reference_image_path(ref_dir, &self.card_id)
    }
}

/// Deterministic local path of the reference image for `card_id`.
///
/// Distinct ids always map to distinct files. Ids that are already safe
/// path components are used as-is; any other id gets its sanitized form
/// plus a short digest of the raw id.
pub fn reference_image_path(ref_dir: &Path, card_id: &str) -> PathBuf {
    ref_dir.join(format!("{}.{}", reference_key(card_id), REFERENCE_EXTENSION))
}

fn reference_key(card_id: &str) -> String {
    let safe = safe_name(card_id, "card");
    if safe == card_id {
        return safe;
    }
    let digest = Sha256::digest(card_id.as_bytes());
    format!("{}-{}", safe, hex::encode(&digest[..8]))
}

/// Make a string safe to use as a single path component.
///
/// Characters other than ASCII alphanumerics, `-`, `_` and `.` become `_`,
/// then leading and trailing `.`/`_` are trimmed. Returns `fallback` if
/// nothing is left.
pub fn safe_name(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|ch| ch == '.' || ch == '_');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
