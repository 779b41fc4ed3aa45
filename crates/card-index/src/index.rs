//! Searchable card index.
//!
//! A `CardIndex` is a validated `EmbeddingIndex`: the card ids, the
//! embedding matrix and the metadata rows are known to line up, and the
//! matrix sits behind a `SimilaritySearch` implementation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use card_embeddings::Embedding;

use crate::artifact::EmbeddingIndex;
use crate::error::IndexError;
use crate::search::{ExactSearch, SimilaritySearch};

/// One ranked candidate for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub card_id: String,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
    /// 1-based position in descending-score order
    #[serde(skip)]
    pub rank: usize,
    /// Original catalog row, or null when unavailable
    #[serde(rename = "source_row")]
    pub metadata: Option<Value>,
}

/// Read-only index ready for matching.
pub struct CardIndex {
    card_ids: Vec<String>,
    metadata: Vec<Option<Value>>,
    search: Box<dyn SimilaritySearch>,
}

impl std::fmt::Debug for CardIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardIndex")
            .field("rows", &self.len())
            .field("dimension", &self.dimension())
            .finish()
    }
}

impl CardIndex {
    /// Load and validate the artifact at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let index = Self::from_artifact(EmbeddingIndex::load(path)?)?;
        info!(
            path = %path.display(),
            rows = index.len(),
            dim = index.dimension(),
            "Opened index"
        );
        Ok(index)
    }

    /// Validate an artifact and wrap it in exact search.
    ///
    /// Fails if the matrix is not 2-dimensional, has no rows, or its row
    /// count disagrees with the number of card ids.
    pub fn from_artifact(artifact: EmbeddingIndex) -> Result<Self, IndexError> {
        if artifact.shape.len() != 2 {
            return Err(IndexError::Malformed(format!(
                "embedding matrix must be 2-dimensional, got {} dimensions",
                artifact.shape.len()
            )));
        }
        let (rows, dim) = (artifact.shape[0], artifact.shape[1]);
        if rows == 0 {
            return Err(IndexError::Empty);
        }
        if artifact.card_ids.len() != rows {
            return Err(IndexError::Malformed(format!(
                "{} card ids for {} embedding rows",
                artifact.card_ids.len(),
                rows
            )));
        }

        let metadata = parse_metadata(artifact.metadata_json, rows);
        let search = ExactSearch::new(artifact.embeddings, rows, dim)?;
        Self::with_search(artifact.card_ids, metadata, Box::new(search))
    }

    /// Build an index over a custom search structure.
    pub fn with_search(
        card_ids: Vec<String>,
        metadata: Vec<Option<Value>>,
        search: Box<dyn SimilaritySearch>,
    ) -> Result<Self, IndexError> {
        if search.is_empty() {
            return Err(IndexError::Empty);
        }
        if card_ids.len() != search.len() || metadata.len() != search.len() {
            return Err(IndexError::Malformed(format!(
                "{} card ids, {} metadata rows, {} vectors",
                card_ids.len(),
                metadata.len(),
                search.len()
            )));
        }
        Ok(Self {
            card_ids,
            metadata,
            search,
        })
    }

    pub fn len(&self) -> usize {
        self.card_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.card_ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.search.dimension()
    }

    pub fn card_id(&self, row: usize) -> Option<&str> {
        self.card_ids.get(row).map(|s| s.as_str())
    }

    /// Catalog row for `row`, if it was stored and parses.
    pub fn metadata(&self, row: usize) -> Option<&Value> {
        self.metadata.get(row).and_then(|m| m.as_ref())
    }

    /// Rank index rows against `query`.
    ///
    /// Returns `min(max(k, 1), N)` results in descending score order.
    pub fn match_query(&self, query: &Embedding, k: usize) -> Result<Vec<MatchResult>, IndexError> {
        let hits = self.search.search(query.values(), k)?;
        debug!(k, returned = hits.len(), "Matched query");

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| MatchResult {
                card_id: self.card_ids[hit.row].clone(),
                score: hit.score,
                rank: i + 1,
                metadata: self.metadata[hit.row].clone(),
            })
            .collect())
    }
}

/// Parse per-row metadata, degrading to nulls instead of failing.
///
/// A missing channel or one whose length disagrees with the row count
/// yields null for every row; an unparseable entry yields null for that row.
fn parse_metadata(metadata_json: Option<Vec<String>>, rows: usize) -> Vec<Option<Value>> {
    let Some(raw) = metadata_json else {
        return vec![None; rows];
    };
    if raw.len() != rows {
        warn!(
            metadata_rows = raw.len(),
            rows, "Metadata length does not match index, ignoring metadata"
        );
        return vec![None; rows];
    }

    raw.iter()
        .enumerate()
        .map(|(row, text)| match serde_json::from_str::<Value>(text) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                debug!(row, error = %e, "Unparseable metadata row");
                None
            }
        })
        .collect()
}
