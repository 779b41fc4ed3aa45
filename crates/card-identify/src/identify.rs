//! Single-query identification.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use card_embeddings::SharedEmbedder;
use card_index::{CardIndex, IndexError, MatchResult};

use crate::error::IdentifyError;

/// Best match for one query plus its ranked alternatives.
///
/// `top_k[0]` is always the best entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifyResult {
    pub best_card_id: String,
    pub score: f32,
    pub source_row: Option<Value>,
    pub top_k: Vec<MatchResult>,
}

impl IdentifyResult {
    /// Build the document from ranked matches.
    pub fn from_matches(top_k: Vec<MatchResult>) -> Result<Self, IdentifyError> {
        let best = top_k.first().ok_or(IndexError::Empty)?;
        Ok(Self {
            best_card_id: best.card_id.clone(),
            score: best.score,
            source_row: best.metadata.clone(),
            top_k,
        })
    }
}

/// Matches query images against a loaded index.
///
/// Cheap to clone; the index and the embedder are shared.
#[derive(Debug, Clone)]
pub struct Identifier {
    index: Arc<CardIndex>,
    embedder: SharedEmbedder,
}

impl Identifier {
    pub fn new(index: Arc<CardIndex>, embedder: SharedEmbedder) -> Self {
        Self { index, embedder }
    }

    /// Open the index at `index_path`.
    ///
    /// Fails if the file is missing or the index is empty or malformed.
    pub fn open(index_path: &Path, embedder: SharedEmbedder) -> Result<Self, IdentifyError> {
        let index = CardIndex::open(index_path)?;
        Ok(Self::new(Arc::new(index), embedder))
    }

    pub fn index(&self) -> &CardIndex {
        &self.index
    }

    /// Embed `query` and return its `top_k` best matches.
    pub async fn identify(&self, query: &Path, top_k: usize) -> Result<IdentifyResult, IdentifyError> {
        if !query.is_file() {
            return Err(IdentifyError::QueryNotFound(query.to_path_buf()));
        }

        let embedding = self.embedder.embed(query.to_path_buf()).await?;
        let matches = self.index.match_query(&embedding, top_k)?;
        let result = IdentifyResult::from_matches(matches)?;

        debug!(
            query = %query.display(),
            candidates = result.top_k.len(),
            "Ranked query"
        );
        info!(
            query = %query.display(),
            best_card_id = %result.best_card_id,
            score = result.score,
            "Identified card"
        );
        Ok(result)
    }
}
