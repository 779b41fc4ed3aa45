//! Error types for card identification.

use std::path::PathBuf;

use thiserror::Error;

use card_embeddings::EmbeddingError;
use card_index::IndexError;

use crate::report::QueryResult;

/// Errors that abort an identification command.
///
/// Per-query failures inside a batch are not errors; they are reported as
/// `QueryOutcome::Failed` unless the batch runs in fail-fast mode.
#[derive(Error, Debug)]
pub enum IdentifyError {
    #[error("Query image not found: {0}")]
    QueryNotFound(PathBuf),

    #[error("Query directory not found: {0}")]
    QueryDirNotFound(PathBuf),

    #[error("Unsupported query image extension: {0} (expected png, jpg, jpeg, webp or bmp)")]
    UnsupportedExtension(PathBuf),

    #[error("No supported query images found in {0}")]
    NoQueryImages(PathBuf),

    #[error("Reference image directory not found: {0}")]
    RefDirNotFound(PathBuf),

    #[error("Run directory already exists: {0}")]
    RunExists(PathBuf),

    #[error("Batch aborted on {query}: {reason} (partial results written to {results})")]
    BatchAborted {
        query: PathBuf,
        reason: String,
        results: PathBuf,
        /// Queries identified before the abort, as written to `results`
        partial: Vec<QueryResult>,
    },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
