//! Index error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading, building or searching an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Index file does not exist
    #[error("Index not found: {}", .0.display())]
    NotFound(PathBuf),

    /// File is not a readable index artifact
    #[error("Corrupt index file: {0}")]
    Corrupt(String),

    /// Artifact sequences are not aligned or the matrix has the wrong shape
    #[error("Index is malformed: {0}")]
    Malformed(String),

    /// Artifact holds no rows
    #[error("Index is empty")]
    Empty,

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog or metadata error
    #[error(transparent)]
    Card(#[from] card_types::CardError),
}

/// Errors from fetching a reference image.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No URL to fetch from
    #[error("Missing image URL")]
    MissingUrl,

    /// Request failed before a response arrived
    #[error("Request failed for {url}: {reason}")]
    Request { url: String, reason: String },

    /// Request timed out
    #[error("Request timed out for {url}")]
    Timeout { url: String },

    /// Non-success HTTP status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(String),
}
