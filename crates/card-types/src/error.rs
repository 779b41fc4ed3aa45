//! Error types for catalog and configuration handling.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading settings or reading a card catalog.
#[derive(Debug, Error)]
pub enum CardError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog file does not exist
    #[error("Catalog not found: {}", .0.display())]
    CatalogNotFound(PathBuf),

    /// Catalog extension is not one we can parse
    #[error("Unsupported catalog format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Required catalog columns are absent
    #[error("Missing required columns in catalog: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A row could not be turned into a card record
    #[error("Invalid catalog row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },

    /// CSV parse error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
