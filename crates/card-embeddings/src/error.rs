//! Embedding error types.

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Candle model error
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Image could not be opened or decoded
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// Model file not found
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    /// Download error
    #[error("Failed to download model: {0}")]
    Download(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The model produced a vector that cannot be normalized
    #[error("Degenerate embedding: {0}")]
    DegenerateEmbedding(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Blocking embedding task did not complete
    #[error("Embedding task failed: {0}")]
    Task(String),
}
