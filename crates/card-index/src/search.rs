//! Similarity search over an embedding matrix.
//!
//! `ExactSearch` scores the query against every row (O(N·D)). Callers go
//! through the `SimilaritySearch` trait so another structure can be put
//! behind it without changing them.

use card_embeddings::model::dot;

use crate::error::IndexError;

/// One scored index row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    /// Position of the row in the index
    pub row: usize,
    /// Cosine similarity (higher = more similar)
    pub score: f32,
}

/// Trait for similarity search structures.
///
/// Implementations must be thread-safe for concurrent read access.
pub trait SimilaritySearch: Send + Sync {
    /// Get the vector dimension
    fn dimension(&self) -> usize;

    /// Get the number of rows
    fn len(&self) -> usize;

    /// Check if the structure holds no rows
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the `clamp_k(k, len)` best rows, best first.
    ///
    /// Equal scores are ordered by ascending row position.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRow>, IndexError>;
}

/// Clamp a requested result count to `[1, n]`.
pub fn clamp_k(k: usize, n: usize) -> usize {
    k.max(1).min(n)
}

/// Brute-force search over a row-major unit-vector matrix.
#[derive(Debug, Clone)]
pub struct ExactSearch {
    matrix: Vec<f32>,
    rows: usize,
    dim: usize,
}

impl ExactSearch {
    /// Wrap a row-major `rows × dim` matrix.
    pub fn new(matrix: Vec<f32>, rows: usize, dim: usize) -> Result<Self, IndexError> {
        if rows == 0 {
            return Err(IndexError::Empty);
        }
        if dim == 0 {
            return Err(IndexError::Malformed(
                "embedding dimension is 0".to_string(),
            ));
        }
        if rows.checked_mul(dim) != Some(matrix.len()) {
            return Err(IndexError::Malformed(format!(
                "matrix holds {} values, expected {} x {}",
                matrix.len(),
                rows,
                dim
            )));
        }
        if let Some(pos) = matrix.iter().position(|v| !v.is_finite()) {
            return Err(IndexError::Malformed(format!(
                "non-finite value in embedding row {}",
                pos / dim
            )));
        }
        Ok(Self { matrix, rows, dim })
    }

    /// Score every row against `query`.
    pub fn scores(&self, query: &[f32]) -> Vec<f32> {
        self.matrix
            .chunks_exact(self.dim)
            .map(|row| dot(row, query))
            .collect()
    }
}

impl SimilaritySearch for ExactSearch {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRow>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        Ok(rank_scores(&self.scores(query), k))
    }
}

/// Order scores descending and keep the best `clamp_k(k, len)`.
///
/// The sort is stable, so exactly equal scores keep ascending row order.
pub fn rank_scores(scores: &[f32], k: usize) -> Vec<ScoredRow> {
    if scores.is_empty() {
        return Vec::new();
    }
    let mut ranked: Vec<ScoredRow> = scores
        .iter()
        .enumerate()
        .map(|(row, score)| ScoredRow { row, score: *score })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(clamp_k(k, scores.len()));
    ranked
}
