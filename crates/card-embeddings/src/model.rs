//! Embedding model trait and types.
//!
//! Defines the interface for turning an image into a vector embedding.

use std::path::Path;

use crate::error::EmbeddingError;

/// Vector embedding, always normalized to unit length.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    /// Create an embedding from a raw model output, normalizing it.
    ///
    /// Fails if the vector is empty, has zero norm, or contains
    /// non-finite values; such vectors are rejected rather than stored.
    pub fn try_new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.is_empty() {
            return Err(EmbeddingError::DegenerateEmbedding(
                "empty vector".to_string(),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::DegenerateEmbedding(
                "non-finite component".to_string(),
            ));
        }

        let norm = values
            .iter()
            .map(|v| f64::from(*v) * f64::from(*v))
            .sum::<f64>()
            .sqrt();
        if norm == 0.0 {
            return Err(EmbeddingError::DegenerateEmbedding("zero norm".to_string()));
        }

        let values = values
            .into_iter()
            .map(|v| (f64::from(v) / norm) as f32)
            .collect();
        Ok(Self { values })
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    /// Cosine similarity with another embedding, in [-1, 1].
    ///
    /// Both sides are unit length, so this is the dot product.
    pub fn cosine_similarity(&self, other: &Embedding) -> Result<f32, EmbeddingError> {
        if self.dimension() != other.dimension() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension(),
                actual: other.dimension(),
            });
        }
        Ok(dot(&self.values, &other.values))
    }
}

/// Dot product of two equal-length slices.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model name (e.g., "clip-vit-base-patch32")
    pub name: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Square input resolution in pixels
    pub image_size: usize,
}

/// Trait for image embedding models.
///
/// Implementations must be thread-safe (Send + Sync); a single instance is
/// built once per process and shared by every component.
pub trait ImageEmbedder: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Embed the image stored at `path`.
    fn embed_image(&self, path: &Path) -> Result<Embedding, EmbeddingError>;

    /// Embed several images.
    /// Default implementation calls embed_image() for each path.
    fn embed_images(&self, paths: &[&Path]) -> Vec<Result<Embedding, EmbeddingError>> {
        paths.iter().map(|path| self.embed_image(path)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_embedding_normalization() {
        let emb = Embedding::try_new(vec![3.0, 4.0]).unwrap();
        // 3-4-5 triangle: normalized should be [0.6, 0.8]
        assert!((emb.values()[0] - 0.6).abs() < 0.001);
        assert!((emb.values()[1] - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_zero_norm_rejected() {
        let err = Embedding::try_new(vec![0.0; 8]).unwrap_err();
        assert!(matches!(err, EmbeddingError::DegenerateEmbedding(_)));
    }

    #[test]
    fn test_empty_and_nan_rejected() {
        assert!(Embedding::try_new(vec![]).is_err());
        assert!(Embedding::try_new(vec![1.0, f32::NAN]).is_err());
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let emb1 = Embedding::try_new(vec![1.0, 0.0, 0.0]).unwrap();
        let emb2 = Embedding::try_new(vec![1.0, 0.0, 0.0]).unwrap();
        assert!((emb1.cosine_similarity(&emb2).unwrap() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let emb1 = Embedding::try_new(vec![1.0, 0.0]).unwrap();
        let emb2 = Embedding::try_new(vec![-1.0, 0.0]).unwrap();
        assert!((emb1.cosine_similarity(&emb2).unwrap() + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_dimension_mismatch() {
        let emb1 = Embedding::try_new(vec![1.0, 0.0]).unwrap();
        let emb2 = Embedding::try_new(vec![1.0, 0.0, 0.0]).unwrap();
        assert!(emb1.cosine_similarity(&emb2).is_err());
    }

    #[test]
    fn test_random_vectors_unit_norm_and_bounded_score() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let a: Vec<f32> = (0..64).map(|_| rng.random_range(-1.0..1.0)).collect();
            let b: Vec<f32> = (0..64).map(|_| rng.random_range(-1.0..1.0)).collect();
            let a = Embedding::try_new(a).unwrap();
            let b = Embedding::try_new(b).unwrap();

            let norm: f32 = a.values().iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);

            let score = a.cosine_similarity(&b).unwrap();
            assert_eq!(score, dot(a.values(), b.values()));
            assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&score));
        }
    }
}
