//! Deterministic embedder for tests.
//!
//! Derives a vector from the raw file bytes instead of running a model:
//! identical files embed identically, and a file made only of zero bytes
//! (or an empty file) yields a zero vector, which is rejected as
//! degenerate just like a real model output would be.

use std::path::Path;

use crate::error::EmbeddingError;
use crate::model::{Embedding, ImageEmbedder, ModelInfo};

/// Byte-histogram embedder with no model behind it.
#[derive(Debug, Clone)]
pub struct MockImageEmbedder {
    info: ModelInfo,
}

impl MockImageEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "mock-byte-histogram".to_string(),
                dimension,
                image_size: 0,
            },
        }
    }
}

impl Default for MockImageEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

impl ImageEmbedder for MockImageEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed_image(&self, path: &Path) -> Result<Embedding, EmbeddingError> {
        let bytes = std::fs::read(path)?;
        let dim = self.info.dimension.max(1);

        let mut values = vec![0f32; dim];
        for (pos, byte) in bytes.iter().enumerate() {
            let slot = (pos * 31 + usize::from(*byte)) % dim;
            values[slot] += f32::from(*byte);
        }
        Embedding::try_new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_identical_bytes_identical_embedding() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.png");
        let b = temp.path().join("b.png");
        std::fs::write(&a, b"card-b").unwrap();
        std::fs::write(&b, b"card-b").unwrap();

        let embedder = MockImageEmbedder::default();
        let ea = embedder.embed_image(&a).unwrap();
        let eb = embedder.embed_image(&b).unwrap();
        assert_eq!(ea, eb);
        assert_eq!(ea.dimension(), 32);
    }

    #[test]
    fn test_zero_bytes_degenerate() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blank.png");
        std::fs::write(&path, [0u8; 16]).unwrap();

        let err = MockImageEmbedder::default().embed_image(&path).unwrap_err();
        assert!(matches!(err, EmbeddingError::DegenerateEmbedding(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = MockImageEmbedder::default()
            .embed_image(Path::new("/no/such/image.png"))
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::Io(_)));
    }
}
