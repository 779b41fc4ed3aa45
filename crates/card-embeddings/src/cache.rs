//! Model file caching.
//!
//! Downloads and caches CLIP weights from HuggingFace Hub.

use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::EmbeddingError;

/// Default model repository on HuggingFace
pub const DEFAULT_MODEL_REPO: &str = "openai/clip-vit-base-patch32";

/// Revision that carries safetensors weights
pub const DEFAULT_MODEL_REVISION: &str = "refs/pr/15";

/// Weights file name
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Model cache configuration
#[derive(Debug, Clone)]
pub struct ModelCache {
    /// Cache directory path
    pub cache_dir: PathBuf,
    /// Model repository ID
    pub repo_id: String,
    /// Repository revision
    pub revision: String,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            repo_id: DEFAULT_MODEL_REPO.to_string(),
            revision: DEFAULT_MODEL_REVISION.to_string(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("cardmatch")
        .join("models")
}

impl ModelCache {
    /// Create a new model cache with custom settings
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        repo_id: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            repo_id: repo_id.into(),
            revision: revision.into(),
        }
    }

    /// Build a cache rooted at `cache_dir`, or the platform cache dir if None.
    pub fn with_optional_dir(
        cache_dir: Option<PathBuf>,
        repo_id: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self::new(
            cache_dir.unwrap_or_else(default_cache_dir),
            repo_id,
            revision,
        )
    }

    /// Get the model directory path
    pub fn model_dir(&self) -> PathBuf {
        self.cache_dir.join(self.repo_id.replace('/', "_"))
    }

    /// Check if the weights are cached
    pub fn is_cached(&self) -> bool {
        self.weights_path().exists()
    }

    pub fn weights_path(&self) -> PathBuf {
        self.model_dir().join(WEIGHTS_FILE)
    }
}

/// Get or download the model weights, returning their local path.
pub fn get_or_download_model(cache: &ModelCache) -> Result<PathBuf, EmbeddingError> {
    if cache.is_cached() {
        debug!(path = ?cache.model_dir(), "Using cached model");
    } else {
        info!(repo = %cache.repo_id, revision = %cache.revision, "Downloading model weights...");
        download_weights(cache)?;
    }
    Ok(cache.weights_path())
}

/// Download the weights file from HuggingFace Hub
fn download_weights(cache: &ModelCache) -> Result<(), EmbeddingError> {
    use hf_hub::api::sync::Api;
    use hf_hub::{Repo, RepoType};

    let api = Api::new().map_err(|e| EmbeddingError::Download(e.to_string()))?;
    let repo = api.repo(Repo::with_revision(
        cache.repo_id.clone(),
        RepoType::Model,
        cache.revision.clone(),
    ));

    std::fs::create_dir_all(cache.model_dir())?;

    let source_path = repo
        .get(WEIGHTS_FILE)
        .map_err(|e| EmbeddingError::Download(format!("{}: {}", WEIGHTS_FILE, e)))?;

    let dest_path = cache.weights_path();
    std::fs::copy(&source_path, &dest_path)?;
    debug!(file = WEIGHTS_FILE, "Downloaded to {:?}", dest_path);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_default() {
        let cache = ModelCache::default();
        assert!(cache.cache_dir.to_string_lossy().contains("cardmatch"));
        assert_eq!(cache.repo_id, DEFAULT_MODEL_REPO);
    }

    #[test]
    fn test_is_cached_empty() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::new(temp.path(), "test/model", "main");
        assert!(!cache.is_cached());
        assert!(cache.model_dir().ends_with("test_model"));
    }

    #[test]
    fn test_is_cached_with_weights() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::new(temp.path(), "test/model", "main");
        std::fs::create_dir_all(cache.model_dir()).unwrap();
        std::fs::write(cache.weights_path(), b"weights").unwrap();
        assert!(cache.is_cached());
        assert_eq!(get_or_download_model(&cache).unwrap(), cache.weights_path());
    }
}
