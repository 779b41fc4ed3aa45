//! Process-wide embedder handle.
//!
//! The model is constructed once per process and handed to every
//! component through a `SharedEmbedder`. Clones share the same model and
//! the same concurrency budget. Calls run on tokio's blocking pool so
//! inference never stalls the async workers, and a semaphore caps how many
//! run at once (1 serializes access, e.g. for a single accelerator).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::EmbeddingError;
use crate::model::{Embedding, ImageEmbedder, ModelInfo};

/// Shared, concurrency-bounded embedder.
#[derive(Clone)]
pub struct SharedEmbedder {
    inner: Arc<dyn ImageEmbedder>,
    permits: Arc<Semaphore>,
    parallelism: usize,
}

impl std::fmt::Debug for SharedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEmbedder")
            .field("model", &self.inner.info().name)
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

impl SharedEmbedder {
    /// Wrap an embedder, allowing at most `parallelism` concurrent calls.
    pub fn new(embedder: impl ImageEmbedder + 'static, parallelism: usize) -> Self {
        Self::from_arc(Arc::new(embedder), parallelism)
    }

    pub fn from_arc(embedder: Arc<dyn ImageEmbedder>, parallelism: usize) -> Self {
        let parallelism = parallelism.max(1);
        Self {
            inner: embedder,
            permits: Arc::new(Semaphore::new(parallelism)),
            parallelism,
        }
    }

    pub fn info(&self) -> &ModelInfo {
        self.inner.info()
    }

    /// Embed synchronously on the calling thread.
    pub fn embed_blocking(&self, path: &Path) -> Result<Embedding, EmbeddingError> {
        self.inner.embed_image(path)
    }

    /// Embed on the blocking pool, waiting for a free permit first.
    pub async fn embed(&self, path: PathBuf) -> Result<Embedding, EmbeddingError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| EmbeddingError::Task(e.to_string()))?;

        let embedder = Arc::clone(&self.inner);
        debug!(path = %path.display(), "Embedding image");
        tokio::task::spawn_blocking(move || embedder.embed_image(&path))
            .await
            .map_err(|e| EmbeddingError::Task(e.to_string()))?
    }
}
