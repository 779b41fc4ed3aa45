//! End-to-end test infrastructure for cardmatch.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering the catalog-to-index-to-identification pipeline. Reference
//! images are served by an in-memory fetcher and embedded with the
//! deterministic mock embedder, so no network or model is needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use card_embeddings::{MockImageEmbedder, SharedEmbedder};
use card_identify::{BatchConfig, BatchOrchestrator, Identifier};
use card_index::{BuildConfig, BuildReport, CardIndex, IndexBuilder, InMemoryFetcher};
use card_types::CardRecord;

/// Embedding dimension used by every harness component
pub const EMBED_DIM: usize = 32;

/// Shared test harness for E2E tests.
///
/// Lays out a temp directory the way a real deployment would:
/// `refs/`, `queries/`, `results/` and `index/index.cmx`.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub root: PathBuf,
    pub ref_dir: PathBuf,
    pub query_dir: PathBuf,
    pub results_root: PathBuf,
    pub index_path: PathBuf,
}

impl TestHarness {
    /// Create a new test harness with empty reference and query directories.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();

        let ref_dir = root.join("refs");
        let query_dir = root.join("queries");
        std::fs::create_dir_all(&ref_dir).expect("Failed to create ref dir");
        std::fs::create_dir_all(&query_dir).expect("Failed to create query dir");

        Self {
            _temp_dir: temp_dir,
            results_root: root.join("results"),
            index_path: root.join("index").join("index.cmx"),
            root,
            ref_dir,
            query_dir,
        }
    }

    /// Write a file relative to the harness root and return its path.
    pub fn write_file(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, contents).expect("Failed to write file");
        path
    }

    /// Write a query image into the query directory.
    pub fn write_query(&self, name: &str, contents: &[u8]) -> PathBuf {
        self.write_file(&format!("queries/{}", name), contents)
    }

    /// Embedder shared by the builder and the identifiers.
    pub fn embedder(&self) -> SharedEmbedder {
        SharedEmbedder::new(MockImageEmbedder::new(EMBED_DIM), 2)
    }

    /// Index builder writing references into `ref_dir`.
    pub fn builder(&self, fetcher: InMemoryFetcher, workers: usize) -> IndexBuilder<InMemoryFetcher> {
        IndexBuilder::new(
            fetcher,
            self.embedder(),
            BuildConfig {
                ref_dir: self.ref_dir.clone(),
                limit: None,
                workers,
            },
        )
    }

    /// Build the index at `index_path`.
    pub async fn build_index(
        &self,
        fetcher: InMemoryFetcher,
        records: Vec<CardRecord>,
    ) -> BuildReport {
        self.builder(fetcher, 2)
            .build_to(records, &self.index_path, &CancellationToken::new())
            .await
            .expect("Index build failed")
    }

    /// Identifier over the index at `index_path`.
    pub fn identifier(&self) -> Identifier {
        let index = CardIndex::open(&self.index_path).expect("Failed to open index");
        Identifier::new(Arc::new(index), self.embedder())
    }

    /// Batch orchestrator over the index at `index_path`.
    pub fn orchestrator(&self, top_k: usize, workers: usize) -> BatchOrchestrator {
        BatchOrchestrator::new(
            self.identifier(),
            BatchConfig {
                ref_dir: self.ref_dir.clone(),
                results_root: self.results_root.clone(),
                top_k,
                workers,
                fail_fast: false,
            },
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Image bytes served for `card_id`; distinct cards get distinct embeddings.
pub fn card_image(card_id: &str) -> Vec<u8> {
    format!("reference scan of card {} / front face", card_id).into_bytes()
}

/// Catalog records `(card_id, image_url)` with no extra fields.
pub fn records(rows: &[(&str, &str)]) -> Vec<CardRecord> {
    rows.iter()
        .map(|(id, url)| CardRecord::new(*id, *url))
        .collect()
}

/// Fetcher serving `card_image(card_id)` at each record's URL.
pub fn stub_fetcher(records: &[CardRecord]) -> InMemoryFetcher {
    records.iter().fold(InMemoryFetcher::new(), |fetcher, record| {
        fetcher.with_image(record.image_url.clone(), card_image(&record.card_id))
    })
}

/// Random image bytes that embed to a non-degenerate vector.
pub fn random_image(len: usize) -> Vec<u8> {
    (0..len).map(|_| rand::random_range(1..=255u8)).collect()
}

/// Names of the entries in `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read dir")
        .map(|entry| {
            entry
                .expect("Failed to read dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}
