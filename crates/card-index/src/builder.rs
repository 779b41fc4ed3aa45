//! Index building.
//!
//! Turns a card catalog into a fresh `EmbeddingIndex`. Every record is
//! resolved to a local reference image (downloading it when absent) and
//! embedded. Download and embedding failures skip the record and are
//! counted; they never abort the build. Successful records keep catalog
//! order in the output regardless of how many run concurrently.
//!
//! Records sharing a card id share one reference file. Work on a given
//! file is serialized, so only the first such record downloads it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use card_embeddings::SharedEmbedder;
use card_types::{CardRecord, Catalog};

use crate::artifact::EmbeddingIndex;
use crate::error::IndexError;
use crate::fetch::ImageFetcher;

/// Index build configuration
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory holding one `.png` reference image per card id
    pub ref_dir: PathBuf,
    /// Only use the first `limit` catalog rows
    pub limit: Option<usize>,
    /// Records processed concurrently
    pub workers: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            ref_dir: PathBuf::from("data/refs"),
            limit: None,
            workers: 1,
        }
    }
}

/// Why a record was left out of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Reference image was absent and could not be downloaded
    Download(String),
    /// Reference image could not be embedded
    Embed(String),
    /// Catalog row could not be serialized
    Metadata(String),
    /// Catalog row had no usable identifier
    InvalidRow(String),
    /// Build was cancelled before the record started
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Download(e) => write!(f, "download failed: {}", e),
            SkipReason::Embed(e) => write!(f, "embedding failed: {}", e),
            SkipReason::Metadata(e) => write!(f, "metadata failed: {}", e),
            SkipReason::InvalidRow(e) => write!(f, "invalid catalog row: {}", e),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A record that did not make it into the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub card_id: String,
    /// URL or local path the failure relates to
    pub source: String,
    pub reason: SkipReason,
}

/// Per-record result of a build.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Indexed {
        card_id: String,
        vector: Vec<f32>,
        metadata_json: String,
    },
    Skipped(SkippedRecord),
}

/// Statistics from an index build
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Records written to the index
    pub indexed: usize,
    /// Records skipped because of an invalid row, download or embedding failure
    pub failed: usize,
    /// Records never started because the build was cancelled
    pub cancelled: usize,
    /// Dimension of the written vectors (0 for an empty index)
    pub dimension: usize,
    /// Every skipped record with its reason
    pub skipped: Vec<SkippedRecord>,
}

impl BuildReport {
    fn record_skip(&mut self, skipped: SkippedRecord) {
        if skipped.reason == SkipReason::Cancelled {
            self.cancelled += 1;
        } else {
            self.failed += 1;
        }
        self.skipped.push(skipped);
    }
}

/// Distinguishes temp files of concurrent downloads within one process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Builds an index from catalog records.
pub struct IndexBuilder<F: ImageFetcher> {
    fetcher: F,
    embedder: SharedEmbedder,
    config: BuildConfig,
    path_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl<F: ImageFetcher> IndexBuilder<F> {
    pub fn new(fetcher: F, embedder: SharedEmbedder, config: BuildConfig) -> Self {
        Self {
            fetcher,
            embedder,
            config,
            path_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build from a loaded catalog and write the index to `out`.
    ///
    /// `limit` applies to catalog rows, valid or not. Rejected rows inside
    /// the limit are counted as failed records.
    pub async fn build_catalog_to(
        &self,
        mut catalog: Catalog,
        out: &Path,
        cancel: &CancellationToken,
    ) -> Result<BuildReport, IndexError> {
        if let Some(limit) = self.config.limit {
            catalog.truncate(limit);
        }
        let (records, rejected) = catalog.into_parts();
        let (index, mut report) = self.build(records, cancel).await?;
        for bad in rejected {
            report.record_skip(SkippedRecord {
                card_id: String::new(),
                source: format!("row {}", bad.row),
                reason: SkipReason::InvalidRow(bad.reason),
            });
        }
        index.save(out)?;
        Ok(report)
    }

    /// Build the index and write it to `out`.
    ///
    /// The artifact is written even when no record succeeded (an empty,
    /// 0×0 index) and when the build was cancelled part way.
    pub async fn build_to(
        &self,
        records: Vec<CardRecord>,
        out: &Path,
        cancel: &CancellationToken,
    ) -> Result<BuildReport, IndexError> {
        let (index, report) = self.build(records, cancel).await?;
        index.save(out)?;
        Ok(report)
    }

    /// Build the index in memory.
    pub async fn build(
        &self,
        records: Vec<CardRecord>,
        cancel: &CancellationToken,
    ) -> Result<(EmbeddingIndex, BuildReport), IndexError> {
        std::fs::create_dir_all(&self.config.ref_dir)?;

        let records: Vec<CardRecord> = match self.config.limit {
            Some(limit) => records.into_iter().take(limit).collect(),
            None => records,
        };
        info!(
            records = records.len(),
            workers = self.config.workers,
            ref_dir = %self.config.ref_dir.display(),
            "Building index"
        );

        let outcomes: Vec<ItemOutcome> = stream::iter(records)
            .map(|record| self.process_record(record, cancel))
            .buffered(self.config.workers.max(1))
            .collect()
            .await;

        let mut report = BuildReport::default();
        let mut card_ids = Vec::new();
        let mut vectors: Vec<Vec<f32>> = Vec::new();
        let mut metadata = Vec::new();

        for outcome in outcomes {
            match outcome {
                ItemOutcome::Indexed {
                    card_id,
                    vector,
                    metadata_json,
                } => {
                    if let Some(first) = vectors.first() {
                        if first.len() != vector.len() {
                            warn!(
                                card_id = %card_id,
                                expected = first.len(),
                                actual = vector.len(),
                                "Embedding dimension changed mid-build, skipping record"
                            );
                            report.record_skip(SkippedRecord {
                                source: card_id.clone(),
                                card_id,
                                reason: SkipReason::Embed(format!(
                                    "dimension {} does not match {}",
                                    vector.len(),
                                    first.len()
                                )),
                            });
                            continue;
                        }
                    }
                    card_ids.push(card_id);
                    vectors.push(vector);
                    metadata.push(metadata_json);
                }
                ItemOutcome::Skipped(skipped) => report.record_skip(skipped),
            }
        }

        report.indexed = card_ids.len();
        report.dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        let index = EmbeddingIndex::from_rows(card_ids, vectors, metadata)?;

        info!(
            indexed = report.indexed,
            failed = report.failed,
            cancelled = report.cancelled,
            "{} indexed, {} failed",
            report.indexed,
            report.failed
        );
        Ok((index, report))
    }

    /// Resolve, embed and serialize one record.
    async fn process_record(&self, record: CardRecord, cancel: &CancellationToken) -> ItemOutcome {
        if cancel.is_cancelled() {
            return ItemOutcome::Skipped(SkippedRecord {
                source: record.image_url.clone(),
                card_id: record.card_id,
                reason: SkipReason::Cancelled,
            });
        }

        let image_path = record.reference_path(&self.config.ref_dir);
        {
            let lock = self.path_lock(&image_path);
            let _guard = lock.lock().await;
            if !image_path.exists() {
                if let Err(e) = self.download(&record.image_url, &image_path).await {
                    warn!(
                        card_id = %record.card_id,
                        url = %record.image_url,
                        error = %e,
                        "Failed to download reference image"
                    );
                    return ItemOutcome::Skipped(SkippedRecord {
                        source: record.image_url.clone(),
                        card_id: record.card_id,
                        reason: SkipReason::Download(e),
                    });
                }
            }
        }

        let embedding = match self.embedder.embed(image_path.clone()).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(
                    card_id = %record.card_id,
                    path = %image_path.display(),
                    error = %e,
                    "Failed to embed reference image"
                );
                return ItemOutcome::Skipped(SkippedRecord {
                    source: image_path.display().to_string(),
                    card_id: record.card_id,
                    reason: SkipReason::Embed(e.to_string()),
                });
            }
        };

        match record.metadata_json() {
            Ok(metadata_json) => {
                debug!(card_id = %record.card_id, "Indexed record");
                ItemOutcome::Indexed {
                    card_id: record.card_id,
                    vector: embedding.into_values(),
                    metadata_json,
                }
            }
            Err(e) => ItemOutcome::Skipped(SkippedRecord {
                source: record.card_id.clone(),
                card_id: record.card_id,
                reason: SkipReason::Metadata(e.to_string()),
            }),
        }
    }

    /// Async lock guarding one reference file.
    fn path_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .path_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Fetch `url` into `dest`, via a temp file so a failed write never
    /// leaves a truncated image at the final path.
    async fn download(&self, url: &str, dest: &Path) -> Result<(), String> {
        let bytes = self.fetcher.fetch(url).await.map_err(|e| e.to_string())?;

        let mut tmp_name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(format!(
            ".{}.{}.part",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let tmp = dest.with_file_name(tmp_name);

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| format!("write {}: {}", tmp.display(), e))?;
        if let Err(e) = tokio::fs::rename(&tmp, dest).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(format!("rename to {}: {}", dest.display(), e));
        }

        debug!(url, path = %dest.display(), bytes = bytes.len(), "Saved reference image");
        Ok(())
    }
}
