//! Command implementations for cardmatch.
//!
//! Handles:
//! - build-index: read the catalog, fetch and embed reference images, write the index
//! - identify: match one query image against the index
//! - batch: match many query images and stage a run directory
//!
//! JSON results go to stdout; logs go to stderr.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use card_embeddings::{ClipEmbedder, ModelCache, SharedEmbedder};
use card_identify::{
    BatchConfig, BatchOrchestrator, BatchReport, Identifier, IdentifyError, QuerySource,
};
use card_index::{BuildConfig, CardIndex, FetchConfig, HttpImageFetcher, IndexBuilder};
use card_types::{load_catalog, Settings};

use crate::cli::{BatchArgs, BuildIndexArgs, IdentifyArgs};

/// Load configuration and apply the global CLI overrides.
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(log_level) = log_level {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the stderr tracing subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_logging(log_level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Logging already initialized");
    }
}

/// Token cancelled on Ctrl+C.
///
/// Cancellation stops new items from starting; in-flight items finish and
/// the partial index or results document is still written.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, finishing in-flight work...");
                trigger.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
        }
    });
    token
}

/// Load the CLIP embedder once for this process.
async fn load_embedder(settings: &Settings) -> Result<SharedEmbedder> {
    let cache = ModelCache::with_optional_dir(
        settings.model_cache_dir(),
        settings.model.repo_id.clone(),
        settings.model.revision.clone(),
    );
    let embedder = tokio::task::spawn_blocking(move || ClipEmbedder::load(&cache))
        .await
        .context("Embedder loading task failed")?
        .context("Failed to load embedding model")?;
    Ok(SharedEmbedder::new(embedder, settings.embed_parallelism))
}

/// Build the index from a catalog.
pub async fn build_index(
    mut settings: Settings,
    args: BuildIndexArgs,
    cancel: CancellationToken,
) -> Result<()> {
    if let Some(catalog) = args.catalog {
        settings.catalog_path = catalog;
    }
    if let Some(ref_dir) = args.ref_dir {
        settings.ref_dir = ref_dir;
    }
    if let Some(out) = args.out {
        settings.index_path = out;
    }
    if let Some(workers) = args.workers {
        settings.workers = workers;
    }
    settings.validate()?;

    let catalog_path = settings.catalog_path();
    let catalog = load_catalog(&catalog_path)
        .with_context(|| format!("Failed to read catalog {}", catalog_path.display()))?;

    let fetcher = HttpImageFetcher::new(FetchConfig::from(&settings.fetch))
        .context("Failed to create HTTP client")?;
    let embedder = load_embedder(&settings).await?;

    let builder = IndexBuilder::new(
        fetcher,
        embedder,
        BuildConfig {
            ref_dir: settings.ref_dir(),
            limit: args.limit,
            workers: settings.workers,
        },
    );

    let out = settings.index_path();
    let report = builder
        .build_catalog_to(catalog, &out, &cancel)
        .await
        .context("Index build failed")?;

    let summary = serde_json::json!({
        "indexed": report.indexed,
        "failed": report.failed,
        "cancelled": report.cancelled,
        "dimension": report.dimension,
        "output": out.display().to_string(),
        "skipped": report.skipped,
    });
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

/// Identify one query image.
pub async fn identify(mut settings: Settings, args: IdentifyArgs) -> Result<()> {
    if let Some(index) = args.index {
        settings.index_path = index;
    }
    let top_k = args.top_k.unwrap_or(settings.top_k);

    let query = PathBuf::from(shellexpand_path(&args.query));
    if !query.is_file() {
        anyhow::bail!("Query image not found: {}", query.display());
    }

    let index = open_index(&settings)?;
    let embedder = load_embedder(&settings).await?;
    let identifier = Identifier::new(index, embedder);

    let result = identifier.identify(&query, top_k).await?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

/// Identify a batch of query images and stage a run directory.
pub async fn run_batch(
    mut settings: Settings,
    args: BatchArgs,
    cancel: CancellationToken,
) -> Result<()> {
    if let Some(index) = args.index {
        settings.index_path = index;
    }
    if let Some(ref_dir) = args.ref_dir {
        settings.ref_dir = ref_dir;
    }
    if let Some(results_root) = args.results_root {
        settings.results_root = results_root;
    }
    if let Some(query_dir) = args.query_dir {
        settings.query_dir = query_dir;
    }
    if let Some(workers) = args.workers {
        settings.workers = workers;
    }
    settings.validate()?;

    let source = match args.query {
        Some(query) => QuerySource::File(PathBuf::from(shellexpand_path(&query))),
        None => QuerySource::Dir(settings.query_dir()),
    };

    let index = open_index(&settings)?;
    let embedder = load_embedder(&settings).await?;
    let orchestrator = BatchOrchestrator::new(
        Identifier::new(index, embedder),
        BatchConfig {
            ref_dir: settings.ref_dir(),
            results_root: settings.results_root(),
            top_k: args.top_k.unwrap_or(settings.top_k),
            workers: settings.workers,
            fail_fast: args.fail_fast,
        },
    );

    let outcome = orchestrator.run(&source, &cancel).await;
    emit_batch(outcome, &mut std::io::stdout().lock())
}

/// Print the compact results document for a batch outcome.
///
/// A fail-fast abort still prints the queries identified before it, then
/// returns the abort error.
fn emit_batch(outcome: Result<BatchReport, IdentifyError>, out: &mut impl Write) -> Result<()> {
    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            if let IdentifyError::BatchAborted { partial, .. } = &err {
                writeln!(out, "{}", serde_json::to_string(partial)?)?;
            }
            return Err(err.into());
        }
    };
    if !report.failed.is_empty() {
        warn!(
            failed = report.failed.len(),
            "Some queries were not identified; see log for details"
        );
    }
    info!(results = %report.results_path.display(), "Wrote results");
    writeln!(out, "{}", serde_json::to_string(&report.results)?)?;
    Ok(())
}

fn open_index(settings: &Settings) -> Result<Arc<CardIndex>> {
    let path = settings.index_path();
    let index = CardIndex::open(&path)
        .with_context(|| format!("Failed to open index {}", path.display()))?;
    Ok(Arc::new(index))
}

fn shellexpand_path(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}
