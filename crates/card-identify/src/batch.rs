//! Batch identification.
//!
//! Identifies every discovered query against one shared index, stages the
//! query and its ranked reference images into a fresh run directory, and
//! writes a single `results.json` once all queries are done.
//!
//! A query that fails to embed, match or stage is logged and reported as
//! `QueryOutcome::Failed`; the rest of the batch carries on. With
//! `fail_fast` the first failure stops dispatch of further queries and the
//! run returns `IdentifyError::BatchAborted` after the partial document
//! has been written.

use std::path::PathBuf;

use chrono::Local;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::discovery::{discover_queries, QuerySource};
use crate::error::IdentifyError;
use crate::identify::Identifier;
use crate::report::{write_results, QueryResult};
use crate::staging::{run_id_for, stage_query, RunLayout};

/// Batch run configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Reference images to stage next to each query
    pub ref_dir: PathBuf,
    /// Parent of every run directory
    pub results_root: PathBuf,
    /// Matches kept per query
    pub top_k: usize,
    /// Queries processed concurrently
    pub workers: usize,
    /// Abort the batch on the first failed query
    pub fail_fast: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            ref_dir: PathBuf::from("data/refs"),
            results_root: PathBuf::from("data/results"),
            top_k: 5,
            workers: 1,
            fail_fast: false,
        }
    }
}

/// Why a query produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum QueryFailure {
    /// Embedding or matching failed
    Identify(String),
    /// Copying artifacts into the run directory failed
    Stage(String),
    /// Not started because the batch was cancelled or aborted
    Cancelled,
}

impl std::fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryFailure::Identify(e) => write!(f, "identification failed: {}", e),
            QueryFailure::Stage(e) => write!(f, "staging failed: {}", e),
            QueryFailure::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A query that did not make it into the results document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedQuery {
    pub query: PathBuf,
    pub reason: QueryFailure,
}

/// Per-query result of a batch.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Matched(QueryResult),
    Failed(FailedQuery),
}

/// Summary of a finished batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub results_path: PathBuf,
    /// Successful queries, in discovery order
    pub results: Vec<QueryResult>,
    /// Failed or cancelled queries, in discovery order
    pub failed: Vec<FailedQuery>,
}

impl BatchReport {
    pub fn cancelled(&self) -> usize {
        self.failed
            .iter()
            .filter(|f| f.reason == QueryFailure::Cancelled)
            .count()
    }
}

/// Runs batch identification against one loaded index.
pub struct BatchOrchestrator {
    identifier: Identifier,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(identifier: Identifier, config: BatchConfig) -> Self {
        Self { identifier, config }
    }

    /// Run a batch in a new run directory named after the current time.
    pub async fn run(
        &self,
        source: &QuerySource,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, IdentifyError> {
        self.run_as(&run_id_for(&Local::now()), source, cancel).await
    }

    /// Run a batch in `<results_root>/<run_id>`.
    pub async fn run_as(
        &self,
        run_id: &str,
        source: &QuerySource,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, IdentifyError> {
        if !self.config.ref_dir.is_dir() {
            return Err(IdentifyError::RefDirNotFound(self.config.ref_dir.clone()));
        }
        let queries = discover_queries(source)?;
        let layout = RunLayout::create(&self.config.results_root, run_id)?;
        let query_dirs = layout.query_dirs(&queries);

        info!(
            run_id,
            queries = queries.len(),
            workers = self.config.workers,
            top_k = self.config.top_k,
            "Starting batch"
        );

        // Fail-fast aborts through a child token so the caller's token is
        // left untouched.
        let stop = cancel.child_token();
        let outcomes: Vec<QueryOutcome> = stream::iter(queries.into_iter().zip(query_dirs))
            .map(|(query, query_dir)| self.process_query(query, query_dir, &stop))
            .buffered(self.config.workers.max(1))
            .collect()
            .await;

        let mut results = Vec::new();
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                QueryOutcome::Matched(result) => results.push(result),
                QueryOutcome::Failed(failure) => failed.push(failure),
            }
        }

        let results_path = layout.results_path();
        write_results(&results_path, &results)?;

        let report = BatchReport {
            run_id: layout.run_id().to_string(),
            run_dir: layout.run_dir().to_path_buf(),
            results_path,
            results,
            failed,
        };
        info!(
            run_dir = %report.run_dir.display(),
            matched = report.results.len(),
            failed = report.failed.len() - report.cancelled(),
            cancelled = report.cancelled(),
            "Batch finished"
        );

        if self.config.fail_fast {
            if let Some(first) = report
                .failed
                .iter()
                .find(|f| f.reason != QueryFailure::Cancelled)
            {
                return Err(IdentifyError::BatchAborted {
                    query: first.query.clone(),
                    reason: first.reason.to_string(),
                    results: report.results_path.clone(),
                    partial: report.results.clone(),
                });
            }
        }
        Ok(report)
    }

    async fn process_query(
        &self,
        query: PathBuf,
        query_dir: PathBuf,
        stop: &CancellationToken,
    ) -> QueryOutcome {
        if stop.is_cancelled() {
            return QueryOutcome::Failed(FailedQuery {
                query,
                reason: QueryFailure::Cancelled,
            });
        }

        let result = match self.identifier.identify(&query, self.config.top_k).await {
            Ok(result) => result,
            Err(e) => {
                warn!(query = %query.display(), error = %e, "Failed to identify query");
                return self.fail(query, QueryFailure::Identify(e.to_string()), stop);
            }
        };

        if let Err(e) = stage_query(&query_dir, &query, &result.top_k, &self.config.ref_dir).await
        {
            warn!(
                query = %query.display(),
                dir = %query_dir.display(),
                error = %e,
                "Failed to stage query results"
            );
            return self.fail(query, QueryFailure::Stage(e.to_string()), stop);
        }

        QueryOutcome::Matched(QueryResult::new(&query, result))
    }

    fn fail(&self, query: PathBuf, reason: QueryFailure, stop: &CancellationToken) -> QueryOutcome {
        if self.config.fail_fast {
            stop.cancel();
        }
        QueryOutcome::Failed(FailedQuery { query, reason })
    }
}
