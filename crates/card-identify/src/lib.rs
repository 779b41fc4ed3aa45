//! # card-identify
//!
//! Card identification on top of a built index.
//!
//! - `Identifier`: embed one query image and rank it against the index
//! - `discovery`: find the query images of a batch
//! - `staging`: run directories and per-query artifact copies
//! - `BatchOrchestrator`: identify many queries, stage the results and
//!   write one aggregate `results.json`

pub mod batch;
pub mod discovery;
pub mod error;
pub mod identify;
pub mod report;
pub mod staging;

pub use batch::{BatchConfig, BatchOrchestrator, BatchReport, FailedQuery, QueryFailure, QueryOutcome};
pub use discovery::{discover_queries, is_supported, QuerySource, SUPPORTED_EXTENSIONS};
pub use error::IdentifyError;
pub use identify::{IdentifyResult, Identifier};
pub use report::{write_results, QueryResult};
pub use staging::{run_id_for, RunLayout, RESULTS_FILE};
