//! Aggregate batch results document.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IdentifyError;
use crate::identify::IdentifyResult;

/// One entry of `results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// File name of the query image
    pub query_image: String,
    #[serde(flatten)]
    pub result: IdentifyResult,
}

impl QueryResult {
    pub fn new(query: &Path, result: IdentifyResult) -> Self {
        let query_image = query
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| query.display().to_string());
        Self {
            query_image,
            result,
        }
    }
}

/// Write the aggregate document as pretty-printed JSON.
pub fn write_results(path: &Path, results: &[QueryResult]) -> Result<(), IdentifyError> {
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)?;
    Ok(())
}
