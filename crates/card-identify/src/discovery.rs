//! Query image discovery.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::IdentifyError;

/// Query image extensions, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

/// Where batch queries come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// One image
    File(PathBuf),
    /// Every supported image directly inside a directory
    Dir(PathBuf),
}

/// Whether `path` has a supported image extension.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Resolve a query source to the images to identify, in processing order.
///
/// A directory yields its direct child files with supported extensions,
/// sorted by file name; subdirectories are not descended into.
pub fn discover_queries(source: &QuerySource) -> Result<Vec<PathBuf>, IdentifyError> {
    match source {
        QuerySource::File(path) => {
            if !path.is_file() {
                return Err(IdentifyError::QueryNotFound(path.clone()));
            }
            if !is_supported(path) {
                return Err(IdentifyError::UnsupportedExtension(path.clone()));
            }
            Ok(vec![path.clone()])
        }
        QuerySource::Dir(dir) => {
            if !dir.is_dir() {
                return Err(IdentifyError::QueryDirNotFound(dir.clone()));
            }

            let mut queries = Vec::new();
            for entry in WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(std::io::Error::from)?;
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if is_supported(path) {
                    queries.push(path.to_path_buf());
                } else {
                    debug!(path = %path.display(), "Skipping unsupported file");
                }
            }

            if queries.is_empty() {
                return Err(IdentifyError::NoQueryImages(dir.clone()));
            }
            Ok(queries)
        }
    }
}
