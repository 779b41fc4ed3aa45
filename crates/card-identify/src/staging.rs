//! Run directories and per-query artifact staging.
//!
//! A run looks like:
//!
//! ```text
//! <results_root>/run_20240101_120000/
//!     results.json
//!     <query stem>/
//!         <query file>
//!         closest/
//!             01_<card_id>_0.9731.png
//!             02_<card_id>_0.8812.png
//! ```

use std::collections::HashSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tracing::debug;

use card_index::MatchResult;
use card_types::record::{reference_image_path, REFERENCE_EXTENSION};
use card_types::safe_name;

use crate::error::IdentifyError;

/// Aggregate document written at the top of each run directory.
pub const RESULTS_FILE: &str = "results.json";

/// Per-query subdirectory holding copies of the ranked reference images.
pub const CLOSEST_DIR: &str = "closest";

/// Run identifier for a run started at `time` (second resolution).
pub fn run_id_for<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    time.format("run_%Y%m%d_%H%M%S").to_string()
}

/// A freshly created run directory.
#[derive(Debug, Clone)]
pub struct RunLayout {
    run_id: String,
    run_dir: PathBuf,
}

impl RunLayout {
    /// Create `<results_root>/<run_id>`.
    ///
    /// The run directory must not exist yet; an existing one is never reused.
    pub fn create(results_root: &Path, run_id: &str) -> Result<Self, IdentifyError> {
        std::fs::create_dir_all(results_root)?;
        let run_dir = results_root.join(run_id);
        match std::fs::create_dir(&run_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(IdentifyError::RunExists(run_dir));
            }
            Err(e) => return Err(e.into()),
        }
        debug!(run_dir = %run_dir.display(), "Created run directory");
        Ok(Self {
            run_id: run_id.to_string(),
            run_dir,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn results_path(&self) -> PathBuf {
        self.run_dir.join(RESULTS_FILE)
    }

    /// Assign each query its own subdirectory, in order.
    ///
    /// Names come from the sanitized file stem; a name already taken gets a
    /// `_2`, `_3`, ... suffix. The aggregate document's name is never handed
    /// out.
    pub fn query_dirs(&self, queries: &[PathBuf]) -> Vec<PathBuf> {
        let mut taken = HashSet::from([RESULTS_FILE.to_string()]);
        queries
            .iter()
            .map(|query| {
                let stem = query
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let base = safe_name(&stem, "query");

                let mut name = base.clone();
                let mut suffix = 2;
                while !taken.insert(name.clone()) {
                    name = format!("{}_{}", base, suffix);
                    suffix += 1;
                }
                self.run_dir.join(name)
            })
            .collect()
    }
}

/// File name of a staged reference copy: rank, card id and score.
pub fn staged_reference_name(result: &MatchResult) -> String {
    format!(
        "{:02}_{}_{:.4}.{}",
        result.rank,
        safe_name(&result.card_id, "card"),
        result.score,
        REFERENCE_EXTENSION
    )
}

/// Copy a query and its ranked reference images into `query_dir`.
///
/// References missing from `ref_dir` are left out of the staging area.
/// Returns the number of reference images copied.
pub async fn stage_query(
    query_dir: &Path,
    query: &Path,
    matches: &[MatchResult],
    ref_dir: &Path,
) -> std::io::Result<usize> {
    let closest = query_dir.join(CLOSEST_DIR);
    tokio::fs::create_dir(query_dir).await?;
    tokio::fs::create_dir(&closest).await?;

    let query_name = query
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("query"));
    tokio::fs::copy(query, query_dir.join(query_name)).await?;

    let mut staged = 0;
    for result in matches {
        let reference = reference_image_path(ref_dir, &result.card_id);
        if !tokio::fs::try_exists(&reference).await.unwrap_or(false) {
            debug!(
                card_id = %result.card_id,
                path = %reference.display(),
                "Reference image missing, not staged"
            );
            continue;
        }
        tokio::fs::copy(&reference, closest.join(staged_reference_name(result))).await?;
        staged += 1;
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn matched(card_id: &str, score: f32, rank: usize) -> MatchResult {
        MatchResult {
            card_id: card_id.to_string(),
            score,
            rank,
            metadata: None,
        }
    }

    #[test]
    fn test_run_id_format() {
        let time = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(run_id_for(&time), "run_20240309_070501");
    }

    #[test]
    fn test_existing_run_dir_is_not_reused() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("results");
        RunLayout::create(&root, "run_1").unwrap();

        let err = RunLayout::create(&root, "run_1").unwrap_err();
        assert!(matches!(err, IdentifyError::RunExists(_)));
    }

    #[test]
    fn test_query_dirs_are_unique() {
        let temp = TempDir::new().unwrap();
        let layout = RunLayout::create(temp.path(), "run").unwrap();
        let dirs = layout.query_dirs(&[
            PathBuf::from("q/card 1.png"),
            PathBuf::from("q/card_1.jpg"),
            PathBuf::from("q/card?1.webp"),
            PathBuf::from("q/..png"),
        ]);
        let names: Vec<_> = dirs
            .iter()
            .map(|d| d.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["card_1", "card_1_2", "card_1_3", "query"]);
        assert!(dirs.iter().all(|d| d.parent() == Some(layout.run_dir())));
    }

    #[test]
    fn test_query_dir_never_takes_results_file() {
        let temp = TempDir::new().unwrap();
        let layout = RunLayout::create(temp.path(), "run").unwrap();
        let dirs = layout.query_dirs(&[PathBuf::from("q/results.json.png")]);

        assert_eq!(dirs, vec![layout.run_dir().join("results.json_2")]);
        assert_ne!(dirs[0], layout.results_path());
    }

    #[test]
    fn test_staged_reference_name() {
        assert_eq!(staged_reference_name(&matched("B", 0.98765, 1)), "01_B_0.9877.png");
        assert_eq!(
            staged_reference_name(&matched("x/y", -0.5, 12)),
            "12_x_y_-0.5000.png"
        );
    }

    #[tokio::test]
    async fn test_stage_query_skips_missing_references() {
        let temp = TempDir::new().unwrap();
        let ref_dir = temp.path().join("refs");
        std::fs::create_dir(&ref_dir).unwrap();
        std::fs::write(ref_dir.join("A.png"), b"ref-a").unwrap();

        let query = temp.path().join("photo.jpg");
        std::fs::write(&query, b"query-bytes").unwrap();

        let query_dir = temp.path().join("run/photo");
        std::fs::create_dir(temp.path().join("run")).unwrap();
        let staged = stage_query(
            &query_dir,
            &query,
            &[matched("A", 0.9, 1), matched("Z", 0.1, 2)],
            &ref_dir,
        )
        .await
        .unwrap();

        assert_eq!(staged, 1);
        assert_eq!(std::fs::read(query_dir.join("photo.jpg")).unwrap(), b"query-bytes");
        assert_eq!(
            std::fs::read(query_dir.join("closest/01_A_0.9000.png")).unwrap(),
            b"ref-a"
        );
        assert_eq!(std::fs::read_dir(query_dir.join("closest")).unwrap().count(), 1);
    }
}
