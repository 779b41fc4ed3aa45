//! Batch identification E2E tests.
//!
//! Runs the orchestrator over a query directory against an index built by
//! the harness and inspects the staged run directory.

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use card_identify::{QueryResult, QuerySource, RESULTS_FILE};
use e2e_tests::{card_image, dir_entries, records, stub_fetcher, TestHarness};

async fn harness_with_index() -> TestHarness {
    let harness = TestHarness::new();
    let records = records(&[("A", "u1"), ("B", "u2"), ("C", "u3")]);
    harness
        .build_index(stub_fetcher(&records), records)
        .await;
    harness
}

/// Two supported images and one unsupported file: two per-query
/// directories plus the aggregate document with two entries.
#[tokio::test]
async fn test_batch_over_mixed_directory() {
    let harness = harness_with_index().await;
    harness.write_query("b_photo.png", &card_image("C"));
    harness.write_query("a_photo.JPEG", &card_image("A"));
    harness.write_query("notes.txt", &card_image("B"));

    let report = harness
        .orchestrator(3, 2)
        .run_as(
            "run_20240101_120000",
            &QuerySource::Dir(harness.query_dir.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        dir_entries(&report.run_dir),
        vec!["a_photo", "b_photo", RESULTS_FILE]
    );

    let written: Vec<QueryResult> =
        serde_json::from_str(&std::fs::read_to_string(&report.results_path).unwrap()).unwrap();
    let summary: Vec<(&str, &str, usize)> = written
        .iter()
        .map(|r| {
            (
                r.query_image.as_str(),
                r.result.best_card_id.as_str(),
                r.result.top_k.len(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![("a_photo.JPEG", "A", 3), ("b_photo.png", "C", 3)]
    );

    let staged = dir_entries(&report.run_dir.join("a_photo"));
    assert_eq!(staged, vec!["a_photo.JPEG", "closest"]);
    let closest = dir_entries(&report.run_dir.join("a_photo/closest"));
    assert_eq!(closest.len(), 3);
    assert!(closest[0].starts_with("01_A_1.0000"), "{:?}", closest);
    assert!(closest[1].starts_with("02_"));
    assert!(closest[2].starts_with("03_"));
}

/// Missing reference images are left out of staging but stay in the document.
#[tokio::test]
async fn test_missing_reference_is_not_staged() {
    let harness = harness_with_index().await;
    std::fs::remove_file(harness.ref_dir.join("B.png")).unwrap();
    harness.write_query("query.png", &card_image("B"));

    let report = harness
        .orchestrator(3, 1)
        .run_as(
            "run_test",
            &QuerySource::Dir(harness.query_dir.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.results[0].result.best_card_id, "B");
    assert_eq!(report.results[0].result.top_k.len(), 3);
    let closest = dir_entries(&report.run_dir.join("query/closest"));
    assert_eq!(closest.len(), 2);
    assert!(closest.iter().all(|name| !name.contains("_B_")));
}

/// A single query path runs as a batch of one.
#[tokio::test]
async fn test_batch_single_query() {
    let harness = harness_with_index().await;
    let query = harness.write_query("single.bmp", &card_image("C"));

    let report = harness
        .orchestrator(5, 1)
        .run_as("run_single", &QuerySource::File(query), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].result.best_card_id, "C");
    assert_eq!(report.results[0].result.top_k.len(), 3);
    assert_eq!(dir_entries(&report.run_dir), vec![RESULTS_FILE, "single"]);
}

/// Queries that fail to embed are reported and skipped; the rest succeed.
#[tokio::test]
async fn test_failed_query_does_not_abort_batch() {
    let harness = harness_with_index().await;
    harness.write_query("1_empty.png", b"");
    harness.write_query("2_good.png", &card_image("A"));

    let report = harness
        .orchestrator(2, 2)
        .run_as(
            "run_test",
            &QuerySource::Dir(harness.query_dir.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].query.ends_with("1_empty.png"));
    assert_eq!(dir_entries(&report.run_dir), vec!["2_good", RESULTS_FILE]);
}

/// Two runs with distinct ids never share a directory.
#[tokio::test]
async fn test_runs_are_isolated() {
    let harness = harness_with_index().await;
    harness.write_query("q.png", &card_image("A"));
    let source = QuerySource::Dir(harness.query_dir.clone());
    let orchestrator = harness.orchestrator(1, 1);

    let first = orchestrator
        .run_as("run_1", &source, &CancellationToken::new())
        .await
        .unwrap();
    let second = orchestrator
        .run_as("run_2", &source, &CancellationToken::new())
        .await
        .unwrap();

    assert_ne!(first.run_dir, second.run_dir);
    assert_eq!(dir_entries(&harness.results_root), vec!["run_1", "run_2"]);
}
