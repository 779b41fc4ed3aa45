//! Catalog → index → identification E2E tests.
//!
//! Builds a real index artifact on disk from a catalog file, then opens it
//! the way the `identify` command does and checks the returned document.

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use card_identify::IdentifyResult;
use card_index::EmbeddingIndex;
use card_types::{load_catalog, read_catalog, reference_image_path};
use e2e_tests::{card_image, records, stub_fetcher, TestHarness, EMBED_DIM};

/// Three fetchable cards; querying with B's image identifies B.
#[tokio::test]
async fn test_three_card_catalog_identifies_b() {
    let harness = TestHarness::new();
    let catalog = harness.write_file(
        "cards.json",
        br#"[
            {"card_id": "A", "image_url": "u1"},
            {"card_id": "B", "image_url": "u2"},
            {"card_id": "C", "image_url": "u3"}
        ]"#,
    );
    let records = read_catalog(&catalog).unwrap();
    let fetcher = stub_fetcher(&records);

    let report = harness.build_index(fetcher, records).await;
    assert_eq!(report.indexed, 3);
    assert_eq!(report.failed, 0);

    let artifact = EmbeddingIndex::load(&harness.index_path).unwrap();
    assert_eq!(artifact.card_ids, vec!["A", "B", "C"]);
    assert_eq!(artifact.shape, vec![3, EMBED_DIM]);

    let query = harness.write_query("photo_of_b.jpg", &card_image("B"));
    let identifier = harness.identifier();
    for k in [1usize, 2, 3, 5] {
        let result = identifier.identify(&query, k).await.unwrap();
        assert_eq!(result.best_card_id, "B");
        assert_eq!(result.top_k.len(), k.min(3));
        assert_eq!(result.top_k[0].card_id, "B");
        assert!((result.score - 1.0).abs() < 1e-5, "score {}", result.score);
        for pair in result.top_k.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}

/// Every card's own reference image ranks itself first.
#[tokio::test]
async fn test_identity_round_trip_for_every_card() {
    let harness = TestHarness::new();
    let records = records(&[("A", "u1"), ("B", "u2"), ("C", "u3"), ("D", "u4")]);
    harness
        .build_index(stub_fetcher(&records), records.clone())
        .await;

    let identifier = harness.identifier();
    for record in &records {
        let reference = harness.ref_dir.join(format!("{}.png", record.card_id));
        let result = identifier.identify(&reference, 4).await.unwrap();
        assert_eq!(result.best_card_id, record.card_id);
        assert!((result.score - 1.0).abs() < 1e-5);
    }
}

/// CSV catalog rows come back verbatim, in column order, as `source_row`.
#[tokio::test]
async fn test_csv_metadata_is_returned_as_source_row() {
    let harness = TestHarness::new();
    let catalog = harness.write_file(
        "cards.csv",
        b"card_id,name,set,image_url,price\nsv1-25,Pikachu,Scarlet & Violet,http://img/25,\nsv1-26,Raichu,Scarlet & Violet,http://img/26,1.50\n",
    );
    let records = read_catalog(&catalog).unwrap();
    harness
        .build_index(stub_fetcher(&records), records)
        .await;

    let query = harness.write_query("raichu.png", &card_image("sv1-26"));
    let result = harness.identifier().identify(&query, 1).await.unwrap();

    assert_eq!(result.best_card_id, "sv1-26");
    assert_eq!(
        result.source_row,
        Some(json!({
            "card_id": "sv1-26",
            "name": "Raichu",
            "set": "Scarlet & Violet",
            "image_url": "http://img/26",
            "price": "1.50"
        }))
    );
    let serialized = serde_json::to_string(&result.source_row).unwrap();
    assert!(serialized.starts_with(r#"{"card_id":"sv1-26","name":"Raichu""#));

    let document: IdentifyResult =
        serde_json::from_str(&serde_json::to_string(&result).unwrap()).unwrap();
    assert_eq!(document.best_card_id, result.best_card_id);
}

/// Concurrent builds keep catalog order in the artifact.
#[tokio::test]
async fn test_concurrent_build_preserves_catalog_order() {
    let harness = TestHarness::new();
    let ids: Vec<String> = (0..24).map(|i| format!("card-{:02}", i)).collect();
    let rows: Vec<(&str, String)> = ids
        .iter()
        .map(|id| (id.as_str(), format!("http://img/{}", id)))
        .collect();
    let rows: Vec<(&str, &str)> = rows.iter().map(|(id, url)| (*id, url.as_str())).collect();
    let records = records(&rows);

    let report = harness
        .builder(stub_fetcher(&records), 8)
        .build_to(records, &harness.index_path, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.indexed, 24);

    let artifact = EmbeddingIndex::load(&harness.index_path).unwrap();
    assert_eq!(artifact.card_ids, ids);
}

/// A rebuild replaces the artifact rather than extending it.
#[tokio::test]
async fn test_rebuild_replaces_index() {
    let harness = TestHarness::new();
    let first = records(&[("A", "u1"), ("B", "u2"), ("C", "u3")]);
    harness.build_index(stub_fetcher(&first), first).await;

    let second = records(&[("X", "u9")]);
    harness.build_index(stub_fetcher(&second), second).await;

    let artifact = EmbeddingIndex::load(&harness.index_path).unwrap();
    assert_eq!(artifact.card_ids, vec!["X"]);
}

/// Records whose reference image is already on disk are not fetched.
#[tokio::test]
async fn test_existing_references_are_reused() {
    let harness = TestHarness::new();
    harness.write_file("refs/A.png", &card_image("A"));
    let records = records(&[("A", "http://unreachable/a"), ("B", "u2")]);
    let fetcher = stub_fetcher(&records[1..]);

    let report = harness.build_index(fetcher, records).await;
    assert_eq!(report.indexed, 2);
    assert_eq!(report.failed, 0);
}

/// Ids that sanitize to the same file name keep separate references, and a
/// row with a blank id is counted without stopping the build.
#[tokio::test]
async fn test_awkward_catalog_rows() {
    let harness = TestHarness::new();
    let catalog = harness.write_file(
        "cards.csv",
        b"card_id,image_url\nset1/7,u1\n,u2\nset1?7,u3\nset1_7,u4\n",
    );
    let catalog = load_catalog(&catalog).unwrap();
    let records: Vec<_> = catalog.records().cloned().collect();

    let report = harness
        .builder(stub_fetcher(&records), 3)
        .build_catalog_to(catalog, &harness.index_path, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.indexed, 3);
    assert_eq!(report.failed, 1);

    let identifier = harness.identifier();
    for id in ["set1/7", "set1?7", "set1_7"] {
        let reference = reference_image_path(&harness.ref_dir, id);
        assert!(reference.starts_with(&harness.ref_dir));
        let result = identifier.identify(&reference, 3).await.unwrap();
        assert_eq!(result.best_card_id, id);
        assert!((result.score - 1.0).abs() < 1e-5);
    }
}
