mod helpers;

use cairn::config::SearchConfig;
use cairn::search::{HybridSearch, SearchError, SearchOptions};
use cairn::store::IndexStore;
use helpers::{chunk_record, file_meta, test_store, MockEmbedder};
use std::sync::Arc;

fn seeded_store(store: &IndexStore) {
    store
        .replace_file(
            "MEMORY.md",
            &[
                chunk_record("MEMORY.md", 1, 4, "deploy the service with cargo release on fridays"),
                chunk_record("MEMORY.md", 5, 8, "coffee coffee coffee: flat white, no sugar"),
                chunk_record("MEMORY.md", 9, 12, "the team meets for coffee on mondays"),
            ],
            &file_meta("MEMORY.md", "h", 3),
        )
        .unwrap();
}

fn search_config() -> SearchConfig {
    SearchConfig {
        min_score: 0.0,
        ..SearchConfig::default()
    }
}

#[tokio::test]
async fn hybrid_scores_are_weighted_sums_in_unit_range() {
    let store = test_store();
    seeded_store(&store);
    let search = HybridSearch::new(store, MockEmbedder::new(), search_config());

    let results = search
        .search("deploy the service with cargo release on fridays", SearchOptions::default())
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].start_line, 1);
    assert!((results[0].vector_score - 1.0).abs() < 1e-6);
    for r in &results {
        let expected = r.vector_score * 0.7 + r.text_score * 0.3;
        assert!((r.score - expected).abs() < 1e-9, "{r:?}");
        assert!((0.0..=1.0).contains(&r.score));
        assert!((0.0..=1.0).contains(&r.vector_score));
        assert!((0.0..=1.0).contains(&r.text_score));
    }
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn embedding_failure_degrades_to_keyword_results() {
    let store = test_store();
    seeded_store(&store);
    let embedder = MockEmbedder::new();
    embedder.set_failing(true);
    let search = HybridSearch::new(store, embedder, search_config());

    let results = search.search("coffee", SearchOptions::default()).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.vector_score == 0.0));
    assert_eq!(results[0].start_line, 5);
    assert_eq!(results[0].text_score, 1.0);
    assert_eq!(results[0].score, 1.0);
}

#[tokio::test]
async fn lexical_only_store_ranks_with_default_config() {
    let store = Arc::new(IndexStore::open_in_memory(None).unwrap());
    store
        .replace_file(
            "notes.md",
            &[
                chunk_record("notes.md", 1, 2, "sqlite keeps the index in one file"),
                chunk_record("notes.md", 4, 5, "sqlite fts5 gives us bm25"),
            ],
            &file_meta("notes.md", "h", 2),
        )
        .unwrap();
    let search = HybridSearch::new(store, MockEmbedder::new(), SearchConfig::default());

    let results = search.search("sqlite", SearchOptions::default()).await.unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].score, 1.0);
    for r in &results {
        assert_eq!(r.vector_score, 0.0);
        assert_eq!(r.score, r.text_score);
        assert!(r.score >= SearchConfig::default().min_score);
    }
}

#[tokio::test]
async fn embedder_outage_ranks_with_default_config() {
    let store = test_store();
    seeded_store(&store);
    let embedder = MockEmbedder::new();
    embedder.set_failing(true);
    let search = HybridSearch::new(store, embedder, SearchConfig::default());

    let results = search.search("coffee", SearchOptions::default()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].start_line, 5);
    assert_eq!(results[0].score, 1.0);
}

#[tokio::test]
async fn single_keyword_match_survives_default_threshold() {
    let store = Arc::new(IndexStore::open_in_memory(None).unwrap());
    store
        .replace_file(
            "a.md",
            &[chunk_record("a.md", 1, 1, "postgres replica lag alert")],
            &file_meta("a.md", "h", 1),
        )
        .unwrap();
    let search = HybridSearch::new(store, MockEmbedder::new(), SearchConfig::default());

    let results = search.search("replica", SearchOptions::default()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].path, "a.md");
}

#[tokio::test]
async fn lexical_only_store_still_answers() {
    let store = Arc::new(IndexStore::open_in_memory(None).unwrap());
    let mut chunk = chunk_record("a.md", 1, 1, "sqlite write ahead log");
    chunk.embedding = None;
    store
        .replace_file("a.md", &[chunk], &file_meta("a.md", "h", 1))
        .unwrap();
    let embedder = MockEmbedder::new();
    let search = HybridSearch::new(store, embedder.clone(), search_config());

    let results = search.search("sqlite", SearchOptions::default()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].vector_score, 0.0);
    assert_eq!(embedder.embedded(), 0);
}

#[tokio::test]
async fn options_limit_and_filter_results() {
    let store = test_store();
    seeded_store(&store);
    let search = HybridSearch::new(store, MockEmbedder::new(), search_config());

    let one = search
        .search("coffee", SearchOptions { limit: Some(1), min_score: None })
        .await
        .unwrap();
    assert_eq!(one.len(), 1);

    let strict = search
        .search("coffee", SearchOptions { limit: None, min_score: Some(1.01) })
        .await
        .unwrap();
    assert!(strict.is_empty());
}

#[tokio::test]
async fn malformed_queries_are_rejected_before_lookup() {
    let embedder = MockEmbedder::new();
    let search = HybridSearch::new(test_store(), embedder.clone(), search_config());

    assert_eq!(
        search.search("   ", SearchOptions::default()).await.unwrap_err(),
        SearchError::EmptyQuery
    );
    assert_eq!(
        search
            .search("x", SearchOptions { limit: Some(0), min_score: None })
            .await
            .unwrap_err(),
        SearchError::InvalidLimit
    );
    assert!(matches!(
        search
            .search("x", SearchOptions { limit: None, min_score: Some(f64::NAN) })
            .await,
        Err(SearchError::InvalidMinScore(_))
    ));
    assert_eq!(embedder.embedded(), 0);
}

#[tokio::test]
async fn empty_index_returns_no_results() {
    let search = HybridSearch::new(test_store(), MockEmbedder::new(), search_config());
    assert!(search
        .search("anything", SearchOptions::default())
        .await
        .unwrap()
        .is_empty());
}
