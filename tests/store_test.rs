mod helpers;

use cairn::store::IndexStore;
use helpers::{chunk_record, file_meta, mock_vector, test_store};

#[test]
fn replace_file_writes_every_view() {
    let store = test_store();
    let chunks = vec![
        chunk_record("MEMORY.md", 1, 3, "deploy with cargo release"),
        chunk_record("MEMORY.md", 4, 6, "coffee order is a flat white"),
    ];
    store
        .replace_file("MEMORY.md", &chunks, &file_meta("MEMORY.md", "h1", 2))
        .unwrap();

    let keyword = store.search_keyword("coffee", 10);
    assert_eq!(keyword.len(), 1);
    assert_eq!(keyword[0].start_line, 4);

    let vector = store.search_vector(&mock_vector("deploy with cargo release"), 10);
    assert_eq!(vector.len(), 2);
    assert_eq!(vector[0].start_line, 1);
    assert!((vector[0].score - 1.0).abs() < 1e-4);

    let health = store.health().unwrap();
    assert_eq!(health.chunk_count, 2);
    assert_eq!(health.vector_count, Some(2));
    assert!(health.fts_ok);

    let meta = store.get_file_meta("MEMORY.md").unwrap().unwrap();
    assert_eq!(meta.hash, "h1");
    assert_eq!(meta.chunk_count, 2);
}

#[test]
fn replacing_a_file_supersedes_its_old_chunks() {
    let store = test_store();
    store
        .replace_file(
            "notes.md",
            &[
                chunk_record("notes.md", 1, 2, "postgres migration plan"),
                chunk_record("notes.md", 3, 4, "kubernetes rollout"),
            ],
            &file_meta("notes.md", "old", 2),
        )
        .unwrap();
    store
        .replace_file(
            "notes.md",
            &[chunk_record("notes.md", 1, 2, "sqlite is enough")],
            &file_meta("notes.md", "new", 1),
        )
        .unwrap();

    assert_eq!(store.chunks_for_path("notes.md").unwrap().len(), 1);
    assert!(store.search_keyword("kubernetes", 10).is_empty());
    assert!(store.search_keyword("postgres", 10).is_empty());
    assert_eq!(store.search_keyword("sqlite", 10).len(), 1);

    let health = store.health().unwrap();
    assert_eq!(health.vector_count, Some(1));
    assert!(health.fts_ok);
    assert_eq!(store.get_file_meta("notes.md").unwrap().unwrap().hash, "new");
}

#[test]
fn remove_file_clears_chunks_and_meta() {
    let store = test_store();
    store
        .replace_file(
            "a.md",
            &[chunk_record("a.md", 1, 1, "alpha")],
            &file_meta("a.md", "h", 1),
        )
        .unwrap();
    store
        .replace_file(
            "b.md",
            &[chunk_record("b.md", 1, 1, "beta")],
            &file_meta("b.md", "h", 1),
        )
        .unwrap();

    assert_eq!(store.remove_file("a.md").unwrap(), 1);
    assert!(store.get_file_meta("a.md").unwrap().is_none());
    assert!(store.search_keyword("alpha", 10).is_empty());
    assert_eq!(store.indexed_paths().unwrap(), vec!["b.md".to_string()]);
    assert_eq!(store.health().unwrap().vector_count, Some(1));
}

#[test]
fn failed_write_commits_nothing() {
    let store = test_store();
    let good = chunk_record("a.md", 1, 1, "alpha");
    let mut bad = chunk_record("a.md", 2, 2, "beta");
    bad.embedding = None;

    let result = store.replace_file("a.md", &[good, bad], &file_meta("a.md", "h", 2));
    assert!(result.is_err());

    let health = store.health().unwrap();
    assert_eq!(health.chunk_count, 0);
    assert_eq!(health.vector_count, Some(0));
    assert!(store.get_file_meta("a.md").unwrap().is_none());
    assert!(store.search_keyword("alpha", 10).is_empty());
}

#[test]
fn clear_all_empties_every_view() {
    let store = test_store();
    store
        .replace_file(
            "a.md",
            &[chunk_record("a.md", 1, 1, "alpha")],
            &file_meta("a.md", "h", 1),
        )
        .unwrap();
    store.clear_all().unwrap();

    let stats = store.get_stats().unwrap();
    assert_eq!(stats.files, 0);
    assert_eq!(stats.chunks, 0);
    assert_eq!(store.health().unwrap().vector_count, Some(0));
    assert!(store.search_keyword("alpha", 10).is_empty());
}

#[test]
fn keyword_scores_rank_better_matches_higher() {
    let store = test_store();
    store
        .replace_file(
            "a.md",
            &[
                chunk_record("a.md", 1, 1, "rust rust rust borrow checker"),
                chunk_record("a.md", 2, 2, "python scripts and one rust note among many other words here"),
            ],
            &file_meta("a.md", "h", 2),
        )
        .unwrap();

    let hits = store.search_keyword("rust", 10);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].start_line, 1);
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn keyword_search_tolerates_query_syntax() {
    let store = test_store();
    store
        .replace_file(
            "a.md",
            &[chunk_record("a.md", 1, 1, "error handling with anyhow")],
            &file_meta("a.md", "h", 1),
        )
        .unwrap();

    assert_eq!(store.search_keyword("\"anyhow\" AND (error", 10).len(), 1);
    assert!(store.search_keyword("*** ---", 10).is_empty());
}

#[test]
fn vector_query_with_wrong_width_is_empty() {
    let store = test_store();
    store
        .replace_file(
            "a.md",
            &[chunk_record("a.md", 1, 1, "alpha")],
            &file_meta("a.md", "h", 1),
        )
        .unwrap();
    assert!(store.search_vector(&[1.0, 0.0, 0.0], 10).is_empty());
}

#[test]
fn lexical_only_store_accepts_chunks_without_embeddings() {
    let store = IndexStore::open_in_memory(None).unwrap();
    let mut chunk = chunk_record("a.md", 1, 1, "plain keyword search");
    chunk.embedding = None;
    store
        .replace_file("a.md", &[chunk], &file_meta("a.md", "h", 1))
        .unwrap();

    assert_eq!(store.search_keyword("keyword", 10).len(), 1);
    assert!(store.search_vector(&mock_vector("keyword"), 10).is_empty());
    assert_eq!(store.health().unwrap().vector_count, None);
}

#[test]
fn reopening_with_new_dimensions_clears_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    {
        let store = IndexStore::open(&path, Some(helpers::DIMS)).unwrap();
        store
            .replace_file(
                "a.md",
                &[chunk_record("a.md", 1, 1, "alpha")],
                &file_meta("a.md", "h", 1),
            )
            .unwrap();
    }

    let store = IndexStore::open(&path, Some(helpers::DIMS * 2)).unwrap();
    assert_eq!(store.vector_dims(), Some(helpers::DIMS * 2));
    assert_eq!(store.get_stats().unwrap().chunks, 0);
    assert!(store.get_file_meta("a.md").unwrap().is_none());
}

#[test]
fn single_operation_writes_keep_views_aligned() {
    let store = test_store();
    store
        .insert_chunk(&chunk_record("memory/2025-01-02.md", 1, 1, "picked redis for caching"))
        .unwrap();
    store
        .insert_chunk(&chunk_record("memory/2025-01-02.md", 3, 3, "lunch with the infra team"))
        .unwrap();
    store
        .update_file_meta(&file_meta("memory/2025-01-02.md", "h", 2))
        .unwrap();

    assert_eq!(store.search_keyword("redis", 10).len(), 1);
    assert_eq!(store.health().unwrap().vector_count, Some(2));
    assert_eq!(store.get_stats().unwrap().files, 1);

    assert_eq!(store.delete_chunks_by_path("memory/2025-01-02.md").unwrap(), 2);
    assert!(store.search_keyword("redis", 10).is_empty());
    assert_eq!(store.health().unwrap().vector_count, Some(0));
    assert!(store.get_file_meta("memory/2025-01-02.md").unwrap().is_some());

    store.delete_file_meta("memory/2025-01-02.md").unwrap();
    assert!(store.get_file_meta("memory/2025-01-02.md").unwrap().is_none());
}
