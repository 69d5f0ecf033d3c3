mod helpers;

use cairn::capture::Category;
use cairn::engine::{CaptureOutcome, MemoryEngine};
use cairn::search::SearchOptions;
use cairn::store::IndexStore;
use helpers::{test_config, test_engine, test_store, MockEmbedder};
use std::sync::Arc;

#[tokio::test]
async fn new_engine_bootstraps_the_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _) = test_engine(dir.path());

    assert!(engine.workspace().is_initialized());
    assert!(engine.workspace().memory_dir().is_dir());
    assert_eq!(
        engine.store().stored_embedding_model().unwrap().as_deref(),
        Some("mock-embed")
    );
}

#[tokio::test]
async fn writes_leave_the_index_to_sync() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, embedder) = test_engine(dir.path());

    engine
        .write("PROJECT.md", "# Project\n\nThe billing service runs on postgres.\n")
        .await
        .unwrap();
    assert_eq!(engine.store().get_stats().unwrap().files, 0);
    assert!(engine.store().search_keyword("billing", 10).is_empty());
    assert_eq!(embedder.embedded(), 0);

    engine.reindex(false).await.unwrap();
    let results = engine
        .search("billing postgres", SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(results[0].path, "PROJECT.md");
    assert_eq!(results[0].start_line, 1);
    assert_eq!(results[0].end_line, 3);

    let status = engine.status().unwrap();
    assert_eq!(status.files_indexed, 3);
    assert!(status.vector_search);
    assert_eq!(status.embedding_provider, "mock");
}

#[tokio::test]
async fn append_creates_daily_log() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _) = test_engine(dir.path());
    let path = engine.daily_log_path();
    assert!(path.starts_with("memory/"));

    engine.append(&path, "- standup moved to 10am\n").await.unwrap();
    engine.append(&path, "- retro on friday\n").await.unwrap();

    let text = engine.get(&path, None).await.unwrap();
    assert_eq!(text, "- standup moved to 10am\n- retro on friday\n");
    assert_eq!(engine.get(&path, Some((2, 2))).await.unwrap(), "- retro on friday");
    assert!(engine.store().search_keyword("retro", 10).is_empty());
}

#[tokio::test]
async fn writes_outside_the_document_set_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _) = test_engine(dir.path());

    assert!(engine.write("notes.txt", "x").await.is_err());
    assert!(engine.write("../escape.md", "x").await.is_err());
    assert!(engine.write("memory/deep/x.md", "x").await.is_err());
    assert!(engine.append("/tmp/abs.md", "x").await.is_err());
}

#[tokio::test]
async fn capture_appends_to_memory_file() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _) = test_engine(dir.path());

    let outcome = engine.capture("I prefer tabs over spaces").await.unwrap();
    assert_eq!(
        outcome,
        CaptureOutcome::Captured {
            category: Category::Preference,
            content: "I prefer tabs over spaces".into(),
            path: "MEMORY.md".into(),
        }
    );

    let memory = engine.get("MEMORY.md", None).await.unwrap();
    assert!(memory.contains("\n- [preference] I prefer tabs over spaces _("));
    assert!(memory.ends_with(")_\n"));

    engine.coordinator().wait_idle().await;
    assert_eq!(engine.store().search_keyword("tabs", 10).len(), 1);
}

#[tokio::test]
async fn capture_reports_unreadable_memory_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    // A directory exists at the path but cannot be read as text.
    config.capture.memory_file = "memory".into();
    let engine = MemoryEngine::with_store(config, test_store(), MockEmbedder::new()).unwrap();

    assert!(engine.capture("I prefer tabs over spaces").await.is_err());
    assert!(!engine
        .get("MEMORY.md", None)
        .await
        .unwrap()
        .contains("tabs"));
}

#[tokio::test]
async fn capture_skips_near_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _) = test_engine(dir.path());
    engine
        .write("memory/prefs.md", "I prefer tabs over spaces")
        .await
        .unwrap();
    engine.reindex(false).await.unwrap();

    let outcome = engine.capture("I prefer tabs over spaces").await.unwrap();
    assert_eq!(outcome, CaptureOutcome::Duplicate);
    assert!(!engine
        .get("MEMORY.md", None)
        .await
        .unwrap()
        .contains("tabs"));
}

#[tokio::test]
async fn capture_ignores_chatter_and_respects_config() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _) = test_engine(dir.path());
    assert_eq!(
        engine.capture("the weather looks fine today").await.unwrap(),
        CaptureOutcome::Ignored
    );

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.capture.enabled = false;
    let engine = MemoryEngine::with_store(config, test_store(), MockEmbedder::new()).unwrap();
    assert_eq!(
        engine.capture("remember my locker code is 4411").await.unwrap(),
        CaptureOutcome::Disabled
    );
}

#[tokio::test]
async fn reindex_then_status_reflects_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _) = test_engine(dir.path());

    let report = engine.reindex(false).await.unwrap();
    assert_eq!(report.files_indexed, 3);

    let status = engine.status().unwrap();
    assert_eq!(status.files_indexed, 3);
    assert!(status.last_indexed_at.is_some());
    assert!(!status.watching);
}

#[tokio::test]
async fn watching_starts_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _) = test_engine(dir.path());

    let report = engine.start_watching().await.unwrap();
    assert_eq!(report.files_indexed, 3);
    assert!(engine.status().unwrap().watching);

    engine.shutdown().await;
    assert!(!engine.status().unwrap().watching);
}

#[tokio::test]
async fn recall_wraps_related_notes_in_context() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _) = test_engine(dir.path());
    engine
        .write("memory/prefs.md", "I prefer tabs over spaces")
        .await
        .unwrap();
    engine.reindex(false).await.unwrap();

    let recall = engine.recall("I prefer tabs over spaces").await;

    assert!(!recall.is_empty());
    assert_eq!(recall.memories[0].path, "memory/prefs.md");
    assert!(recall.memories[0].score > 0.99);
    assert!(recall.context.starts_with("<relevant-memories>\n"));
    assert!(recall
        .context
        .contains("1. [memory/prefs.md] I prefer tabs over spaces (relevance: 100%)"));
    assert!(recall.prepend_to("hello").ends_with("</relevant-memories>\n\nhello"));
}

#[tokio::test]
async fn recall_is_empty_when_nothing_can_be_looked_up() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, embedder) = test_engine(dir.path());
    engine
        .write("memory/prefs.md", "I prefer tabs over spaces")
        .await
        .unwrap();
    engine.reindex(false).await.unwrap();

    assert!(engine.recall("   ").await.is_empty());
    embedder.set_failing(true);
    assert!(engine.recall("I prefer tabs over spaces").await.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(IndexStore::open_in_memory(None).unwrap());
    let engine = MemoryEngine::with_store(test_config(dir.path()), store, MockEmbedder::new()).unwrap();
    engine.reindex(false).await.unwrap();
    assert!(engine.recall("workspace").await.is_empty());
}

#[tokio::test]
async fn recall_respects_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.recall.enabled = false;
    let engine = MemoryEngine::with_store(config, test_store(), MockEmbedder::new()).unwrap();
    engine
        .write("memory/prefs.md", "I prefer tabs over spaces")
        .await
        .unwrap();
    engine.reindex(false).await.unwrap();
    assert!(engine.recall("I prefer tabs over spaces").await.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.recall.min_score = 1.01;
    let engine = MemoryEngine::with_store(config, test_store(), MockEmbedder::new()).unwrap();
    engine
        .write("memory/prefs.md", "I prefer tabs over spaces")
        .await
        .unwrap();
    engine.reindex(false).await.unwrap();
    assert!(engine.recall("I prefer tabs over spaces").await.is_empty());
}
