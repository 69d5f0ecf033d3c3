#![allow(dead_code)]

use async_trait::async_trait;
use cairn::config::CairnConfig;
use cairn::embedding::{EmbeddingError, EmbeddingProvider};
use cairn::engine::MemoryEngine;
use cairn::store::{ChunkRecord, ChunkSource, FileMeta, IndexStore};
use cairn::sync::Indexer;
use cairn::workspace::Workspace;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const DIMS: usize = 16;

/// Deterministic bag-of-words embedder: every lowercase word is hashed onto
/// one of `DIMS` axes and the vector is L2-normalized. Texts sharing words
/// are similar; identical texts are identical.
pub struct MockEmbedder {
    pub texts_embedded: AtomicUsize,
    pub batches: AtomicUsize,
    pub fail: AtomicBool,
    batch: bool,
}

impl MockEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_batching(true))
    }

    pub fn with_batching(batch: bool) -> Self {
        Self {
            texts_embedded: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            batch,
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }
}

pub fn mock_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let hash = word
            .to_lowercase()
            .bytes()
            .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
        v[hash as usize % DIMS] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        v[0] = 1.0;
        return v;
    }
    v.iter().map(|x| x / norm).collect()
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-embed"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::InvalidResponse("mock backend is down".into()));
        }
        self.texts_embedded.fetch_add(1, Ordering::SeqCst);
        Ok(mock_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn supports_batch(&self) -> bool {
        self.batch
    }

    async fn check_connection(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }
}

/// In-memory store with a live vector view sized for [`MockEmbedder`].
pub fn test_store() -> Arc<IndexStore> {
    Arc::new(IndexStore::open_in_memory(Some(DIMS)).unwrap())
}

/// Config pointing at `dir`, with a short debounce and no score floor.
pub fn test_config(dir: &Path) -> CairnConfig {
    let mut config = CairnConfig::default();
    config.storage.workspace_dir = dir.join("workspace").to_string_lossy().into_owned();
    config.storage.db_path = dir.join("index.db").to_string_lossy().into_owned();
    config.sync.debounce_ms = 200;
    config.search.min_score = 0.0;
    config
}

/// Engine over an in-memory store and a [`MockEmbedder`].
pub fn test_engine(dir: &Path) -> (MemoryEngine, Arc<MockEmbedder>) {
    let embedder = MockEmbedder::new();
    let engine = MemoryEngine::with_store(test_config(dir), test_store(), embedder.clone()).unwrap();
    (engine, embedder)
}

pub struct IndexerFixture {
    pub indexer: Arc<Indexer>,
    pub store: Arc<IndexStore>,
    pub embedder: Arc<MockEmbedder>,
    pub workspace: Workspace,
}

/// Initialized workspace under `dir` with an indexer over an in-memory store.
pub fn test_indexer(dir: &Path) -> IndexerFixture {
    test_indexer_with(dir, MockEmbedder::new())
}

pub fn test_indexer_with(dir: &Path, embedder: Arc<MockEmbedder>) -> IndexerFixture {
    let workspace = Workspace::new(dir.join("workspace"));
    workspace.initialize().unwrap();
    let workspace = Workspace::new(std::fs::canonicalize(workspace.root()).unwrap());
    let store = test_store();
    let indexer = Arc::new(Indexer::new(
        workspace.clone(),
        Arc::clone(&store),
        embedder.clone(),
        CairnConfig::default().chunking,
    ));
    IndexerFixture {
        indexer,
        store,
        embedder,
        workspace,
    }
}

/// A stored chunk with a mock embedding of its own text.
pub fn chunk_record(path: &str, start: usize, end: usize, text: &str) -> ChunkRecord {
    ChunkRecord {
        id: cairn::chunker::chunk_id(path, start, end),
        path: path.into(),
        start_line: start,
        end_line: end,
        text: text.into(),
        hash: cairn::chunker::sha256_hex(text),
        embedding: Some(mock_vector(text)),
        model: "mock-embed".into(),
        source: ChunkSource::Memory,
        created_at: "2025-01-01T00:00:00.000Z".into(),
        updated_at: "2025-01-01T00:00:00.000Z".into(),
    }
}

pub fn file_meta(path: &str, hash: &str, chunks: usize) -> FileMeta {
    FileMeta {
        path: path.into(),
        hash: hash.into(),
        mtime: 0,
        indexed_at: "2025-01-01T00:00:00.000Z".into(),
        chunk_count: chunks,
    }
}
