//! The assembled engine: workspace, index store, embedding provider, search,
//! indexer and sync coordinator, owned by one value with explicit start and
//! shutdown. Front-ends (MCP tools, CLI) only talk to this type.
//!
//! Raw file operations never index. The coordinator, fed by the watcher or
//! by capture, and `reindex` are the only ways into the index.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::capture::{self, Category, CaptureRules};
use crate::config::CairnConfig;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::recall::{self, Recall};
use crate::search::{HybridSearch, SearchError, SearchOptions, SearchResult};
use crate::store::IndexStore;
use crate::sync::{FileEvent, Indexer, ReindexReport, SyncCoordinator};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub workspace: String,
    pub files_indexed: usize,
    pub total_chunks: usize,
    pub last_indexed_at: Option<String>,
    pub vector_search: bool,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub watching: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CaptureOutcome {
    Disabled,
    /// No rule matched, or the text was excluded.
    Ignored,
    Duplicate,
    Captured {
        category: Category,
        content: String,
        path: String,
    },
}

pub struct MemoryEngine {
    config: CairnConfig,
    workspace: Workspace,
    store: Arc<IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    search: HybridSearch,
    coordinator: SyncCoordinator,
    capture_rules: CaptureRules,
}

impl MemoryEngine {
    /// Build everything from config, creating the workspace and index on first
    /// use.
    pub fn open(config: CairnConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        Self::with_provider(config, embedder)
    }

    pub fn with_provider(config: CairnConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let dims = config.storage.vector_search.then(|| embedder.dimensions());
        let store = Arc::new(IndexStore::open(config.resolved_db_path(), dims)?);
        Self::with_store(config, store, embedder)
    }

    /// Assemble around an already opened store.
    pub fn with_store(
        config: CairnConfig,
        store: Arc<IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let root = config.resolved_workspace_dir();
        Workspace::new(&root).initialize()?;
        // Watch events carry canonical paths; the root must match them.
        let root = std::fs::canonicalize(&root)
            .with_context(|| format!("failed to resolve workspace {}", root.display()))?;
        let workspace = Workspace::new(root);

        match store.stored_embedding_model()? {
            Some(stored) if stored != embedder.model() => tracing::warn!(
                stored = %stored,
                configured = embedder.model(),
                "index was built with a different embedding model; run `cairn reindex --full`"
            ),
            Some(_) => {}
            None => store.set_embedding_model(embedder.model())?,
        }

        let capture_rules = CaptureRules::from_config(&config.capture)?;
        let search = HybridSearch::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            config.search.clone(),
        );
        let indexer = Arc::new(Indexer::new(
            workspace.clone(),
            Arc::clone(&store),
            Arc::clone(&embedder),
            config.chunking.clone(),
        ));
        let coordinator =
            SyncCoordinator::new(indexer, Duration::from_millis(config.sync.debounce_ms));

        Ok(Self {
            config,
            workspace,
            store,
            embedder,
            search,
            coordinator,
            capture_rules,
        })
    }

    pub fn config(&self) -> &CairnConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    fn indexer(&self) -> &Arc<Indexer> {
        self.coordinator.indexer()
    }

    // ── Retrieval ────────────────────────────────────────────────────────────

    pub async fn search(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.search.search(query, options).await
    }

    pub async fn reindex(&self, full: bool) -> Result<ReindexReport> {
        self.indexer().reindex(full).await
    }

    pub fn status(&self) -> Result<EngineStatus> {
        let stats = self.store.get_stats()?;
        Ok(EngineStatus {
            workspace: self.workspace.root().display().to_string(),
            files_indexed: stats.files,
            total_chunks: stats.chunks,
            last_indexed_at: stats.last_indexed_at,
            vector_search: self.store.is_vector_capable(),
            embedding_provider: self.embedder.provider().to_string(),
            embedding_model: self.embedder.model().to_string(),
            watching: self.coordinator.is_watching(),
        })
    }

    // ── Raw file access ──────────────────────────────────────────────────────

    pub async fn get(&self, path: &str, lines: Option<(usize, usize)>) -> Result<String> {
        self.workspace.read(path, lines).await
    }

    /// Replace a document. The index is left alone; the watcher (or the next
    /// reindex) picks the change up.
    pub async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.ensure_document(path)?;
        self.workspace.write(path, content).await?;
        Ok(())
    }

    /// Append to a document, creating it if missing. Like [`Self::write`],
    /// this does not touch the index.
    pub async fn append(&self, path: &str, content: &str) -> Result<()> {
        self.ensure_document(path)?;
        self.workspace.append(path, content).await?;
        Ok(())
    }

    /// Today's daily log, `memory/YYYY-MM-DD.md`.
    pub fn daily_log_path(&self) -> String {
        Workspace::daily_log_path(chrono::Local::now().date_naive())
    }

    fn ensure_document(&self, path: &str) -> Result<()> {
        let abs = self.workspace.resolve(path)?;
        if !self.workspace.is_document(&abs) {
            bail!("{path} is not a document: only *.md files in the workspace root or memory/ are indexed");
        }
        Ok(())
    }

    // ── Recall ───────────────────────────────────────────────────────────────

    /// Notes most similar to `text`, wrapped in the configured context
    /// template. Empty when disabled or when no vector lookup is possible.
    pub async fn recall(&self, text: &str) -> Recall {
        if !self.config.recall.enabled {
            return Recall::default();
        }
        recall::recall(&self.store, self.embedder.as_ref(), text, &self.config.recall).await
    }

    // ── Capture ──────────────────────────────────────────────────────────────

    /// Classify `text` and, if memorable and new, append it to the memory file.
    pub async fn capture(&self, text: &str) -> Result<CaptureOutcome> {
        if !self.config.capture.enabled {
            return Ok(CaptureOutcome::Disabled);
        }
        let Some(captured) = self.capture_rules.classify(text) else {
            return Ok(CaptureOutcome::Ignored);
        };
        if capture::is_duplicate(
            &self.store,
            self.embedder.as_ref(),
            &captured.content,
            self.config.capture.dedup_threshold,
        )
        .await
        {
            tracing::debug!(content = %captured.content, "capture skipped as duplicate");
            return Ok(CaptureOutcome::Duplicate);
        }

        let path = self.config.capture.memory_file.clone();
        let abs = self.workspace.resolve(&path)?;
        let existing = match tokio::fs::read_to_string(&abs).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).with_context(|| format!("failed to read {path}")),
        };
        let mut line = capture::format_line(&captured, chrono::Local::now().date_naive());
        if !existing.is_empty() && !existing.ends_with('\n') {
            line.insert(0, '\n');
        }
        self.append(&path, &line).await?;
        // Debounced like a watched edit, so later captures see this one.
        self.coordinator
            .handle_event(FileEvent::Changed(path.clone()))
            .await;

        tracing::info!(category = %captured.category, path = %path, "memory captured");
        Ok(CaptureOutcome::Captured {
            category: captured.category,
            content: captured.content,
            path,
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Catch up with changes made while not running, then follow the
    /// workspace through filesystem events.
    pub async fn start_watching(&self) -> Result<ReindexReport> {
        let report = self.reindex(false).await?;
        self.coordinator.start_watching()?;
        Ok(report)
    }

    /// Cancel pending syncs, release the watcher and wait for running syncs.
    pub async fn shutdown(&self) {
        self.coordinator.stop().await;
    }
}
