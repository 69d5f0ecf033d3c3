//! Per-file indexing: read, hash, chunk, embed, then swap the file's chunks
//! in one store transaction.
//!
//! Embedding runs before anything is written, so a backend failure leaves
//! the previously committed chunks and the stale FileMeta untouched and the
//! next sync retries. Writes to one path are serialized by a per-path lock,
//! which is dropped again once no task holds or awaits it.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use crate::chunker::{self, sha256_hex};
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingProvider;
use crate::store::{now_timestamp, ChunkRecord, ChunkSource, FileMeta, IndexStore};
use crate::workspace::Workspace;

/// What a single-file sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Content hash matched FileMeta; nothing was written.
    Unchanged,
    /// Chunks were replaced.
    Indexed { chunks: usize },
    /// The file no longer exists; its chunks and meta were removed.
    Removed,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexReport {
    pub files_indexed: usize,
    pub chunks_created: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub errors: Vec<FileError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub path: String,
    pub error: String,
}

pub struct Indexer {
    workspace: Workspace,
    store: Arc<IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunking: ChunkingConfig,
    path_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Indexer {
    pub fn new(
        workspace: Workspace,
        store: Arc<IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            workspace,
            store,
            embedder,
            chunking,
            path_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn path_lock(&self, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .path_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(path.to_string()).or_default())
    }

    /// Forget `path`'s lock when `lock` and the map hold the only references.
    /// Cloning out of the map needs the map lock, so no waiter can appear
    /// between the count and the removal.
    fn release_path_lock(&self, path: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .path_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
    }

    /// Paths with a live lock, i.e. a sync or removal running or waiting.
    pub fn locked_paths(&self) -> usize {
        self.path_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Re-index `path` if its content hash differs from FileMeta.
    pub async fn sync_file(&self, path: &str) -> Result<SyncOutcome> {
        self.sync(path, false).await
    }

    /// `force` skips the FileMeta comparison.
    async fn sync(&self, path: &str, force: bool) -> Result<SyncOutcome> {
        let lock = self.path_lock(path);
        let outcome = {
            let _guard = lock.lock().await;
            self.sync_locked(path, force).await
        };
        self.release_path_lock(path, lock);
        outcome
    }

    async fn sync_locked(&self, path: &str, force: bool) -> Result<SyncOutcome> {
        let abs = self.workspace.resolve(path)?;
        let content = match tokio::fs::read_to_string(&abs).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.remove_locked(path).await?;
                return Ok(SyncOutcome::Removed);
            }
            Err(e) => return Err(e).with_context(|| format!("failed to read {path}")),
        };
        let mtime = tokio::fs::metadata(&abs)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let hash = sha256_hex(&content);

        if !force {
            let meta = self.blocking({
                let path = path.to_string();
                move |store| store.get_file_meta(&path)
            })
            .await?;
            if meta.is_some_and(|m| m.hash == hash) {
                tracing::debug!(path, "unchanged, skipping");
                return Ok(SyncOutcome::Unchanged);
            }
        }

        let chunks = chunker::chunk_markdown(&content, path, &self.chunking);
        let previous = self
            .blocking({
                let path = path.to_string();
                move |store| store.chunks_for_path(&path)
            })
            .await?;
        let records = self
            .build_records(chunks, previous)
            .await
            .with_context(|| format!("failed to embed {path}"))?;

        let count = records.len();
        let meta = FileMeta {
            path: path.to_string(),
            hash,
            mtime,
            indexed_at: now_timestamp(),
            chunk_count: count,
        };
        self.blocking({
            let path = path.to_string();
            move |store| store.replace_file(&path, &records, &meta)
        })
        .await?;

        tracing::info!(path, chunks = count, "file indexed");
        Ok(SyncOutcome::Indexed { chunks: count })
    }

    /// Turn chunks into records, reusing the embedding of any chunk whose id
    /// and text hash are unchanged and embedding the rest.
    async fn build_records(
        &self,
        chunks: Vec<chunker::Chunk>,
        previous: Vec<ChunkRecord>,
    ) -> Result<Vec<ChunkRecord>> {
        let model = self.embedder.model().to_string();
        let previous: HashMap<String, ChunkRecord> =
            previous.into_iter().map(|r| (r.id.clone(), r)).collect();
        let now = now_timestamp();

        let mut records: Vec<ChunkRecord> = chunks
            .into_iter()
            .map(|chunk| {
                let id = chunk.id();
                let prior = previous
                    .get(&id)
                    .filter(|p| p.hash == chunk.hash && p.model == model);
                ChunkRecord {
                    created_at: prior.map_or_else(|| now.clone(), |p| p.created_at.clone()),
                    embedding: prior.and_then(|p| p.embedding.clone()),
                    id,
                    path: chunk.path,
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    text: chunk.text,
                    hash: chunk.hash,
                    model: model.clone(),
                    source: ChunkSource::Memory,
                    updated_at: now.clone(),
                }
            })
            .collect();

        if !self.store.is_vector_capable() {
            for record in &mut records {
                record.embedding = None;
            }
            return Ok(records);
        }

        let missing: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            return Ok(records);
        }

        let texts: Vec<String> = missing.iter().map(|&i| records[i].text.clone()).collect();
        let vectors = if self.embedder.supports_batch() {
            self.embedder.embed_batch(&texts).await?
        } else {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in &texts {
                vectors.push(self.embedder.embed(text).await?);
            }
            vectors
        };
        anyhow::ensure!(
            vectors.len() == missing.len(),
            "embedding backend returned {} vectors for {} chunks",
            vectors.len(),
            missing.len()
        );
        for (i, vector) in missing.into_iter().zip(vectors) {
            records[i].embedding = Some(vector);
        }
        tracing::debug!(
            embedded = texts.len(),
            reused = records.len() - texts.len(),
            "chunks embedded"
        );
        Ok(records)
    }

    /// Drop a file's chunks and meta from every view.
    pub async fn remove_file(&self, path: &str) -> Result<usize> {
        let lock = self.path_lock(path);
        let removed = {
            let _guard = lock.lock().await;
            self.remove_locked(path).await
        };
        self.release_path_lock(path, lock);
        removed
    }

    async fn remove_locked(&self, path: &str) -> Result<usize> {
        let removed = self
            .blocking({
                let path = path.to_string();
                move |store| store.remove_file(&path)
            })
            .await?;
        tracing::info!(path, chunks = removed, "file removed from index");
        Ok(removed)
    }

    /// Bring the whole workspace up to date.
    ///
    /// `full` clears every view first and re-indexes every document
    /// unconditionally; otherwise unchanged files are skipped and index entries
    /// for files that no longer exist are purged. A failing file is recorded
    /// in the report and never aborts the batch.
    pub async fn reindex(&self, full: bool) -> Result<ReindexReport> {
        if full {
            self.blocking(|store| store.clear_all()).await?;
        }

        let workspace = self.workspace.clone();
        let documents = tokio::task::spawn_blocking(move || workspace.list_documents())
            .await
            .context("document listing task failed")??;

        let mut report = ReindexReport::default();
        for path in &documents {
            match self.sync(path, full).await {
                Ok(SyncOutcome::Indexed { chunks }) => {
                    report.files_indexed += 1;
                    report.chunks_created += chunks;
                }
                Ok(SyncOutcome::Unchanged) => report.files_skipped += 1,
                Ok(SyncOutcome::Removed) => report.files_removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path, error = %format!("{e:#}"), "failed to index file");
                    report.errors.push(FileError {
                        path: path.clone(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        if !full {
            let indexed = self.blocking(|store| store.indexed_paths()).await?;
            for orphan in indexed.iter().filter(|p| !documents.contains(p)) {
                match self.remove_file(orphan).await {
                    Ok(_) => report.files_removed += 1,
                    Err(e) => report.errors.push(FileError {
                        path: orphan.clone(),
                        error: format!("{e:#}"),
                    }),
                }
            }
        }

        if full && report.errors.is_empty() {
            let model = self.embedder.model().to_string();
            self.blocking(move |store| store.set_embedding_model(&model))
                .await?;
        }

        tracing::info!(
            full,
            indexed = report.files_indexed,
            skipped = report.files_skipped,
            removed = report.files_removed,
            chunks = report.chunks_created,
            errors = report.errors.len(),
            "reindex complete"
        );
        Ok(report)
    }

    /// Run a synchronous store call off the async runtime.
    async fn blocking<T: Send + 'static>(
        &self,
        f: impl FnOnce(&IndexStore) -> Result<T> + Send + 'static,
    ) -> Result<T> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .context("store task failed")?
    }
}
