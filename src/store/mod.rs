//! Dual-index chunk store.
//!
//! One SQLite database holds three views of every chunk: the `chunks` primary
//! table, the `chunks_fts` BM25 index and, when sqlite-vec is usable, the
//! `chunks_vec` vector index. Every mutation goes through
//! [`IndexStore::write`], which hands a [`ViewWriter`] a single transaction, so
//! the views never drift apart. Reads lock the same connection briefly; async
//! callers run them under `spawn_blocking`.

mod writer;

pub use writer::ViewWriter;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::db::{self, migrations, schema};

// ── Public types ──────────────────────────────────────────────────────────────

/// Where a chunk's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSource {
    /// A markdown file in the workspace.
    Memory,
    /// A conversation transcript.
    Session,
}

impl ChunkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Session => "session",
        }
    }
}

impl std::str::FromStr for ChunkSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "session" => Ok(Self::Session),
            other => Err(format!("unknown chunk source: {other}")),
        }
    }
}

/// A chunk as stored in the primary view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub id: String,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub hash: String,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub model: String,
    pub source: ChunkSource,
    pub created_at: String,
    pub updated_at: String,
}

/// Change-detection record for one indexed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub path: String,
    /// SHA-256 of the whole file.
    pub hash: String,
    /// Modification time, milliseconds since the Unix epoch.
    pub mtime: i64,
    pub indexed_at: String,
    pub chunk_count: usize,
}

/// A chunk returned by a single-view lookup, scored higher-is-better.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub files: usize,
    pub chunks: usize,
    pub last_indexed_at: Option<String>,
}

/// Direction of a raw score coming out of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOrder {
    HigherIsBetter,
    LowerIsBetter,
}

impl ScoreOrder {
    /// Map a raw score onto the higher-is-better scale used by ranking.
    pub fn orient(self, raw: f64) -> f64 {
        match self {
            Self::HigherIsBetter => raw,
            Self::LowerIsBetter => -raw,
        }
    }
}

/// FTS5 `bm25()` is negative, with the best match the most negative.
pub const LEXICAL_SCORE_ORDER: ScoreOrder = ScoreOrder::LowerIsBetter;

// ── Store ─────────────────────────────────────────────────────────────────────

pub struct IndexStore {
    conn: Mutex<Connection>,
    /// Dimensions of the live vector view; `None` when running lexical-only.
    vector_dims: Option<usize>,
}

impl IndexStore {
    /// Open the index at `path`. `vector_dims` is the embedding width, or
    /// `None` to run lexical-only. A vector view that cannot be created
    /// (missing extension, bad dimensions) also degrades to lexical-only.
    pub fn open(path: impl AsRef<Path>, vector_dims: Option<usize>) -> Result<Self> {
        let conn = db::open_database(path)?;
        Self::from_connection(conn, vector_dims)
    }

    /// In-memory index for tests and one-off runs.
    pub fn open_in_memory(vector_dims: Option<usize>) -> Result<Self> {
        let conn = db::open_memory_database()?;
        Self::from_connection(conn, vector_dims)
    }

    fn from_connection(conn: Connection, vector_dims: Option<usize>) -> Result<Self> {
        let vector_dims = match vector_dims {
            Some(dims) => init_vector_view(&conn, dims),
            None => {
                if let Err(e) = schema::drop_vec_table(&conn) {
                    tracing::warn!(error = %e, "could not drop vector view");
                }
                tracing::info!("vector search disabled, running lexical-only");
                None
            }
        };
        Ok(Self {
            conn: Mutex::new(conn),
            vector_dims,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("db lock poisoned: {e}"))
    }

    pub fn is_vector_capable(&self) -> bool {
        self.vector_dims.is_some()
    }

    pub fn vector_dims(&self) -> Option<usize> {
        self.vector_dims
    }

    /// Run `f` against all views inside one transaction. Nothing is committed
    /// unless `f` returns `Ok`.
    pub fn write<T>(&self, f: impl FnOnce(&mut ViewWriter<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("failed to begin transaction")?;
        let mut writer = ViewWriter::new(&tx, self.vector_dims.is_some());
        let value = f(&mut writer)?;
        tx.commit().context("failed to commit transaction")?;
        Ok(value)
    }

    // ── Single-operation writes ──────────────────────────────────────────────

    pub fn insert_chunk(&self, chunk: &ChunkRecord) -> Result<()> {
        self.write(|w| w.insert_chunk(chunk))
    }

    /// Remove every chunk of `path` from all views. Returns the number removed.
    pub fn delete_chunks_by_path(&self, path: &str) -> Result<usize> {
        self.write(|w| w.delete_chunks_by_path(path))
    }

    pub fn update_file_meta(&self, meta: &FileMeta) -> Result<()> {
        self.write(|w| w.upsert_file_meta(meta))
    }

    pub fn delete_file_meta(&self, path: &str) -> Result<()> {
        self.write(|w| w.delete_file_meta(path))
    }

    pub fn clear_all(&self) -> Result<()> {
        self.write(|w| w.clear_all())
    }

    /// Atomically swap a file's chunks for `chunks` and record `meta`.
    pub fn replace_file(&self, path: &str, chunks: &[ChunkRecord], meta: &FileMeta) -> Result<()> {
        self.write(|w| {
            w.delete_chunks_by_path(path)?;
            for chunk in chunks {
                w.insert_chunk(chunk)?;
            }
            w.upsert_file_meta(meta)
        })
    }

    /// Atomically drop a file's chunks and meta. Returns the chunks removed.
    pub fn remove_file(&self, path: &str) -> Result<usize> {
        self.write(|w| {
            let removed = w.delete_chunks_by_path(path)?;
            w.delete_file_meta(path)?;
            Ok(removed)
        })
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn get_file_meta(&self, path: &str) -> Result<Option<FileMeta>> {
        let conn = self.lock()?;
        let meta = conn
            .query_row(
                "SELECT path, hash, mtime, indexed_at, chunk_count FROM file_meta WHERE path = ?1",
                params![path],
                |row| {
                    Ok(FileMeta {
                        path: row.get(0)?,
                        hash: row.get(1)?,
                        mtime: row.get(2)?,
                        indexed_at: row.get(3)?,
                        chunk_count: row.get::<_, i64>(4)? as usize,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    /// Every path with a FileMeta record, sorted.
    pub fn indexed_paths(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT path FROM file_meta ORDER BY path")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths)
    }

    /// Stored chunks of one file in document order.
    pub fn chunks_for_path(&self, path: &str) -> Result<Vec<ChunkRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, path, start_line, end_line, text, hash, embedding, model, source, created_at, updated_at \
             FROM chunks WHERE path = ?1 ORDER BY start_line, end_line",
        )?;
        let rows = stmt
            .query_map(params![path], |row| {
                let embedding: Option<Vec<u8>> = row.get(6)?;
                let source: String = row.get(8)?;
                Ok(ChunkRecord {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    start_line: row.get::<_, i64>(2)? as usize,
                    end_line: row.get::<_, i64>(3)? as usize,
                    text: row.get(4)?,
                    hash: row.get(5)?,
                    embedding: embedding.map(|b| bytes_to_embedding(&b)),
                    model: row.get(7)?,
                    source: source.parse().unwrap_or(ChunkSource::Memory),
                    created_at: row.get(9)?,
                    updated_at: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_stats(&self) -> Result<IndexStats> {
        let conn = self.lock()?;
        let (files, last_indexed_at): (i64, Option<String>) = conn.query_row(
            "SELECT COUNT(*), MAX(indexed_at) FROM file_meta",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let chunks: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(IndexStats {
            files: files as usize,
            chunks: chunks as usize,
            last_indexed_at,
        })
    }

    /// Nearest chunks by cosine similarity (`1 - cosine distance`). Empty when
    /// the vector view is unavailable or the lookup fails.
    pub fn search_vector(&self, embedding: &[f32], limit: usize) -> Vec<ScoredChunk> {
        let Some(dims) = self.vector_dims else {
            return Vec::new();
        };
        if embedding.len() != dims {
            tracing::warn!(
                expected = dims,
                got = embedding.len(),
                "query embedding has wrong dimensions, skipping vector search"
            );
            return Vec::new();
        }
        match self.try_search_vector(embedding, limit) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "vector search failed");
                Vec::new()
            }
        }
    }

    fn try_search_vector(&self, embedding: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.path, c.start_line, c.end_line, c.text, \
                    vec_distance_cosine(v.embedding, ?1) AS distance \
             FROM chunks_vec v JOIN chunks c ON c.id = v.id \
             ORDER BY distance ASC LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![embedding_to_bytes(embedding), limit as i64], |row| {
                let distance: f64 = row.get(5)?;
                Ok(ScoredChunk {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    start_line: row.get::<_, i64>(2)? as usize,
                    end_line: row.get::<_, i64>(3)? as usize,
                    text: row.get(4)?,
                    score: 1.0 - distance,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// BM25 keyword lookup, oriented higher-is-better. Empty when the query has
    /// no searchable terms or the lookup fails.
    pub fn search_keyword(&self, query: &str, limit: usize) -> Vec<ScoredChunk> {
        let match_expr = build_fts_query(query);
        if match_expr.is_empty() {
            return Vec::new();
        }
        match self.try_search_keyword(&match_expr, limit) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "keyword search failed");
                Vec::new()
            }
        }
    }

    fn try_search_keyword(&self, match_expr: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.path, c.start_line, c.end_line, c.text, bm25(chunks_fts) AS rank \
             FROM chunks_fts JOIN chunks c ON c.rowid = chunks_fts.rowid \
             WHERE chunks_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![match_expr, limit as i64], |row| {
                let raw: f64 = row.get(5)?;
                Ok(ScoredChunk {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    start_line: row.get::<_, i64>(2)? as usize,
                    end_line: row.get::<_, i64>(3)? as usize,
                    text: row.get(4)?,
                    score: LEXICAL_SCORE_ORDER.orient(raw),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Highest cosine similarity between `embedding` and any stored chunk.
    pub fn max_similarity(&self, embedding: &[f32]) -> Option<f64> {
        self.search_vector(embedding, 1).first().map(|hit| hit.score)
    }

    // ── schema_meta ──────────────────────────────────────────────────────────

    pub fn stored_embedding_model(&self) -> Result<Option<String>> {
        let conn = self.lock()?;
        Ok(migrations::get_embedding_model(&conn)?)
    }

    pub fn set_embedding_model(&self, model: &str) -> Result<()> {
        let conn = self.lock()?;
        migrations::set_embedding_model(&conn, model)?;
        Ok(())
    }

    pub fn health(&self) -> Result<db::HealthReport> {
        let conn = self.lock()?;
        db::check_database_health(&conn)
    }
}

fn init_vector_view(conn: &Connection, dims: usize) -> Option<usize> {
    if dims == 0 {
        tracing::warn!("embedding dimensions are 0, running lexical-only");
        return None;
    }
    let Some(version) = db::sqlite_vec_version(conn) else {
        tracing::warn!("sqlite-vec unavailable, running lexical-only");
        return None;
    };
    match schema::ensure_vec_table(conn, dims) {
        Ok(schema::VecTableStatus::Rebuilt) => {
            tracing::warn!(
                dims,
                "embedding dimensions changed, index cleared; a full reindex is required"
            );
            Some(dims)
        }
        Ok(status) => {
            tracing::info!(sqlite_vec = %version, dims, ?status, "vector view ready");
            Some(dims)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to create vector view, running lexical-only");
            None
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Little-endian f32 bytes, the layout sqlite-vec expects for `FLOAT[n]`.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Turn free text into an FTS5 prefix-OR query: `"alpha"* OR "beta"*`.
///
/// Anything other than letters, digits, `_` and whitespace is dropped first,
/// so user input can never produce FTS5 syntax errors.
pub fn build_fts_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .map(|term| format!("\"{term}\"*"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// RFC 3339 UTC timestamp with millisecond precision.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
