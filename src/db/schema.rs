//! SQL DDL for all cairn tables.
//!
//! Defines the `chunks` primary table, the `chunks_fts` (FTS5) lexical view,
//! `file_meta`, `schema_meta`, and the `chunks_vec` (vec0) vector view. The
//! vector view is sized from the embedding model, so it is created separately
//! by [`ensure_vec_table`]. All other DDL uses `IF NOT EXISTS`.

use rusqlite::{Connection, OptionalExtension};

use super::migrations;

/// All schema DDL statements for the primary and lexical views.
const SCHEMA_SQL: &str = r#"
-- Primary chunk records
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    text TEXT NOT NULL,
    hash TEXT NOT NULL,
    embedding BLOB,
    model TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT 'memory' CHECK(source IN ('memory','session')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);
CREATE INDEX IF NOT EXISTS idx_chunks_hash ON chunks(hash);
CREATE INDEX IF NOT EXISTS idx_chunks_model ON chunks(model);
CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);

-- Full-text search (BM25), kept in sync by the store's view writer
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    text,
    id UNINDEXED,
    path UNINDEXED,
    content='chunks',
    content_rowid='rowid'
);

-- Per-file change detection
CREATE TABLE IF NOT EXISTS file_meta (
    path TEXT PRIMARY KEY,
    hash TEXT NOT NULL,
    mtime INTEGER NOT NULL,
    indexed_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// What [`ensure_vec_table`] had to do to get a usable vector view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecTableStatus {
    /// Table already existed with the requested dimensions.
    Ready,
    /// Table was created on an empty index.
    Created,
    /// Dimensions changed (or vectors were missing); every view was cleared.
    Rebuilt,
}

/// Initialize all schema tables except the vector view. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

/// Make sure `chunks_vec` exists with `dims` dimensions.
///
/// A dimension change invalidates every stored vector, so the table is
/// recreated and the primary, lexical and file-meta views are emptied to keep
/// them consistent; the caller must reindex.
pub fn ensure_vec_table(conn: &Connection, dims: usize) -> rusqlite::Result<VecTableStatus> {
    let stored = migrations::get_vector_dims(conn)?;
    let exists = table_exists(conn, "chunks_vec")?;

    if exists && stored == Some(dims) {
        return Ok(VecTableStatus::Ready);
    }

    let had_chunks = chunk_count(conn)? > 0;
    if exists {
        conn.execute_batch("DROP TABLE chunks_vec")?;
    }
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE chunks_vec USING vec0(\n    id TEXT PRIMARY KEY,\n    embedding FLOAT[{dims}]\n)"
    ))?;
    migrations::set_vector_dims(conn, dims)?;

    if had_chunks {
        clear_index(conn)?;
        Ok(VecTableStatus::Rebuilt)
    } else {
        Ok(VecTableStatus::Created)
    }
}

/// Drop the vector view when vector search is switched off, so a later
/// re-enable starts from a clean, consistent state.
pub fn drop_vec_table(conn: &Connection) -> rusqlite::Result<()> {
    if table_exists(conn, "chunks_vec")? {
        conn.execute_batch("DROP TABLE chunks_vec")?;
    }
    conn.execute("DELETE FROM schema_meta WHERE key = 'vector_dims'", [])?;
    Ok(())
}

pub fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

fn chunk_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
}

fn clear_index(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "DELETE FROM chunks;
         INSERT INTO chunks_fts(chunks_fts) VALUES('delete-all');
         DELETE FROM file_meta;",
    )
}
