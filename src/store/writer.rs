//! Transactional writer over the primary, lexical and vector views.

use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::{embedding_to_bytes, ChunkRecord, FileMeta};

/// Handed out by [`super::IndexStore::write`]. Every method touches all live
/// views so they stay in step; the enclosing transaction makes the whole
/// closure atomic.
pub struct ViewWriter<'a> {
    conn: &'a Connection,
    vectors: bool,
}

/// Columns needed to retract a row from the external-content FTS index.
struct IndexedRow {
    rowid: i64,
    id: String,
    path: String,
    text: String,
}

impl<'a> ViewWriter<'a> {
    pub(super) fn new(conn: &'a Connection, vectors: bool) -> Self {
        Self { conn, vectors }
    }

    /// Insert (or replace, by id) one chunk in every view.
    pub fn insert_chunk(&mut self, chunk: &ChunkRecord) -> Result<()> {
        if self.vectors && chunk.embedding.is_none() {
            bail!("chunk {} has no embedding but the vector view is live", chunk.id);
        }

        let existing = self
            .conn
            .query_row(
                "SELECT rowid, id, path, text FROM chunks WHERE id = ?1",
                params![chunk.id],
                read_indexed_row,
            )
            .optional()?;
        if let Some(row) = existing {
            self.retract(&row)?;
        }

        let embedding_bytes = chunk.embedding.as_deref().map(embedding_to_bytes);
        self.conn.execute(
            "INSERT INTO chunks (id, path, start_line, end_line, text, hash, embedding, model, source, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                chunk.id,
                chunk.path,
                chunk.start_line as i64,
                chunk.end_line as i64,
                chunk.text,
                chunk.hash,
                embedding_bytes,
                chunk.model,
                chunk.source.as_str(),
                chunk.created_at,
                chunk.updated_at,
            ],
        )?;
        let rowid = self.conn.last_insert_rowid();

        // Must use the same rowid as the `chunks` row.
        self.conn.execute(
            "INSERT INTO chunks_fts (rowid, text, id, path) VALUES (?1, ?2, ?3, ?4)",
            params![rowid, chunk.text, chunk.id, chunk.path],
        )?;

        if let (true, Some(bytes)) = (self.vectors, embedding_bytes) {
            self.conn.execute(
                "INSERT INTO chunks_vec (id, embedding) VALUES (?1, ?2)",
                params![chunk.id, bytes],
            )?;
        }
        Ok(())
    }

    /// Remove every chunk of `path` from all views.
    pub fn delete_chunks_by_path(&mut self, path: &str) -> Result<usize> {
        let rows = {
            let mut stmt = self
                .conn
                .prepare("SELECT rowid, id, path, text FROM chunks WHERE path = ?1")?;
            let rows = stmt
                .query_map(params![path], read_indexed_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        for row in &rows {
            self.retract(row)?;
        }
        Ok(rows.len())
    }

    pub fn upsert_file_meta(&mut self, meta: &FileMeta) -> Result<()> {
        self.conn.execute(
            "INSERT INTO file_meta (path, hash, mtime, indexed_at, chunk_count) VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(path) DO UPDATE SET hash = excluded.hash, mtime = excluded.mtime, \
             indexed_at = excluded.indexed_at, chunk_count = excluded.chunk_count",
            params![
                meta.path,
                meta.hash,
                meta.mtime,
                meta.indexed_at,
                meta.chunk_count as i64
            ],
        )?;
        Ok(())
    }

    pub fn delete_file_meta(&mut self, path: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM file_meta WHERE path = ?1", params![path])?;
        Ok(())
    }

    /// Empty every view and all file meta.
    pub fn clear_all(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM chunks;
             INSERT INTO chunks_fts(chunks_fts) VALUES('delete-all');
             DELETE FROM file_meta;",
        )?;
        if self.vectors {
            self.conn.execute("DELETE FROM chunks_vec", [])?;
        }
        Ok(())
    }

    fn retract(&mut self, row: &IndexedRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO chunks_fts (chunks_fts, rowid, text, id, path) VALUES ('delete', ?1, ?2, ?3, ?4)",
            params![row.rowid, row.text, row.id, row.path],
        )?;
        if self.vectors {
            self.conn
                .execute("DELETE FROM chunks_vec WHERE id = ?1", params![row.id])?;
        }
        self.conn
            .execute("DELETE FROM chunks WHERE rowid = ?1", params![row.rowid])?;
        Ok(())
    }
}

fn read_indexed_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexedRow> {
    Ok(IndexedRow {
        rowid: row.get(0)?,
        id: row.get(1)?,
        path: row.get(2)?,
        text: row.get(3)?,
    })
}
