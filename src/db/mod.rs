pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the index database at the given path, with extensions
/// registered and the schema migrated. The vector view is set up separately
/// by the store once the embedding dimensions are known.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL lets searches read while the sync coordinator writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open a migrated in-memory database (tests and throwaway indexes).
pub fn open_memory_database() -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Returns the sqlite-vec version, or `None` if the extension is not usable.
pub fn sqlite_vec_version(conn: &Connection) -> Option<String> {
    conn.query_row("SELECT vec_version()", [], |r| r.get(0)).ok()
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: u32,
    pub sqlite_vec_version: Option<String>,
    pub chunk_count: u64,
    pub file_count: u64,
    /// `None` when the vector view does not exist.
    pub vector_count: Option<u64>,
    pub fts_ok: bool,
    pub embedding_model: Option<String>,
    pub vector_dims: Option<usize>,
}

/// Run integrity checks and gather row counts for `cairn doctor`.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let integrity: String = conn
        .query_row("PRAGMA integrity_check", [], |r| r.get(0))
        .context("integrity check failed to run")?;

    let count = |sql: &str| -> Result<u64> {
        let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
        Ok(n as u64)
    };

    let chunk_count = count("SELECT COUNT(*) FROM chunks")?;
    let file_count = count("SELECT COUNT(*) FROM file_meta")?;
    let vector_count = if schema::table_exists(conn, "chunks_vec")? {
        count("SELECT COUNT(*) FROM chunks_vec").ok()
    } else {
        None
    };

    // FTS5 cross-checks the external-content index against `chunks`.
    let fts_ok = conn
        .execute(
            "INSERT INTO chunks_fts(chunks_fts, rank) VALUES('integrity-check', 1)",
            [],
        )
        .is_ok();

    Ok(HealthReport {
        integrity_ok: integrity == "ok",
        integrity_details: integrity,
        schema_version: migrations::get_schema_version(conn)?,
        sqlite_vec_version: sqlite_vec_version(conn),
        chunk_count,
        file_count,
        vector_count,
        fts_ok,
        embedding_model: migrations::get_embedding_model(conn)?,
        vector_dims: migrations::get_vector_dims(conn)?,
    })
}
