//! CLI `doctor` command: run index diagnostics and check the embedding backend.

use anyhow::{Context, Result};

use crate::config::CairnConfig;
use crate::db;
use crate::embedding;

/// Print a health report for the index database and the embedding backend.
pub async fn doctor(config: &CairnConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("Cairn Health Report");
    println!("===================");
    println!();

    if db_path.exists() {
        let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
        let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
        let report = db::check_database_health(&conn).context("failed to run health check")?;

        println!("Database:          {}", db_path.display());
        println!("File size:         {}", format_bytes(file_size));
        println!("Schema version:    {}", report.schema_version);
        match &report.sqlite_vec_version {
            Some(v) => println!("sqlite-vec:        {v}"),
            None => println!("sqlite-vec:        unavailable (keyword search only)"),
        }
        println!();
        println!("Embedding model:");
        println!(
            "  Stored:          {}",
            report.embedding_model.as_deref().unwrap_or("(not set)")
        );
        println!("  Configured:      {}", config.embedding.model);
        if let Some(stored) = &report.embedding_model {
            if stored != &config.embedding.model {
                println!("  WARNING: model mismatch! Run `cairn reindex --full` to re-embed.");
            } else {
                println!("  Status:          OK (match)");
            }
        }
        if let Some(dims) = report.vector_dims {
            println!("  Dimensions:      {dims}");
        }
        println!();
        println!("Row counts:");
        println!("  Files:           {}", report.file_count);
        println!("  Chunks:          {}", report.chunk_count);
        match report.vector_count {
            Some(n) => {
                println!("  Vectors:         {n}");
                if n != report.chunk_count {
                    println!("  WARNING: vector count differs from chunk count. Run `cairn reindex --full`.");
                }
            }
            None => println!("  Vectors:         (no vector table)"),
        }
        println!();
        if report.integrity_ok {
            println!("Integrity check:   PASSED");
        } else {
            println!("Integrity check:   FAILED ({})", report.integrity_details);
        }
        println!(
            "Full-text index:   {}",
            if report.fts_ok { "PASSED" } else { "FAILED" }
        );
        if !report.integrity_ok || !report.fts_ok {
            println!();
            println!("Recovery: the index is derived from your notes and can be rebuilt.");
            println!("  rm {} && cairn reindex", db_path.display());
        }
    } else {
        println!("Database:          not found at {}", db_path.display());
        println!("Run `cairn reindex` or `cairn serve` to create it.");
    }

    println!();
    println!(
        "Embedding backend: {} ({})",
        config.embedding.provider, config.embedding.model
    );
    match embedding::create_provider(&config.embedding) {
        Ok(provider) => match provider.check_connection().await {
            Ok(()) => println!("  Connection:      OK ({} dimensions)", provider.dimensions()),
            Err(e) => println!("  Connection:      FAILED ({e})"),
        },
        Err(e) => println!("  Configuration:   FAILED ({e})"),
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
