//! CLI `reindex` command: bring the index up to date with the workspace.

use anyhow::Result;

use crate::config::CairnConfig;
use crate::engine::MemoryEngine;

pub async fn reindex(config: CairnConfig, full: bool) -> Result<()> {
    let engine = MemoryEngine::open(config)?;

    let pb = super::spinner(if full {
        "rebuilding index"
    } else {
        "indexing changed files"
    });
    let report = engine.reindex(full).await;
    pb.finish_and_clear();
    let report = report?;

    println!("Indexed:  {} file(s), {} chunk(s)", report.files_indexed, report.chunks_created);
    println!("Skipped:  {} unchanged", report.files_skipped);
    println!("Removed:  {} missing", report.files_removed);
    if !report.errors.is_empty() {
        println!();
        println!("Failed:   {} file(s)", report.errors.len());
        for failure in &report.errors {
            println!("  {}: {}", failure.path, failure.error);
        }
    }
    Ok(())
}
