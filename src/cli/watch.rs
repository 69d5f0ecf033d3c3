//! CLI `watch` command: keep the index in sync until ctrl-c.

use anyhow::{Context, Result};

use crate::config::CairnConfig;
use crate::engine::MemoryEngine;

pub async fn watch(config: CairnConfig) -> Result<()> {
    let engine = MemoryEngine::open(config)?;
    let report = engine.start_watching().await?;
    println!(
        "Indexed {} file(s), {} unchanged. Watching {} (ctrl-c to stop)",
        report.files_indexed,
        report.files_skipped,
        engine.workspace().root().display()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    engine.shutdown().await;
    println!("Stopped.");
    Ok(())
}
