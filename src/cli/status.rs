use anyhow::Result;

use crate::config::CairnConfig;
use crate::engine::MemoryEngine;

/// Print index status.
pub fn status(config: CairnConfig) -> Result<()> {
    let engine = MemoryEngine::open(config)?;
    let status = engine.status()?;

    println!("Workspace:         {}", status.workspace);
    println!("Files indexed:     {}", status.files_indexed);
    println!("Chunks:            {}", status.total_chunks);
    println!(
        "Last indexed:      {}",
        status.last_indexed_at.as_deref().unwrap_or("never")
    );
    println!(
        "Vector search:     {}",
        if status.vector_search { "enabled" } else { "disabled (keyword only)" }
    );
    println!(
        "Embedding:         {} / {}",
        status.embedding_provider, status.embedding_model
    );
    Ok(())
}
