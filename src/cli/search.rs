use anyhow::Result;

use crate::config::CairnConfig;
use crate::engine::MemoryEngine;
use crate::search::SearchOptions;

/// Run a search from the terminal.
pub async fn search(
    config: CairnConfig,
    query: &str,
    limit: Option<usize>,
    min_score: Option<f64>,
) -> Result<()> {
    let engine = MemoryEngine::open(config)?;
    let results = engine
        .search(query, SearchOptions { limit, min_score })
        .await?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", results.len());
    for (i, result) in results.iter().enumerate() {
        println!(
            "  {}. {}:{}-{} (score: {:.3}, vector: {:.3}, text: {:.3})",
            i + 1,
            result.path,
            result.start_line,
            result.end_line,
            result.score,
            result.vector_score,
            result.text_score,
        );
        let preview = crate::search::truncate_snippet(&result.snippet.replace('\n', " "), 160);
        println!("     {preview}");
        println!();
    }
    Ok(())
}
