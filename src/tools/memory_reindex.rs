//! MCP `memory_reindex` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryReindexParams {
    /// Clear the index and re-embed every document.
    #[schemars(description = "If true, clear the index and re-embed every document. Otherwise only changed files are re-indexed.")]
    pub full: Option<bool>,
}
