//! MCP `memory_get` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryGetParams {
    #[schemars(description = "Workspace-relative path, e.g. 'MEMORY.md' or 'memory/2025-01-31.md'")]
    pub path: String,

    /// First line to return (1-based, inclusive).
    #[schemars(description = "First line to return (1-based). Use with end_line to read the lines a search hit points at.")]
    pub start_line: Option<usize>,

    /// Last line to return (inclusive).
    #[schemars(description = "Last line to return (inclusive)")]
    pub end_line: Option<usize>,
}
