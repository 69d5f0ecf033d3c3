//! MCP `memory_append` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryAppendParams {
    #[schemars(description = "Markdown text to append")]
    pub content: String,

    /// Target file. Defaults to today's daily log `memory/YYYY-MM-DD.md`.
    #[schemars(description = "Workspace-relative .md file to append to. Defaults to today's daily log (memory/YYYY-MM-DD.md).")]
    pub path: Option<String>,
}
