//! MCP `memory_write` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryWriteParams {
    #[schemars(description = "Workspace-relative .md file to create or overwrite")]
    pub path: String,

    #[schemars(description = "Full new markdown content of the file")]
    pub content: String,
}
