//! MCP `memory_recall` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryRecallParams {
    /// The user's message.
    #[schemars(description = "The user's message. Notes similar to it are returned with a ready-to-use <relevant-memories> context block.")]
    pub text: String,
}
