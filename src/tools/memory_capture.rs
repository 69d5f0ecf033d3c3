//! MCP `memory_capture` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryCaptureParams {
    /// A message from the conversation.
    #[schemars(description = "A conversation message. Preferences, decisions, personal details and explicit 'remember' requests are saved to MEMORY.md; anything else is ignored.")]
    pub text: String,
}
