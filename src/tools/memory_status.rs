//! MCP `memory_status` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `memory_status` takes no arguments.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryStatusParams {}
