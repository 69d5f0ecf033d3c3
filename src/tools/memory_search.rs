//! MCP `memory_search` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `memory_search` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemorySearchParams {
    /// Natural language query.
    #[schemars(description = "Natural language query to search the notes")]
    pub query: String,

    /// Maximum number of results. Defaults to `search.max_results`.
    #[schemars(description = "Maximum number of results to return. Defaults to 6.")]
    pub max_results: Option<usize>,

    /// Minimum combined score (0.0-1.0). Defaults to `search.min_score`.
    #[schemars(description = "Minimum combined score (0.0-1.0). Defaults to 0.35.")]
    pub min_score: Option<f64>,
}
