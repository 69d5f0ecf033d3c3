pub mod memory_append;
pub mod memory_capture;
pub mod memory_get;
pub mod memory_recall;
pub mod memory_reindex;
pub mod memory_search;
pub mod memory_status;
pub mod memory_write;

use memory_append::MemoryAppendParams;
use memory_capture::MemoryCaptureParams;
use memory_get::MemoryGetParams;
use memory_recall::MemoryRecallParams;
use memory_reindex::MemoryReindexParams;
use memory_search::MemorySearchParams;
use memory_status::MemoryStatusParams;
use memory_write::MemoryWriteParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::Serialize;
use std::sync::Arc;

use crate::engine::MemoryEngine;
use crate::search::SearchOptions;

/// The Cairn MCP tool handler. Every tool is a thin call into the shared
/// [`MemoryEngine`]; results are returned as JSON strings.
#[derive(Clone)]
pub struct CairnTools {
    tool_router: ToolRouter<Self>,
    engine: Arc<MemoryEngine>,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_router]
impl CairnTools {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine,
        }
    }

    /// Hybrid search over the indexed notes.
    #[tool(description = "Search the markdown notes by natural language query. Returns ranked chunks (path, line range, snippet, scores) from combined vector and keyword search. Use memory_get with the line range to read more.")]
    async fn memory_search(
        &self,
        Parameters(params): Parameters<MemorySearchParams>,
    ) -> Result<String, String> {
        tracing::info!(query = %params.query, "memory_search called");
        let options = SearchOptions {
            limit: params.max_results,
            min_score: params.min_score,
        };
        let results = self
            .engine
            .search(&params.query, options)
            .await
            .map_err(|e| e.to_string())?;
        to_json(&serde_json::json!({
            "results": results,
            "total": results.len(),
        }))
    }

    /// Read a note, optionally a line range of it.
    #[tool(description = "Read a markdown file from the workspace, optionally only lines start_line..=end_line.")]
    async fn memory_get(
        &self,
        Parameters(params): Parameters<MemoryGetParams>,
    ) -> Result<String, String> {
        let lines = match (params.start_line, params.end_line) {
            (None, None) => None,
            (start, end) => {
                let start = start.unwrap_or(1);
                let end = end.unwrap_or(usize::MAX);
                if end < start {
                    return Err("end_line must not be before start_line".into());
                }
                Some((start, end))
            }
        };
        let text = self
            .engine
            .get(&params.path, lines)
            .await
            .map_err(|e| format!("{e:#}"))?;
        to_json(&serde_json::json!({ "path": params.path, "text": text }))
    }

    /// Append to a note.
    #[tool(description = "Append markdown to a file (default: today's daily log memory/YYYY-MM-DD.md). The index picks the change up through the file watcher or the next memory_reindex.")]
    async fn memory_append(
        &self,
        Parameters(params): Parameters<MemoryAppendParams>,
    ) -> Result<String, String> {
        if params.content.trim().is_empty() {
            return Err("content must not be empty".into());
        }
        let path = params
            .path
            .unwrap_or_else(|| self.engine.daily_log_path());
        let mut content = params.content;
        if !content.ends_with('\n') {
            content.push('\n');
        }
        tracing::info!(path = %path, content_len = content.len(), "memory_append called");
        self.engine
            .append(&path, &content)
            .await
            .map_err(|e| format!("{e:#}"))?;
        to_json(&serde_json::json!({ "path": path, "appended": content.len() }))
    }

    /// Overwrite a note.
    #[tool(description = "Create or overwrite a markdown file in the workspace. The index picks the change up through the file watcher or the next memory_reindex.")]
    async fn memory_write(
        &self,
        Parameters(params): Parameters<MemoryWriteParams>,
    ) -> Result<String, String> {
        tracing::info!(path = %params.path, content_len = params.content.len(), "memory_write called");
        self.engine
            .write(&params.path, &params.content)
            .await
            .map_err(|e| format!("{e:#}"))?;
        to_json(&serde_json::json!({
            "path": params.path,
            "written": params.content.len(),
        }))
    }

    /// Bring the index up to date with the workspace.
    #[tool(description = "Re-index the workspace. Incremental by default (changed files only, removed files purged); full=true clears and rebuilds everything.")]
    async fn memory_reindex(
        &self,
        Parameters(params): Parameters<MemoryReindexParams>,
    ) -> Result<String, String> {
        let full = params.full.unwrap_or(false);
        tracing::info!(full, "memory_reindex called");
        let report = self
            .engine
            .reindex(full)
            .await
            .map_err(|e| format!("reindex failed: {e:#}"))?;
        to_json(&report)
    }

    /// Index and backend status.
    #[tool(description = "Get index status: workspace, files indexed, total chunks, last index time, embedding provider and model.")]
    async fn memory_status(
        &self,
        Parameters(_params): Parameters<MemoryStatusParams>,
    ) -> Result<String, String> {
        let status = self.engine.status().map_err(|e| format!("{e:#}"))?;
        to_json(&status)
    }

    /// Notes related to a message, as prompt context.
    #[tool(description = "Recall notes semantically related to a message. Returns the matching notes and a <relevant-memories> context block to place before the conversation; empty when nothing is close enough.")]
    async fn memory_recall(
        &self,
        Parameters(params): Parameters<MemoryRecallParams>,
    ) -> Result<String, String> {
        let recall = self.engine.recall(&params.text).await;
        tracing::info!(recalled = recall.memories.len(), "memory_recall called");
        to_json(&recall)
    }

    /// Save a memorable statement to MEMORY.md.
    #[tool(description = "Offer a conversation message for automatic capture. Memorable statements (preferences, decisions, personal details, explicit requests to remember) are appended to MEMORY.md unless a near-identical memory already exists.")]
    async fn memory_capture(
        &self,
        Parameters(params): Parameters<MemoryCaptureParams>,
    ) -> Result<String, String> {
        let outcome = self
            .engine
            .capture(&params.text)
            .await
            .map_err(|e| format!("capture failed: {e:#}"))?;
        to_json(&outcome)
    }
}

#[tool_handler]
impl ServerHandler for CairnTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Cairn indexes a folder of markdown notes. Use memory_search to find \
                 relevant notes, memory_get to read them, and memory_append or \
                 memory_write to record new information. memory_recall returns \
                 related notes as ready-made context."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
