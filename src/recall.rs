//! Recall: the notes nearest to a piece of text, formatted as context that a
//! client can place in front of its prompt.
//!
//! Recall is best-effort. A lexical-only store, an embedding failure or a
//! failed lookup all yield an empty [`Recall`].

use serde::Serialize;
use std::sync::Arc;

use crate::config::RecallConfig;
use crate::embedding::EmbeddingProvider;
use crate::store::IndexStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalledNote {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    /// Cosine similarity to the input.
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recall {
    pub memories: Vec<RecalledNote>,
    /// Rendered template, empty when nothing was recalled.
    pub context: String,
}

impl Recall {
    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    /// `prompt` with the recalled context in front of it.
    pub fn prepend_to(&self, prompt: &str) -> String {
        if self.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{prompt}", self.context)
        }
    }
}

/// Look up the `top_k` nearest chunks and keep those scoring at least
/// `min_score`.
pub async fn recall(
    store: &Arc<IndexStore>,
    embedder: &dyn EmbeddingProvider,
    text: &str,
    config: &RecallConfig,
) -> Recall {
    let text = text.trim();
    if text.is_empty() || !store.is_vector_capable() {
        return Recall::default();
    }
    let embedding = match embedder.embed(text).await {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "recall embedding failed");
            return Recall::default();
        }
    };

    let lookup = Arc::clone(store);
    let top_k = config.top_k;
    let hits = match tokio::task::spawn_blocking(move || lookup.search_vector(&embedding, top_k)).await
    {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(error = %e, "recall lookup task failed");
            return Recall::default();
        }
    };

    let memories: Vec<RecalledNote> = hits
        .into_iter()
        .filter(|hit| hit.score >= config.min_score)
        .map(|hit| RecalledNote {
            path: hit.path,
            start_line: hit.start_line,
            end_line: hit.end_line,
            text: hit.text,
            score: hit.score,
        })
        .collect();
    if memories.is_empty() {
        return Recall::default();
    }

    tracing::debug!(recalled = memories.len(), "notes recalled");
    Recall {
        context: format_context(&config.template, &memories),
        memories,
    }
}

/// Numbered `[path] text (relevance: N%)` lines substituted for `{memories}`.
pub fn format_context(template: &str, memories: &[RecalledNote]) -> String {
    let lines: Vec<String> = memories
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "{}. [{}] {} (relevance: {:.0}%)",
                i + 1,
                m.path,
                m.text,
                m.score * 100.0
            )
        })
        .collect();
    template.replace("{memories}", &lines.join("\n"))
}
