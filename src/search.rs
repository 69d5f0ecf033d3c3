//! Hybrid retrieval: vector similarity and BM25 merged into one ranking.
//!
//! Both lookups fetch `limit × candidate_multiplier` candidates concurrently.
//! Each list is min-max normalized to `[0, 1]` on its own, then merged by
//! chunk id as `vector_weight · vectorScore + text_weight · textScore`.
//! Losing the embedding backend or the vector view degrades to lexical-only
//! ranking (text weight 1) instead of failing the query.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::SearchConfig;
use crate::embedding::EmbeddingProvider;
use crate::store::{IndexStore, ScoredChunk};

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Error, Debug, PartialEq)]
pub enum SearchError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("limit must be at least 1")]
    InvalidLimit,

    #[error("min_score must be a finite number, got {0}")]
    InvalidMinScore(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub snippet: String,
    pub score: f64,
    pub vector_score: f64,
    pub text_score: f64,
}

/// Per-call overrides of the configured defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
}

pub struct HybridSearch {
    store: Arc<IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
}

// ── Public API ────────────────────────────────────────────────────────────────

impl HybridSearch {
    pub fn new(
        store: Arc<IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Rank chunks for `query`. Input is validated before any lookup runs.
    pub async fn search(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let limit = options.limit.unwrap_or(self.config.max_results);
        if limit == 0 {
            return Err(SearchError::InvalidLimit);
        }
        let min_score = options.min_score.unwrap_or(self.config.min_score);
        if !min_score.is_finite() {
            return Err(SearchError::InvalidMinScore(min_score));
        }

        let candidates = limit.saturating_mul(self.config.candidate_multiplier.max(1));

        let (vector_hits, keyword_hits) = tokio::join!(
            self.vector_candidates(query, candidates),
            self.keyword_candidates(query, candidates),
        );

        // Without a vector lookup the ranking is lexical alone.
        let (vector_hits, vector_weight, text_weight) = match vector_hits {
            Some(hits) => (hits, self.config.vector_weight, self.config.text_weight),
            None => (Vec::new(), 0.0, 1.0),
        };
        tracing::debug!(
            query,
            vector = vector_hits.len(),
            keyword = keyword_hits.len(),
            lexical_only = vector_weight == 0.0,
            "search candidates"
        );

        let merged = merge_scores(
            &normalize(vector_hits),
            &normalize(keyword_hits),
            vector_weight,
            text_weight,
        );
        Ok(rank(merged, min_score, limit, self.config.snippet_chars))
    }

    /// `None` when no vector lookup could run: the store is lexical-only or
    /// the query could not be embedded.
    async fn vector_candidates(&self, query: &str, limit: usize) -> Option<Vec<ScoredChunk>> {
        if !self.store.is_vector_capable() {
            return None;
        }
        let embedding = match self.embedder.embed(query).await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, falling back to keyword search");
                return None;
            }
        };
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.search_vector(&embedding, limit)).await {
            Ok(hits) => Some(hits),
            Err(e) => {
                tracing::warn!(error = %e, "vector search task failed");
                None
            }
        }
    }

    async fn keyword_candidates(&self, query: &str, limit: usize) -> Vec<ScoredChunk> {
        let store = Arc::clone(&self.store);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || store.search_keyword(&query, limit))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "keyword search task failed");
                Vec::new()
            })
    }
}

// ── Scoring ───────────────────────────────────────────────────────────────────

/// Rescale scores to `[0, 1]` by min-max. A list with zero range (a single
/// hit, or all hits tied) has no worst entry, so every hit maps to 1.
pub fn normalize(mut hits: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    let Some(min) = hits.iter().map(|h| h.score).reduce(f64::min) else {
        return hits;
    };
    let max = hits.iter().map(|h| h.score).fold(min, f64::max);
    let range = max - min;
    for hit in &mut hits {
        hit.score = if range > 0.0 {
            (hit.score - min) / range
        } else {
            1.0
        };
    }
    hits
}

/// A chunk with both normalized component scores and their weighted sum.
#[derive(Debug, Clone)]
pub struct MergedHit {
    pub chunk: ScoredChunk,
    pub vector_score: f64,
    pub text_score: f64,
    pub score: f64,
}

/// Combine normalized vector and keyword hits by chunk id. A chunk missing
/// from one list gets 0 for that component.
pub fn merge_scores(
    vector: &[ScoredChunk],
    keyword: &[ScoredChunk],
    vector_weight: f64,
    text_weight: f64,
) -> Vec<MergedHit> {
    let mut merged: HashMap<&str, MergedHit> = HashMap::new();

    for hit in vector {
        merged.insert(
            &hit.id,
            MergedHit {
                chunk: hit.clone(),
                vector_score: hit.score,
                text_score: 0.0,
                score: 0.0,
            },
        );
    }
    for hit in keyword {
        merged
            .entry(&hit.id)
            .and_modify(|m| m.text_score = hit.score)
            .or_insert_with(|| MergedHit {
                chunk: hit.clone(),
                vector_score: 0.0,
                text_score: hit.score,
                score: 0.0,
            });
    }

    merged
        .into_values()
        .map(|mut m| {
            m.score = m.vector_score * vector_weight + m.text_score * text_weight;
            m
        })
        .collect()
}

/// Filter by `min_score`, sort best-first and cut to `limit`. Ties break on
/// path then line so the order is stable across runs.
pub fn rank(
    mut merged: Vec<MergedHit>,
    min_score: f64,
    limit: usize,
    snippet_chars: usize,
) -> Vec<SearchResult> {
    merged.retain(|m| m.score >= min_score);
    merged.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.path.cmp(&b.chunk.path))
            .then_with(|| a.chunk.start_line.cmp(&b.chunk.start_line))
    });
    merged
        .into_iter()
        .take(limit)
        .map(|m| SearchResult {
            snippet: truncate_snippet(&m.chunk.text, snippet_chars),
            path: m.chunk.path,
            start_line: m.chunk.start_line,
            end_line: m.chunk.end_line,
            score: m.score,
            vector_score: m.vector_score,
            text_score: m.text_score,
        })
        .collect()
}

/// Cut `text` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f64) -> ScoredChunk {
        ScoredChunk {
            id: id.into(),
            path: format!("{id}.md"),
            start_line: 1,
            end_line: 2,
            text: format!("text of {id}"),
            score,
        }
    }

    #[test]
    fn normalize_spreads_to_unit_range() {
        let out = normalize(vec![hit("a", 2.0), hit("b", 4.0), hit("c", 3.0)]);
        let scores: Vec<f64> = out.iter().map(|h| h.score).collect();
        assert_eq!(scores, vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn normalize_handles_empty_and_flat_lists() {
        assert!(normalize(Vec::new()).is_empty());
        let flat = normalize(vec![hit("a", 0.7), hit("b", 0.7)]);
        assert!(flat.iter().all(|h| h.score == 1.0));
        let single = normalize(vec![hit("a", -3.5)]);
        assert_eq!(single[0].score, 1.0);
    }

    #[test]
    fn merge_combines_components() {
        let vector = vec![hit("a", 1.0), hit("b", 0.5)];
        let keyword = vec![hit("b", 1.0), hit("c", 0.25)];
        let merged = merge_scores(&vector, &keyword, 0.7, 0.3);
        let by_id: HashMap<String, MergedHit> = merged
            .into_iter()
            .map(|m| (m.chunk.id.clone(), m))
            .collect();

        assert_eq!(by_id.len(), 3);
        assert!((by_id["a"].score - 0.7).abs() < 1e-9);
        assert_eq!(by_id["a"].text_score, 0.0);
        assert!((by_id["b"].score - (0.5 * 0.7 + 1.0 * 0.3)).abs() < 1e-9);
        assert_eq!(by_id["b"].vector_score, 0.5);
        assert_eq!(by_id["b"].text_score, 1.0);
        assert!((by_id["c"].score - 0.075).abs() < 1e-9);
        assert_eq!(by_id["c"].vector_score, 0.0);
    }

    #[test]
    fn rank_filters_sorts_and_truncates() {
        let merged = merge_scores(
            &[hit("a", 1.0), hit("b", 0.9), hit("c", 0.1)],
            &[],
            1.0,
            0.0,
        );
        let results = rank(merged, 0.5, 1, 700);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "a.md");

        let merged = merge_scores(&[hit("a", 1.0), hit("b", 0.9), hit("c", 0.1)], &[], 1.0, 0.0);
        let results = rank(merged, 0.5, 10, 700);
        let paths: Vec<&str> = results.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "b.md"]);
    }

    #[test]
    fn rank_breaks_ties_by_path() {
        let merged = merge_scores(&[hit("z", 1.0), hit("m", 1.0)], &[], 1.0, 0.0);
        let results = rank(merged, 0.0, 10, 700);
        assert_eq!(results[0].path, "m.md");
        assert_eq!(results[1].path, "z.md");
    }

    #[test]
    fn snippet_truncation() {
        assert_eq!(truncate_snippet("short", 700), "short");
        let long = "a".repeat(701);
        let cut = truncate_snippet(&long, 700);
        assert_eq!(cut.chars().count(), 700);
        assert!(cut.ends_with("..."));
        assert_eq!(&cut[..697], &long[..697]);
        let exact = "b".repeat(700);
        assert_eq!(truncate_snippet(&exact, 700), exact);
    }

    #[test]
    fn snippet_truncation_respects_char_boundaries() {
        let text = "记".repeat(10);
        assert_eq!(truncate_snippet(&text, 5), "记记...");
    }
}
