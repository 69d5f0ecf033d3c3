//! Ollama backend (`/api/embeddings`). Ollama has no batch endpoint, so
//! batches go one text at a time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_width, ensure_success, http_client, resolve_dimensions, EmbeddingError, EmbeddingProvider};
use crate::config::EmbeddingConfig;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_DIMENSIONS: usize = 768;

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: http_client()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            dimensions: resolve_dimensions(config, DEFAULT_DIMENSIONS),
        })
    }
}

/// `nomic-embed-text` matches a pulled `nomic-embed-text:latest`.
fn model_is_pulled(tags: &[TagEntry], model: &str) -> bool {
    tags.iter().any(|t| {
        t.name == model
            || t.name
                .strip_prefix(model)
                .is_some_and(|rest| rest.starts_with(':'))
    })
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;
        let body: EmbeddingResponse = ensure_success(response).await?.json().await?;
        check_width(body.embedding, self.dimensions)
    }

    async fn check_connection(&self) -> Result<(), EmbeddingError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        let tags: TagsResponse = ensure_success(response).await?.json().await?;
        if model_is_pulled(&tags.models, &self.model) {
            Ok(())
        } else {
            Err(EmbeddingError::ModelNotFound {
                provider: "ollama",
                model: self.model.clone(),
            })
        }
    }
}
