//! OpenAI-compatible backend (`/embeddings`). Works against api.openai.com
//! and self-hosted servers that speak the same API; a custom `base_url`
//! makes the API key optional.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_width, ensure_success, http_client, resolve_dimensions, EmbeddingError, EmbeddingProvider};
use crate::config::EmbeddingConfig;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_DIMENSIONS: usize = 1536;

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        if api_key.is_none() && config.base_url.is_none() {
            return Err(EmbeddingError::MissingApiKey { provider: "openai" });
        }
        Ok(Self {
            client: http_client()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.clone(),
            dimensions: resolve_dimensions(config, DEFAULT_DIMENSIONS),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

/// The API may return items out of order; `index` ties them to the inputs.
fn in_input_order(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if data.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            });
        let response = self.authorized(request).send().await?;
        let body: EmbeddingResponse = ensure_success(response).await?.json().await?;
        in_input_order(body.data, texts.len())?
            .into_iter()
            .map(|v| check_width(v, self.dimensions))
            .collect()
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn check_connection(&self) -> Result<(), EmbeddingError> {
        let request = self.client.get(format!("{}/models", self.base_url));
        let response = self.authorized(request).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}
