//! Google Gemini backend (`:embedContent` / `:batchEmbedContents`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_width, ensure_success, http_client, resolve_dimensions, EmbeddingError, EmbeddingProvider};
use crate::config::EmbeddingConfig;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_DIMENSIONS: usize = 768;

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct Values {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Values,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Values>,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(EmbeddingError::MissingApiKey { provider: "gemini" })?;
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

    fn request<'a>(&self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: [Part { text }],
            },
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{method}?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn provider(&self) -> &str {
        "gemini"
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
            .post(self.endpoint("embedContent"))
            .json(&self.request(text))
            .send()
            .await?;
        let body: EmbedResponse = ensure_success(response).await?.json().await?;
        check_width(body.embedding.values, self.dimensions)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batch = BatchRequest {
            requests: texts.iter().map(|t| self.request(t)).collect(),
        };
        let response = self
            .client
            .post(self.endpoint("batchEmbedContents"))
            .json(&batch)
            .send()
            .await?;
        let body: BatchResponse = ensure_success(response).await?.json().await?;
        if body.embeddings.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }
        body.embeddings
            .into_iter()
            .map(|v| check_width(v.values, self.dimensions))
            .collect()
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn check_connection(&self) -> Result<(), EmbeddingError> {
        let response = self
            .client
            .get(format!("{}/models?key={}", self.base_url, self.api_key))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_required() {
        let config = EmbeddingConfig {
            provider: "gemini".into(),
            model: "gemini-embedding-001".into(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            GeminiProvider::new(&config),
            Err(EmbeddingError::MissingApiKey { provider: "gemini" })
        ));
    }

    #[test]
    fn request_shape_matches_api() {
        let config = EmbeddingConfig {
            provider: "gemini".into(),
            model: "gemini-embedding-001".into(),
            api_key: Some("k".into()),
            ..EmbeddingConfig::default()
        };
        let provider = GeminiProvider::new(&config).unwrap();
        let json = serde_json::to_value(provider.request("hello")).unwrap();
        assert_eq!(json["model"], "models/gemini-embedding-001");
        assert_eq!(json["content"]["parts"][0]["text"], "hello");
        assert_eq!(
            provider.endpoint("embedContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent?key=k"
        );
        assert_eq!(provider.dimensions(), 768);
    }
}
