//! Text-to-vector embedding over HTTP.
//!
//! Provides the async [`EmbeddingProvider`] trait and three backends: Ollama,
//! OpenAI-compatible servers (OpenAI, vLLM, LM Studio, ...) and Google Gemini.
//! The provider is created via [`create_provider`] from configuration.
//! A provider never returns an empty or wrongly-sized vector in place of an
//! error.

pub mod gemini;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EmbeddingConfig;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("{provider} requires an API key (set embedding.api_key or CAIRN_API_KEY)")]
    MissingApiKey { provider: &'static str },

    #[error("model {model} is not available on the {provider} server")]
    ModelNotFound { provider: &'static str, model: String },

    #[error("expected a {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("unknown embedding provider: {0}. Supported: ollama, openai, gemini")]
    UnknownProvider(String),
}

/// Trait for embedding text into vectors.
///
/// `dimensions()` is fixed for the lifetime of a provider; every returned
/// vector has exactly that many components.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Backend name, e.g. `"ollama"`.
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts, preserving order. Backends without a native batch
    /// endpoint fall back to one request per text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// True when [`Self::embed_batch`] sends many texts in one request. The
    /// indexer embeds one text at a time otherwise.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Cheap round-trip that proves the backend is reachable and the model exists.
    async fn check_connection(&self) -> Result<(), EmbeddingError>;
}

/// Known embedding widths by model name.
pub fn model_dimensions(model: &str) -> Option<usize> {
    let dims = match model {
        "nomic-embed-text" => 768,
        "mxbai-embed-large" => 1024,
        "all-minilm" => 384,
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        "text-embedding-ada-002" => 1536,
        "gemini-embedding-001" | "text-embedding-004" => 768,
        "Qwen3-Embedding-0.6B" | "qwen3-embedding-0.6b" => 1024,
        _ => return None,
    };
    Some(dims)
}

/// Width for `config.model`: explicit override, then the model table, then
/// the backend's usual default.
pub fn resolve_dimensions(config: &EmbeddingConfig, provider_default: usize) -> usize {
    config
        .dimensions
        .or_else(|| model_dimensions(&config.model))
        .unwrap_or(provider_default)
}

/// Create an embedding provider from config.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>, EmbeddingError> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider.as_str() {
        "ollama" => Box::new(ollama::OllamaProvider::new(config)?),
        "openai" => Box::new(openai::OpenAiProvider::new(config)?),
        "gemini" => Box::new(gemini::GeminiProvider::new(config)?),
        other => return Err(EmbeddingError::UnknownProvider(other.to_string())),
    };
    tracing::info!(
        provider = provider.provider(),
        model = provider.model(),
        dims = provider.dimensions(),
        "embedding provider ready"
    );
    Ok(provider)
}

pub(crate) fn http_client() -> Result<reqwest::Client, EmbeddingError> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()?)
}

/// Turn a non-2xx response into [`EmbeddingError::Api`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, EmbeddingError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(EmbeddingError::Api {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn check_width(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    if vector.is_empty() {
        return Err(EmbeddingError::InvalidResponse("empty embedding".into()));
    }
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector)
}
