use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CairnConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub sync: SyncConfig,
    pub capture: CaptureConfig,
    pub recall: RecallConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub workspace_dir: String,
    pub db_path: String,
    /// Set to false to run lexical-only even when sqlite-vec is available.
    pub vector_search: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `ollama`, `openai` or `gemini`.
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Overrides the built-in model dimension table.
    pub dimensions: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub respect_headers: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub min_score: f64,
    pub vector_weight: f64,
    pub text_weight: f64,
    pub candidate_multiplier: usize,
    pub snippet_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub watch_enabled: bool,
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub min_length: usize,
    pub max_length: usize,
    pub dedup_threshold: f64,
    /// Workspace-relative file that captured lines are appended to.
    pub memory_file: String,
    /// Extra rules evaluated before the built-in ones.
    pub rules: Vec<CaptureRuleConfig>,
}

/// A user-supplied capture rule, e.g.
///
/// ```toml
/// [[capture.rules]]
/// trigger = "(?i)\\bdeadline\\b"
/// category = "fact"
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureRuleConfig {
    pub trigger: String,
    pub exclude: Option<String>,
    pub category: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecallConfig {
    pub enabled: bool,
    pub top_k: usize,
    pub min_score: f64,
    /// Context wrapper; `{memories}` is replaced by the numbered hits.
    pub template: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8787,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = default_cairn_dir();
        Self {
            workspace_dir: base.join("workspace").to_string_lossy().into_owned(),
            db_path: base.join("index.db").to_string_lossy().into_owned(),
            vector_search: true,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            model: "nomic-embed-text".into(),
            base_url: None,
            api_key: None,
            dimensions: None,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            overlap_tokens: 50,
            respect_headers: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 6,
            min_score: 0.35,
            vector_weight: 0.7,
            text_weight: 0.3,
            candidate_multiplier: 4,
            snippet_chars: 700,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            watch_enabled: true,
            debounce_ms: 1500,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_length: 10,
            max_length: 500,
            dedup_threshold: 0.95,
            memory_file: "MEMORY.md".into(),
            rules: Vec::new(),
        }
    }
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 3,
            min_score: 0.3,
            template: "<relevant-memories>\n\
                       The following memories may be relevant to this conversation:\n\
                       {memories}\n\
                       </relevant-memories>"
                .into(),
        }
    }
}

/// Returns `~/.cairn/`, or `./.cairn/` when no home directory is known.
pub fn default_cairn_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cairn")
}

/// Returns the default config file path: `~/.cairn/config.toml`
pub fn default_config_path() -> PathBuf {
    default_cairn_dir().join("config.toml")
}

impl CairnConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            CairnConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (CAIRN_WORKSPACE, CAIRN_DB, CAIRN_LOG_LEVEL,
    /// CAIRN_EMBEDDING_PROVIDER, CAIRN_EMBEDDING_MODEL, CAIRN_API_KEY).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CAIRN_WORKSPACE") {
            self.storage.workspace_dir = val;
        }
        if let Ok(val) = std::env::var("CAIRN_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("CAIRN_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("CAIRN_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("CAIRN_EMBEDDING_MODEL") {
            self.embedding.model = val;
        }
        if let Ok(val) = std::env::var("CAIRN_API_KEY") {
            self.embedding.api_key = Some(val);
        }
    }

    /// Reject combinations the chunker and ranker cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            bail!("chunking.max_tokens must be greater than 0");
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            bail!(
                "chunking.overlap_tokens ({}) must be smaller than chunking.max_tokens ({})",
                self.chunking.overlap_tokens,
                self.chunking.max_tokens
            );
        }
        if self.search.vector_weight < 0.0 || self.search.text_weight < 0.0 {
            bail!("search weights must be non-negative");
        }
        if self.search.candidate_multiplier == 0 {
            bail!("search.candidate_multiplier must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.capture.dedup_threshold) {
            bail!("capture.dedup_threshold must be between 0.0 and 1.0");
        }
        if self.recall.top_k == 0 {
            bail!("recall.top_k must be at least 1");
        }
        if !self.recall.template.contains("{memories}") {
            bail!("recall.template must contain a {{memories}} placeholder");
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the workspace root, expanding `~` if needed.
    pub fn resolved_workspace_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.workspace_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
