//! Engine configuration.
//!
//! Every field has a documented default, so an empty JSON object (or no file
//! at all) yields a working configuration. API keys are never stored here;
//! backends read them from the environment variable named by `api_key_env`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::CoreError;

const DEFAULT_CORPUS_PATH: &str = "fair_trade_laws.json";
const DEFAULT_INDEX_DIR: &str = "law_index";
const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Persisted corpus written by the law collector.
    pub corpus_path: PathBuf,
    /// Directory owned by the vector index.
    pub index_dir: PathBuf,
    pub chunking: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
}

/// Long-article splitting thresholds, measured in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Articles at or below this length become a single unit.
    pub max_chars: usize,
    /// Upper bound on a window of a split article.
    pub window_chars: usize,
    /// Trailing context repeated at the start of the next window.
    pub overlap_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// k for plain retrieval when the caller gives none.
    pub default_k: usize,
    /// Number of passages placed in a case-analysis prompt.
    pub analysis_k: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Article text budget for one summary prompt.
    pub summary_input_chars: usize,
    pub api_key_env: Option<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from(DEFAULT_CORPUS_PATH),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            chunking: ChunkConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: 1200,
            window_chars: 800,
            overlap_chars: 160,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            analysis_k: 6,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: OPENAI_ENDPOINT.to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 64,
            timeout_secs: 30,
            api_key_env: Some(OPENAI_KEY_ENV.to_string()),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: OPENAI_ENDPOINT.to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 2048,
            timeout_secs: 120,
            summary_input_chars: 12_000,
            api_key_env: Some(OPENAI_KEY_ENV.to_string()),
        }
    }
}

impl RagConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would stall chunking or retrieval.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.chunking.validate()?;
        if self.retrieval.default_k == 0 || self.retrieval.analysis_k == 0 {
            return Err(CoreError::InvalidConfig("retrieval k must be at least 1".into()));
        }
        if self.embedding.dimensions == 0 || self.embedding.batch_size == 0 {
            return Err(CoreError::InvalidConfig(
                "embedding dimensions and batch_size must be positive".into(),
            ));
        }
        if self.embedding.timeout_secs == 0 || self.generation.timeout_secs == 0 {
            return Err(CoreError::InvalidConfig("backend timeouts must be positive".into()));
        }
        if self.generation.summary_input_chars == 0 {
            return Err(CoreError::InvalidConfig("summary_input_chars must be positive".into()));
        }
        Ok(())
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.window_chars == 0 || self.max_chars == 0 {
            return Err(CoreError::InvalidConfig(
                "chunking max_chars and window_chars must be positive".into(),
            ));
        }
        if self.overlap_chars >= self.window_chars {
            return Err(CoreError::InvalidConfig(format!(
                "overlap_chars ({}) must be smaller than window_chars ({})",
                self.overlap_chars, self.window_chars
            )));
        }
        Ok(())
    }
}
