//! Embedding provider trait and the OpenAI-compatible HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use fairtrade_core::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::AiError;

/// Converts text to fixed-length vectors.
///
/// Implementations return exactly one vector per input, in input order, each
/// of length [`dimensions`](Self::dimensions).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AiError::Malformed("empty embedding response".into()))
    }

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// `/embeddings` client for OpenAI and compatible servers (vLLM, LM Studio, Ollama's `/v1`).
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
}

impl OpenAiEmbeddings {
    /// Build a client from config. `api_key` is optional for local servers.
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            dims: config.dimensions,
        })
    }

    /// Build a client taking the key from `config.api_key_env`.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, AiError> {
        let key = crate::api_key_from_env(config.api_key_env.as_deref());
        Self::new(config, key)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let url = format!("{}/embeddings", self.endpoint);
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut req = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        debug!(url = %url, count = texts.len(), "requesting embeddings");
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let mut result: EmbeddingResponse = resp.json().await?;
        result.data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = result.data.into_iter().map(|d| d.embedding).collect();
        check_shape(&vectors, texts.len(), self.dims)?;
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Verify a provider returned `expected` finite vectors of width `dims`.
pub fn check_shape(vectors: &[Vec<f32>], expected: usize, dims: usize) -> Result<(), AiError> {
    if vectors.len() != expected {
        return Err(AiError::Malformed(format!(
            "expected {expected} embeddings, got {}",
            vectors.len()
        )));
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
        return Err(AiError::Malformed(format!(
            "embedding {i} has {} dimensions, expected {dims}",
            v.len()
        )));
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(AiError::Malformed("embedding contains non-finite values".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_config() {
        let config = EmbeddingConfig {
            endpoint: "http://localhost:11434/v1/".into(),
            model: "bge-m3".into(),
            dimensions: 1024,
            ..EmbeddingConfig::default()
        };
        let provider = OpenAiEmbeddings::new(&config, None).unwrap();
        assert_eq!(provider.dimensions(), 1024);
        assert_eq!(provider.model_name(), "bge-m3");
        assert_eq!(provider.endpoint, "http://localhost:11434/v1");
    }

    #[test]
    fn response_parses_and_reorders() {
        let json = r#"{"data": [
            {"index": 1, "embedding": [0.0, 1.0]},
            {"index": 0, "embedding": [1.0, 0.0]}
        ]}"#;
        let mut parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
    }

    #[test]
    fn shape_check_catches_count_and_width() {
        assert!(check_shape(&[vec![0.0, 1.0]], 1, 2).is_ok());
        assert!(matches!(
            check_shape(&[vec![0.0, 1.0]], 2, 2),
            Err(AiError::Malformed(_))
        ));
        assert!(matches!(
            check_shape(&[vec![0.0]], 1, 2),
            Err(AiError::Malformed(_))
        ));
        assert!(matches!(
            check_shape(&[vec![f32::NAN, 0.0]], 1, 2),
            Err(AiError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let config = EmbeddingConfig {
            endpoint: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..EmbeddingConfig::default()
        };
        let provider = OpenAiEmbeddings::new(&config, None).unwrap();
        let result = provider.embed("하도급 대금").await;
        assert!(result.is_err());
    }
}
