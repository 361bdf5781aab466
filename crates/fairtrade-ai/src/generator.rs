//! Text generation backend: the [`Generator`] trait and an OpenAI-compatible
//! chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use fairtrade_core::GenerationConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::AiError;

/// A two-part chat prompt: fixed instructions plus the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String, AiError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat completions client for OpenAI and compatible servers.
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChat {
    pub fn new(config: &GenerationConfig, api_key: Option<String>) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Build a client taking the key from `config.api_key_env`.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, AiError> {
        let key = crate::api_key_from_env(config.api_key_env.as_deref());
        Self::new(config, key)
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }
}

#[async_trait]
impl Generator for OpenAiChat {
    async fn generate(&self, prompt: &Prompt) -> Result<String, AiError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: &prompt.system,
                },
                Message {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = self.endpoint();
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        debug!(url = %url, model = %self.model, prompt_chars = prompt.user.chars().count(), "requesting completion");
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        extract_content(parsed)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn extract_content(resp: ChatResponse) -> Result<String, AiError> {
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| AiError::Malformed("completion has no message content".into()))?;
    if content.trim().is_empty() {
        return Err(AiError::Malformed("completion is empty".into()));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(endpoint: &str) -> OpenAiChat {
        let config = GenerationConfig {
            endpoint: endpoint.into(),
            ..GenerationConfig::default()
        };
        OpenAiChat::new(&config, Some("sk-test".into())).unwrap()
    }

    #[test]
    fn endpoint_resolution() {
        assert_eq!(
            chat("https://api.openai.com/v1").endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat("http://localhost:1234/").endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            chat("http://gw/v1/chat/completions").endpoint(),
            "http://gw/v1/chat/completions"
        );
    }

    #[test]
    fn request_serialises_both_messages() {
        let prompt = Prompt::new("지시", "질문");
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: [
                Message {
                    role: "system",
                    content: &prompt.system,
                },
                Message {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.2,
            max_tokens: 10,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "질문");
    }

    #[test]
    fn content_extracted() {
        let resp: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "분석 결과"}}]}"#)
                .unwrap();
        assert_eq!(extract_content(resp).unwrap(), "분석 결과");
    }

    #[test]
    fn null_or_missing_content_is_malformed() {
        let null: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(matches!(extract_content(null), Err(AiError::Malformed(_))));

        let none: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(extract_content(none), Err(AiError::Malformed(_))));

        let blank: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "  "}}]}"#).unwrap();
        assert!(matches!(extract_content(blank), Err(AiError::Malformed(_))));
    }
}
