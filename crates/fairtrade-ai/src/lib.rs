//! AI backends: text embeddings for the law index and text generation for analysis.
//!
//! Both are capability traits ([`EmbeddingProvider`], [`Generator`]) so the
//! retrieval and composition logic never depends on a concrete provider.

mod error;
pub mod generator;
pub mod provider;

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::OnnxEmbeddings;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::AiError;
pub use generator::{Generator, OpenAiChat, Prompt};
pub use provider::{EmbeddingProvider, OpenAiEmbeddings};

/// Read an API key from the environment variable a config names, ignoring blanks.
pub fn api_key_from_env(var: Option<&str>) -> Option<String> {
    var.and_then(|name| std::env::var(name).ok())
        .filter(|key| !key.trim().is_empty())
}
