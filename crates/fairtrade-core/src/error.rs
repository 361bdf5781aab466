use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("corpus is empty: load law data before chunking")]
    EmptyCorpus,

    #[error("law corpus not found: {0}")]
    CorpusNotFound(PathBuf),

    #[error("malformed law corpus: {0}")]
    MalformedCorpus(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
