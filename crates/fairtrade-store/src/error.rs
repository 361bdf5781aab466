use fairtrade_ai::AiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector index has not been built")]
    IndexNotBuilt,

    #[error("embedding service error: {0}")]
    Embedding(#[from] AiError),

    #[error("query vector has {got} dimensions, index has {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("duplicate unit id: {0}")]
    DuplicateUnit(String),

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
