use std::path::PathBuf;

use fairtrade_ai::AiError;
use fairtrade_core::CoreError;
use fairtrade_store::StoreError;
use thiserror::Error;

/// Every failure a caller of the engine can observe.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no law data loaded: collect or load the law corpus first")]
    EmptyCorpus,

    #[error("vector index has not been built: run a build first")]
    IndexNotBuilt,

    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("law not found: {0}")]
    LawNotFound(String),

    #[error("generation backend error: {0}")]
    GenerationBackend(String),

    #[error("law corpus not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("malformed law corpus: {0}")]
    MalformedCorpus(String),

    #[error("law corpus unreadable: {0}")]
    CorpusUnreadable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("index storage error: {0}")]
    IndexStorage(String),
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::EmptyCorpus => Self::EmptyCorpus,
            CoreError::CorpusNotFound(path) => Self::CorpusNotFound(path),
            CoreError::MalformedCorpus(msg) => Self::MalformedCorpus(msg),
            CoreError::InvalidConfig(msg) => Self::InvalidConfig(msg),
            CoreError::Io(e) => Self::CorpusUnreadable(e.to_string()),
            CoreError::Json(e) => Self::MalformedCorpus(e.to_string()),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::IndexNotBuilt => Self::IndexNotBuilt,
            StoreError::Embedding(e) => Self::EmbeddingService(e.to_string()),
            other => Self::IndexStorage(other.to_string()),
        }
    }
}

impl From<AiError> for EngineError {
    fn from(e: AiError) -> Self {
        Self::GenerationBackend(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_engine_taxonomy() {
        assert!(matches!(
            EngineError::from(StoreError::IndexNotBuilt),
            EngineError::IndexNotBuilt
        ));
        assert!(matches!(
            EngineError::from(StoreError::Embedding(AiError::Unavailable("down".into()))),
            EngineError::EmbeddingService(msg) if msg.contains("down")
        ));
        assert!(matches!(
            EngineError::from(StoreError::DuplicateUnit("하도급법-1".into())),
            EngineError::IndexStorage(_)
        ));
    }

    #[test]
    fn core_errors_keep_their_kind() {
        let path = PathBuf::from("fair_trade_laws.json");
        assert!(matches!(
            EngineError::from(CoreError::CorpusNotFound(path.clone())),
            EngineError::CorpusNotFound(p) if p == path
        ));
        assert!(matches!(
            EngineError::from(CoreError::EmptyCorpus),
            EngineError::EmptyCorpus
        ));
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            EngineError::from(CoreError::Io(denied)),
            EngineError::CorpusUnreadable(msg) if msg.contains("denied")
        ));
    }
}
