pub mod chunker;
pub mod config;
pub mod error;
pub mod law;
pub mod schema;
pub mod sort_key;
pub mod unit;

pub use chunker::Chunker;
pub use config::{ChunkConfig, EmbeddingConfig, GenerationConfig, RagConfig, RetrievalConfig};
pub use error::CoreError;
pub use law::{ArticleRecord, Corpus, LawRecord, load_corpus, save_corpus};
pub use sort_key::article_sort_key;
pub use unit::{RetrievableUnit, RetrievalResult};
