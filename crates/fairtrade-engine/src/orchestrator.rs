//! The engine facade: corpus, index, retrieval and analysis behind one owner.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use fairtrade_ai::{EmbeddingProvider, Generator, OpenAiChat, OpenAiEmbeddings};
use fairtrade_core::{
    Chunker, Corpus, LawRecord, RagConfig, RetrievableUnit, RetrievalResult, load_corpus,
};
use fairtrade_store::{IndexOptions, IndexStats, VectorIndex, index_exists};
use serde::Serialize;
use tracing::info;

use crate::composer::{AnalysisResult, Composer};
use crate::retriever::Retriever;
use crate::EngineError;

/// Readiness snapshot for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub corpus_path: PathBuf,
    /// Size of the corpus file, `None` when it does not exist.
    pub corpus_bytes: Option<u64>,
    /// Laws in the loaded corpus, `None` until one is loaded.
    pub laws_loaded: Option<usize>,
    pub index_dir: PathBuf,
    pub index_persisted: bool,
    pub index_built: bool,
    pub units: Option<usize>,
    pub built_at: Option<DateTime<Utc>>,
    pub embedding_model: String,
    pub generation_model: String,
}

pub struct FairTradeRag {
    config: RagConfig,
    chunker: Chunker,
    composer: Composer,
    generation_model: String,
    corpus: RwLock<Option<Arc<Corpus>>>,
}

impl FairTradeRag {
    /// Assemble the engine from explicit backends.
    ///
    /// A previously persisted index in `config.index_dir` is restored when it
    /// was built with the same embedding model.
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let chunker = Chunker::new(config.chunking.clone())?;
        let index = VectorIndex::open(embedder, IndexOptions::from_config(&config))?;
        let generation_model = generator.model_name().to_string();
        let composer = Composer::new(Retriever::new(Arc::new(index)), generator, &config);
        Ok(Self {
            config,
            chunker,
            composer,
            generation_model,
            corpus: RwLock::new(None),
        })
    }

    /// Assemble the engine with the OpenAI-compatible HTTP backends.
    pub fn from_config(config: RagConfig) -> Result<Self, EngineError> {
        let embedder = OpenAiEmbeddings::from_config(&config.embedding)
            .map_err(|e| EngineError::EmbeddingService(e.to_string()))?;
        let generator = OpenAiChat::from_config(&config.generation)
            .map_err(|e| EngineError::GenerationBackend(e.to_string()))?;
        Self::new(config, Arc::new(embedder), Arc::new(generator))
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        self.composer.retriever().index()
    }

    /// The corpus loaded by the last successful [`load_law_data`](Self::load_law_data).
    pub fn corpus(&self) -> Option<Arc<Corpus>> {
        self.corpus
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Read the corpus file and replace the held snapshot.
    pub fn load_law_data(&self) -> Result<Arc<Corpus>, EngineError> {
        let corpus = Arc::new(load_corpus(&self.config.corpus_path)?);
        *self.corpus.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&corpus));
        Ok(corpus)
    }

    /// Split laws into retrievable units.
    pub fn prepare_documents(&self, laws: &[LawRecord]) -> Result<Vec<RetrievableUnit>, EngineError> {
        let units = self.chunker.chunk(laws)?;
        info!(laws = laws.len(), units = units.len(), "prepared documents");
        Ok(units)
    }

    /// Replace the index with exactly `documents`.
    pub async fn create_vector_database(
        &self,
        documents: &[RetrievableUnit],
    ) -> Result<IndexStats, EngineError> {
        Ok(self.index().build(documents).await?)
    }

    /// Reload the corpus file, re-chunk it and rebuild the index.
    pub async fn rebuild_index(&self) -> Result<IndexStats, EngineError> {
        let corpus = self.load_law_data()?;
        let units = self.prepare_documents(corpus.laws())?;
        self.create_vector_database(&units).await
    }

    /// Top-`k` law units for a case; `None` uses the configured default.
    pub async fn retrieve(
        &self,
        case_description: &str,
        k: Option<usize>,
    ) -> Result<Vec<RetrievalResult>, EngineError> {
        let k = k.unwrap_or(self.config.retrieval.default_k);
        self.composer.retriever().retrieve(case_description, k).await
    }

    pub async fn analyze_case(&self, case_description: &str) -> Result<AnalysisResult, EngineError> {
        self.composer.analyze_case(case_description).await
    }

    /// Summarise one law or, with `None`, the whole corpus. Loads the corpus
    /// file first when none is held.
    pub async fn get_law_summary(&self, law_title: Option<&str>) -> Result<String, EngineError> {
        let corpus = match self.corpus() {
            Some(corpus) => corpus,
            None => self.load_law_data()?,
        };
        self.composer.summarize_law(&corpus, law_title).await
    }

    pub fn status(&self) -> SystemStatus {
        let stats = self.index().stats();
        SystemStatus {
            corpus_path: self.config.corpus_path.clone(),
            corpus_bytes: std::fs::metadata(&self.config.corpus_path)
                .ok()
                .filter(|m| m.is_file())
                .map(|m| m.len()),
            laws_loaded: self.corpus().map(|c| c.len()),
            index_dir: self.config.index_dir.clone(),
            index_persisted: index_exists(&self.config.index_dir),
            index_built: stats.is_some(),
            units: stats.as_ref().map(|s| s.units),
            built_at: stats.as_ref().map(|s| s.built_at),
            embedding_model: self.index().embedder().model_name().to_string(),
            generation_model: self.generation_model.clone(),
        }
    }
}
