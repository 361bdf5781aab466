//! Vector index over retrievable law units.
//!
//! The index holds one immutable [`Snapshot`] behind an `RwLock<Option<Arc<_>>>`.
//! A build embeds every unit into a fresh snapshot, persists it, and only then
//! swaps it in, so readers see either the previous snapshot or the new one and
//! a failed build changes nothing. Search is exact cosine similarity over
//! L2-normalised vectors, computed locally and synchronously.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fairtrade_ai::provider::check_shape;
use fairtrade_ai::{AiError, EmbeddingProvider};
use fairtrade_core::{RagConfig, RetrievableUnit, RetrievalResult};
use tracing::{debug, info, warn};

use crate::{StoreError, persist};

/// How a [`VectorIndex`] embeds and where it keeps its snapshot.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Snapshot directory; `None` keeps the index in memory only.
    pub dir: Option<PathBuf>,
    pub batch_size: usize,
    pub embed_timeout: Duration,
}

impl IndexOptions {
    pub fn from_config(config: &RagConfig) -> Self {
        Self {
            dir: Some(config.index_dir.clone()),
            batch_size: config.embedding.batch_size,
            embed_timeout: Duration::from_secs(config.embedding.timeout_secs),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            dir: None,
            batch_size: 64,
            embed_timeout: Duration::from_secs(30),
        }
    }
}

/// Summary of the live snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub units: usize,
    pub dimensions: usize,
    pub model: String,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub unit: RetrievableUnit,
    pub vector: Vec<f32>,
}

#[derive(Debug)]
pub(crate) struct Snapshot {
    pub entries: Vec<IndexEntry>,
    pub dims: usize,
    pub model: String,
    pub built_at: DateTime<Utc>,
}

impl Snapshot {
    fn stats(&self) -> IndexStats {
        IndexStats {
            units: self.entries.len(),
            dimensions: self.dims,
            model: self.model.clone(),
            built_at: self.built_at,
        }
    }
}

pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    options: IndexOptions,
    current: RwLock<Option<Arc<Snapshot>>>,
    build_lock: tokio::sync::Mutex<()>,
}

impl VectorIndex {
    /// Create an unbuilt index.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, options: IndexOptions) -> Self {
        Self {
            embedder,
            options,
            current: RwLock::new(None),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create an index, restoring the persisted snapshot when one exists.
    ///
    /// A snapshot built with a different model or width is ignored (the index
    /// starts unbuilt) since its vectors are not comparable with new queries.
    /// An unreadable snapshot is ignored the same way, so a rebuild can replace it.
    pub fn open(
        embedder: Arc<dyn EmbeddingProvider>,
        options: IndexOptions,
    ) -> Result<Self, StoreError> {
        let index = Self::new(embedder, options);
        let Some(dir) = index.options.dir.as_deref() else {
            return Ok(index);
        };
        let snapshot = match persist::read_snapshot(dir) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(index),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "ignoring unreadable index snapshot");
                return Ok(index);
            }
        };

        if snapshot.model != index.embedder.model_name()
            || snapshot.dims != index.embedder.dimensions()
        {
            warn!(
                dir = %dir.display(),
                persisted_model = %snapshot.model,
                persisted_dims = snapshot.dims,
                model = index.embedder.model_name(),
                "ignoring index built with a different embedding model"
            );
            return Ok(index);
        }

        info!(dir = %dir.display(), units = snapshot.entries.len(), "restored vector index");
        index.swap(snapshot);
        Ok(index)
    }

    /// Embed `units` and replace the whole index with them.
    ///
    /// On any failure the previous snapshot (or the unbuilt state) is kept and
    /// the call can simply be retried.
    pub async fn build(&self, units: &[RetrievableUnit]) -> Result<IndexStats, StoreError> {
        let _guard = self.build_lock.lock().await;

        let mut seen = HashSet::with_capacity(units.len());
        if let Some(dup) = units.iter().find(|u| !seen.insert(u.unit_id.as_str())) {
            return Err(StoreError::DuplicateUnit(dup.unit_id.clone()));
        }

        let dims = self.embedder.dimensions();
        let mut entries = Vec::with_capacity(units.len());

        for batch in units.chunks(self.options.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(RetrievableUnit::embedding_text).collect();
            let vectors = self.embed_with_timeout(&texts).await?;
            check_shape(&vectors, batch.len(), dims)?;
            for (unit, mut vector) in batch.iter().zip(vectors) {
                normalize(&mut vector);
                entries.push(IndexEntry {
                    unit: unit.clone(),
                    vector,
                });
            }
            debug!(embedded = entries.len(), total = units.len(), "embedded batch");
        }

        let snapshot = Snapshot {
            entries,
            dims,
            model: self.embedder.model_name().to_string(),
            built_at: Utc::now(),
        };

        if let Some(dir) = self.options.dir.as_deref() {
            persist::write_snapshot(dir, &snapshot)?;
        }

        let stats = snapshot.stats();
        self.swap(snapshot);
        info!(units = stats.units, dims = stats.dimensions, model = %stats.model, "vector index rebuilt");
        Ok(stats)
    }

    /// Embed `text` and return the `k` most similar units.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievalResult>, StoreError> {
        // Fail fast before touching the embedding backend.
        self.snapshot()?;
        let vectors = self.embed_with_timeout(&[text.to_string()]).await?;
        check_shape(&vectors, 1, self.embedder.dimensions())?;
        self.search(&vectors[0], k)
    }

    /// Top-k by cosine similarity against a raw query vector; ties by unit id.
    pub fn search(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>, StoreError> {
        let snapshot = self.snapshot()?;
        if vector.len() != snapshot.dims {
            return Err(StoreError::DimensionMismatch {
                expected: snapshot.dims,
                got: vector.len(),
            });
        }
        if k == 0 || snapshot.entries.is_empty() {
            return Ok(vec![]);
        }

        let mut query = vector.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(f32, &IndexEntry)> = snapshot
            .entries
            .iter()
            .map(|e| (dot(&query, &e.vector), e))
            .collect();

        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_by(by_rank);

        Ok(scored
            .into_iter()
            .map(|(score, e)| RetrievalResult {
                unit: e.unit.clone(),
                score,
            })
            .collect())
    }

    pub fn is_built(&self) -> bool {
        self.snapshot().is_ok()
    }

    pub fn stats(&self) -> Option<IndexStats> {
        self.snapshot().ok().map(|s| s.stats())
    }

    /// Unit ids in the live snapshot, sorted.
    pub fn unit_ids(&self) -> Result<Vec<String>, StoreError> {
        let snapshot = self.snapshot()?;
        let mut ids: Vec<String> = snapshot
            .entries
            .iter()
            .map(|e| e.unit.unit_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn contains(&self, unit_id: &str) -> bool {
        self.snapshot()
            .map(|s| s.entries.iter().any(|e| e.unit.unit_id == unit_id))
            .unwrap_or(false)
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    fn snapshot(&self) -> Result<Arc<Snapshot>, StoreError> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::IndexNotBuilt)
    }

    fn swap(&self, snapshot: Snapshot) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(snapshot));
    }

    async fn embed_with_timeout(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        let timeout = self.options.embed_timeout;
        match tokio::time::timeout(timeout, self.embedder.embed_batch(texts)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Embedding(AiError::Timeout(timeout))),
        }
    }
}

/// Descending score, then ascending unit id.
fn by_rank(a: &(f32, &IndexEntry), b: &(f32, &IndexEntry)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| a.1.unit.unit_id.cmp(&b.1.unit.unit_id))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
