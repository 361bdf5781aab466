use std::sync::Arc;

use fairtrade_core::RetrievalResult;
use fairtrade_store::VectorIndex;
use tracing::debug;

use crate::EngineError;

/// Turns a free-text case description into the most relevant law units.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Top-`k` units for `case_description`, most similar first.
    ///
    /// An index built from zero units yields an empty list; an index that was
    /// never built is [`EngineError::IndexNotBuilt`].
    pub async fn retrieve(
        &self,
        case_description: &str,
        k: usize,
    ) -> Result<Vec<RetrievalResult>, EngineError> {
        let query = normalize_query(case_description)?;
        let results = self.index.query(&query, k).await?;
        debug!(
            k,
            hits = results.len(),
            top = results.first().map(|r| r.unit.unit_id.as_str()),
            "retrieved law units"
        );
        Ok(results)
    }
}

/// Trim and collapse runs of whitespace; blank input is rejected.
pub(crate) fn normalize_query(text: &str) -> Result<String, EngineError> {
    let query = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if query.is_empty() {
        return Err(EngineError::InvalidInput(
            "case description is empty".into(),
        ));
    }
    Ok(query)
}
