//! Query-time retrieval and context assembly.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::processing::types::RetrievalError;
use crate::store::{IndexStore, ScoredChunk, SearchMode, SearchQuery, StoreError};
use std::sync::Arc;

/// Number of retrieved chunks that make it into the prompt context.
pub const CONTEXT_CHUNK_LIMIT: usize = 3;

/// Separator placed between chunk contents in the prompt context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Embeds a query and asks the index store for the most relevant chunks.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn IndexStore>,
    top_k: usize,
}

impl Retriever {
    /// Build a retriever returning `top_k` results by default.
    pub fn new(embedder: Arc<dyn EmbeddingClient>, store: Arc<dyn IndexStore>, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            top_k: top_k.max(1),
        }
    }

    /// Default number of results requested per query.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Return up to `k` chunks from `index` ranked by relevance to `query`.
    ///
    /// Hybrid search is used whenever the store supports it.
    pub async fn retrieve(
        &self,
        index: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let exists = self
            .store
            .index_exists(index)
            .await
            .map_err(RetrievalError::BackendUnavailable)?;
        if !exists {
            tracing::warn!(index, "Query against unknown index");
            return Err(RetrievalError::IndexNotFound(index.to_string()));
        }

        let vector = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| {
                EmbeddingClientError::InvalidResponse("no embedding returned for query".into())
            })?;

        let mode = if self.store.supports_hybrid() {
            SearchMode::Hybrid
        } else {
            SearchMode::Semantic
        };
        let search = SearchQuery {
            text: query.to_string(),
            vector,
            limit: k,
            mode,
        };

        let results = self
            .store
            .search(index, &search)
            .await
            .map_err(|error| match error {
                StoreError::NotFound(name) => RetrievalError::IndexNotFound(name),
                other => RetrievalError::BackendUnavailable(other),
            })?;

        tracing::debug!(index, k, ?mode, results = results.len(), "Retrieved chunks");
        Ok(results)
    }
}

/// Join the contents of the first [`CONTEXT_CHUNK_LIMIT`] results in rank order.
pub fn assemble_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .take(CONTEXT_CHUNK_LIMIT)
        .map(|result| result.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
