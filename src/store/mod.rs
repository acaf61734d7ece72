//! Named vector indexes holding embedded chunks.
//!
//! Each ingestion writes one index. Ranking, including hybrid fusion, belongs to the store;
//! callers only choose between [`SearchMode::Semantic`] and [`SearchMode::Hybrid`].

use crate::config::{Config, IndexBackend};
use crate::processing::types::Chunk;
use crate::qdrant::QdrantStore;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use thiserror::Error;

mod memory;

pub use memory::InMemoryIndexStore;

/// Reciprocal rank fusion constant shared by the hybrid implementations.
pub const RRF_K: f32 = 60.0;

/// Chunk plus its embedding, ready to be written into an index.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Chunk text and heading metadata.
    pub chunk: Chunk,
    /// Embedding computed from `chunk.content`.
    pub vector: Vec<f32>,
    /// Filename of the upload the chunk came from.
    pub source: Option<String>,
}

/// Ranking strategy requested from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Vector similarity only.
    Semantic,
    /// Vector similarity fused with keyword matching.
    Hybrid,
}

/// Search request against a single index.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Raw query text, used for keyword matching.
    pub text: String,
    /// Query embedding.
    pub vector: Vec<f32>,
    /// Maximum number of results.
    pub limit: usize,
    /// Ranking strategy.
    pub mode: SearchMode,
}

/// Search hit in rank order.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Stored chunk.
    pub chunk: Chunk,
    /// Store-specific relevance score; higher is better.
    pub score: f32,
}

/// Errors returned by index stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid index store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Store responded with an unexpected status code.
    #[error("Unexpected index store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Named index does not exist.
    #[error("Index not found: {0}")]
    NotFound(String),
    /// Store refused the records (for example a vector dimension mismatch).
    #[error("Index store rejected request: {0}")]
    Rejected(String),
}

/// Interface implemented by vector index backends.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Create `name` for vectors of `dimension`, replacing any index with the same name.
    async fn create_index(&self, name: &str, dimension: usize) -> Result<(), StoreError>;

    /// Whether `name` exists.
    async fn index_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Append records to an existing index.
    async fn upsert(&self, name: &str, records: Vec<ChunkRecord>) -> Result<(), StoreError>;

    /// Return up to `query.limit` chunks ranked by relevance.
    async fn search(&self, name: &str, query: &SearchQuery) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Drop an index. Deleting a missing index is not an error.
    async fn delete_index(&self, name: &str) -> Result<(), StoreError>;

    /// Whether [`SearchMode::Hybrid`] is honored.
    fn supports_hybrid(&self) -> bool;
}

/// Build the index store selected by configuration.
pub fn build_index_store(config: &Config, http: Client) -> Result<Arc<dyn IndexStore>, StoreError> {
    let store: Arc<dyn IndexStore> = match config.index_backend {
        IndexBackend::Qdrant => Arc::new(QdrantStore::new(
            http,
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
            config.hybrid_search,
        )?),
        IndexBackend::Memory => {
            Arc::new(InMemoryIndexStore::new().with_hybrid(config.hybrid_search))
        }
    };
    tracing::info!(
        backend = ?config.index_backend,
        hybrid = store.supports_hybrid(),
        "Index store initialized"
    );
    Ok(store)
}
