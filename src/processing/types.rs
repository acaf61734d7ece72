//! Core data types and error definitions for the ingestion and query pipelines.

use crate::{
    config::ConfigError, embedding::EmbeddingClientError, generation::GenerationError,
    parsing::ParseError, store::StoreError,
};
use anyhow::Error as TokenizerError;
use std::collections::BTreeMap;
use thiserror::Error;

/// Uploaded document handed to the ingestion pipeline.
///
/// Owned by a single ingestion call and dropped once it has been staged for parsing.
#[derive(Debug, Clone)]
pub struct Document {
    /// Name declared by the uploader; only its extension is used.
    pub filename: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl Document {
    /// Wrap raw bytes and their declared filename.
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Contiguous span of document text tagged with the headings in effect at its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Non-empty section text.
    pub content: String,
    /// Heading label (e.g. `Header 1`) mapped to heading text.
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    /// Build a chunk from its content and heading metadata.
    pub fn new(content: impl Into<String>, metadata: BTreeMap<String, String>) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// Errors produced while turning normalized text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The upload could not be staged on local disk.
    #[error("Failed to stage uploaded document: {0}")]
    Upload(#[from] std::io::Error),
    /// The document parser rejected the file or was unreachable.
    #[error("Failed to parse document: {0}")]
    Parse(#[from] ParseError),
    /// Parsing succeeded but yielded no text.
    #[error("Document contains no extractable content")]
    EmptyDocument,
    /// Splitting produced zero chunks, so no index was created.
    #[error("Document produced no chunks to index")]
    NoChunksProduced,
    /// Chunk budgeting could not be prepared.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the chunks.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The index store rejected collection creation or an upsert.
    #[error("Failed to store document index: {0}")]
    StorageFailure(#[from] StoreError),
}

/// Errors emitted while retrieving chunks for a query.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// No collection exists under the requested identifier.
    #[error("Index not found: {0}")]
    IndexNotFound(String),
    /// The index store could not serve the request.
    #[error("Index backend unavailable: {0}")]
    BackendUnavailable(#[source] StoreError),
    /// Embedding provider failed to return a vector for the query text.
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingClientError),
}

/// Errors emitted by the query pipeline.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The question was blank.
    #[error("Question must not be empty")]
    EmptyQuestion,
    /// Retrieval failed; `IndexNotFound` is passed through unchanged.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    /// The completion backend failed.
    #[error("Failed to generate answer: {0}")]
    Generation(#[from] GenerationError),
}

/// Errors raised while wiring the service from configuration.
#[derive(Debug, Error)]
pub enum InitError {
    /// Configuration was incomplete for the selected backends.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Shared HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    /// Index store could not be constructed.
    #[error("Failed to initialize index store: {0}")]
    Store(#[from] StoreError),
    /// Tokenizer for the embedding model could not be loaded.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
}
