//! Document processing: header chunking, ingestion, retrieval, and answering.

pub mod chunking;
pub mod retrieval;
mod service;
pub mod types;
mod upload;

pub use chunking::{DEFAULT_HEADERS, HeaderSplitter};
pub use retrieval::{CONTEXT_CHUNK_LIMIT, Retriever, assemble_context};
pub use service::{IngestionPipeline, QueryPipeline, RagApi, RagService};
pub use types::{
    Chunk, ChunkingError, Document, IngestionError, InitError, QueryError, RetrievalError,
};
