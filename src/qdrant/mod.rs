//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub(crate) mod types;

pub use client::QdrantStore;
pub use payload::compute_chunk_hash;
