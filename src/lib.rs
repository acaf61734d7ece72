#![deny(missing_docs)]

//! Core library for docrag: document ingestion and retrieval-augmented question answering.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Prompt templating and completion backends.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
/// Human-readable index identifiers.
pub mod naming;
mod openai_compat;
/// Document parsers producing markdown text.
pub mod parsing;
/// Chunking, ingestion, retrieval, and answering pipelines.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Vector index abstraction and the in-memory store.
pub mod store;
