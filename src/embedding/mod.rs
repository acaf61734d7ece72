//! Embedding client abstraction and adapters.
//!
//! The pipelines only see [`EmbeddingClient`]; concrete providers are chosen once from
//! configuration by [`build_embedding_client`].

use crate::config::{Config, ConfigError, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;

mod ollama;
mod openai;

pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded or did not match the request.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Returned embedding dimension does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was configured for.
        expected: usize,
        /// Dimension actually produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Length of every vector this client produces.
    fn dimension(&self) -> usize;
}

/// Deterministic offline embedder that hashes words into a fixed number of slots.
///
/// Texts sharing vocabulary land close together under cosine similarity, which is enough for
/// local runs and tests. It carries no semantic knowledge.
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a hashing embedder producing vectors of the given length.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let hash = fnv1a(&word.to_lowercase());
            let position = (hash % dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[position] += sign;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the embedding client selected by configuration.
pub fn build_embedding_client(
    config: &Config,
    http: Client,
) -> Result<Arc<dyn EmbeddingClient>, ConfigError> {
    let dimension = config.embedding_dimension;
    let client: Arc<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::Azure => {
            let azure = config
                .azure_openai
                .as_ref()
                .ok_or_else(|| ConfigError::MissingVariable("AZURE_OPENAI_ENDPOINT".into()))?;
            Arc::new(OpenAiEmbeddingClient::azure(
                http,
                azure,
                &config.embedding_model,
                dimension,
            ))
        }
        EmbeddingProvider::OpenAI => {
            let openai = config
                .openai
                .as_ref()
                .ok_or_else(|| ConfigError::MissingVariable("OPENAI_API_KEY".into()))?;
            Arc::new(OpenAiEmbeddingClient::openai(
                http,
                openai,
                &config.embedding_model,
                dimension,
            ))
        }
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            http,
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            dimension,
        )),
        EmbeddingProvider::Hash => Arc::new(HashEmbeddingClient::new(dimension)),
    };
    tracing::info!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension,
        "Embedding client initialized"
    );
    Ok(client)
}
