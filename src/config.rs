//! Environment-driven configuration.
//!
//! Values are read once at process start (after loading an optional `.env` file) into a
//! [`Config`] that is passed by reference to the constructors of every backend adapter. Nothing
//! below the binaries reads the process environment directly.

use reqwest::Client;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docrag service and CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to (`SERVER_PORT`, else the platform-injected `PORT`).
    pub server_port: u16,
    /// Backend used to turn uploaded files into text.
    pub document_parser: ParserBackend,
    /// Azure AI Document Intelligence settings, present when the Azure parser is selected.
    pub document_intelligence: Option<DocumentIntelligenceSettings>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model (or Azure deployment) identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Completion provider used to generate answers.
    pub completion_provider: CompletionProvider,
    /// Chat model (or Azure deployment) identifier passed to the provider.
    pub completion_model: String,
    /// Azure OpenAI credentials, present when any Azure provider is selected.
    pub azure_openai: Option<AzureOpenAiSettings>,
    /// OpenAI credentials, present when any OpenAI provider is selected.
    pub openai: Option<OpenAiSettings>,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Vector index backend.
    pub index_backend: IndexBackend,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Whether retrieval should request keyword+vector hybrid search from the index.
    pub hybrid_search: bool,
    /// Number of chunks sent per upsert request.
    pub upsert_batch_size: usize,
    /// Number of chunks requested from the index per question.
    pub retrieval_top_k: usize,
    /// Optional override for the per-chunk token budget.
    pub text_splitter_chunk_size: Option<usize>,
    /// Timeout applied to every outbound HTTP request.
    pub http_timeout: Duration,
}

/// Supported document parsing backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserBackend {
    /// Azure AI Document Intelligence layout model.
    Azure,
    /// In-process reader for text, markdown and (with the `pdf` feature) PDF files.
    Local,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Azure OpenAI deployment.
    Azure,
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline hashing embedder.
    Hash,
}

/// Supported completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionProvider {
    /// Azure OpenAI chat deployment.
    Azure,
    /// Hosted OpenAI chat completions API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported vector index backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexBackend {
    /// Qdrant over its REST API.
    Qdrant,
    /// Process-local store; indexes vanish on restart.
    Memory,
}

/// Connection settings for Azure AI Document Intelligence.
#[derive(Clone, Debug)]
pub struct DocumentIntelligenceSettings {
    /// Resource endpoint, e.g. `https://my-resource.cognitiveservices.azure.com`.
    pub endpoint: String,
    /// Subscription key.
    pub api_key: String,
    /// Analyze model identifier.
    pub model: String,
    /// Delay between polls of a running analysis.
    pub poll_interval: Duration,
}

/// Connection settings for Azure OpenAI.
#[derive(Clone, Debug)]
pub struct AzureOpenAiSettings {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    /// API key sent in the `api-key` header.
    pub api_key: String,
    /// API version used for embedding calls.
    pub embedding_api_version: String,
    /// API version used for chat completion calls.
    pub chat_api_version: String,
}

/// Connection settings for the OpenAI API.
#[derive(Clone, Debug)]
pub struct OpenAiSettings {
    /// Bearer token.
    pub api_key: String,
    /// Base URL including the version prefix.
    pub base_url: String,
}

const DEFAULT_SERVER_PORT: u16 = 3000;
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_COMPLETION_MODEL: &str = "gpt-35-turbo";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_QDRANT_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_UPSERT_BATCH_SIZE: usize = 64;
const DEFAULT_RETRIEVAL_TOP_K: usize = 4;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as absent. Provider-specific credentials are only required when
    /// the corresponding provider is selected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Lookup(lookup);

        let document_parser = vars.parse_or("DOCUMENT_PARSER", ParserBackend::Azure)?;
        let embedding_provider = vars.parse_or("EMBEDDING_PROVIDER", EmbeddingProvider::Azure)?;
        let completion_provider =
            vars.parse_or("COMPLETION_PROVIDER", CompletionProvider::Azure)?;

        let document_intelligence = if document_parser == ParserBackend::Azure {
            Some(DocumentIntelligenceSettings {
                endpoint: vars.required("AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT")?,
                api_key: vars.required("AZURE_DOCUMENT_INTELLIGENCE_KEY")?,
                model: vars
                    .optional("DOCUMENT_INTELLIGENCE_MODEL")
                    .unwrap_or_else(|| "prebuilt-layout".to_string()),
                poll_interval: Duration::from_millis(
                    vars.parse_or("DOCUMENT_INTELLIGENCE_POLL_MS", DEFAULT_POLL_INTERVAL_MS)?,
                ),
            })
        } else {
            None
        };

        let needs_azure = embedding_provider == EmbeddingProvider::Azure
            || completion_provider == CompletionProvider::Azure;
        let azure_openai = if needs_azure {
            Some(AzureOpenAiSettings {
                endpoint: vars.required("AZURE_OPENAI_ENDPOINT")?,
                api_key: vars.required("AZURE_OPENAI_API_KEY")?,
                embedding_api_version: vars
                    .optional("AZURE_OPENAI_EMBEDDING_API_VERSION")
                    .unwrap_or_else(|| "2023-05-15".to_string()),
                chat_api_version: vars
                    .optional("AZURE_OPENAI_CHAT_API_VERSION")
                    .unwrap_or_else(|| "2024-02-01".to_string()),
            })
        } else {
            None
        };

        let needs_openai = embedding_provider == EmbeddingProvider::OpenAI
            || completion_provider == CompletionProvider::OpenAI;
        let openai = if needs_openai {
            Some(OpenAiSettings {
                api_key: vars.required("OPENAI_API_KEY")?,
                base_url: vars
                    .optional("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            })
        } else {
            None
        };

        let embedding_dimension =
            vars.parse_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        let upsert_batch_size =
            vars.parse_or("INDEX_UPSERT_BATCH_SIZE", DEFAULT_UPSERT_BATCH_SIZE)?;
        if upsert_batch_size == 0 {
            return Err(ConfigError::InvalidValue("INDEX_UPSERT_BATCH_SIZE".into()));
        }
        let retrieval_top_k = vars.parse_or("RETRIEVAL_TOP_K", DEFAULT_RETRIEVAL_TOP_K)?;
        if retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }

        Ok(Self {
            server_port: match vars.parse_optional("SERVER_PORT")? {
                Some(port) => port,
                None => vars.parse_or("PORT", DEFAULT_SERVER_PORT)?,
            },
            document_parser,
            document_intelligence,
            embedding_provider,
            embedding_model: vars
                .optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension,
            completion_provider,
            completion_model: vars
                .optional("COMPLETION_MODEL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            azure_openai,
            openai,
            ollama_url: vars
                .optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            index_backend: vars.parse_or("INDEX_BACKEND", IndexBackend::Qdrant)?,
            qdrant_url: vars
                .optional("QDRANT_URL")
                .unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            qdrant_api_key: vars.optional("QDRANT_API_KEY"),
            hybrid_search: vars.parse_bool_or("INDEX_HYBRID_SEARCH", true)?,
            upsert_batch_size,
            retrieval_top_k,
            text_splitter_chunk_size: vars.parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?,
            http_timeout: Duration::from_secs(
                vars.parse_or("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
            ),
        })
    }

    /// Build the shared HTTP client used by every remote adapter.
    pub fn http_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .user_agent(concat!("docrag/", env!("CARGO_PKG_VERSION")))
            .timeout(self.http_timeout)
            .build()
    }
}

/// Load `.env` (when present) and the process environment into a [`Config`].
pub fn load() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        server_port = config.server_port,
        parser = ?config.document_parser,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        completion_provider = ?config.completion_provider,
        completion_model = %config.completion_model,
        index_backend = ?config.index_backend,
        hybrid_search = config.hybrid_search,
        "Loaded configuration"
    );
    Ok(config)
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn parse_optional<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.optional(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string()))
            })
            .transpose()
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.parse_optional(key)?.unwrap_or(default))
    }

    fn parse_bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key).map(|value| value.to_lowercase()) {
            None => Ok(default),
            Some(value) => match value.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue(key.to_string())),
            },
        }
    }
}

impl std::str::FromStr for ParserBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for CompletionProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for IndexBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}
