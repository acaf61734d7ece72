//! Markdown header splitting with token-budget enforcement.
//!
//! Documents arrive as markdown. [`HeaderSplitter`] starts a new chunk at every configured heading
//! marker and records the headings in effect as chunk metadata. Sections that exceed the
//! embedding model's token budget are re-split with `semchunk-rs`; sections within budget are
//! emitted verbatim.
//!
//! Token counting prefers `tiktoken-rs` for OpenAI-family models and falls back to a whitespace
//! counter when the model's tokenizer is unavailable (common for Ollama models).

use crate::config::{Config, EmbeddingProvider};
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::collections::BTreeMap;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size, o200k_base, p50k_base,
    p50k_edit, r50k_base,
};

use super::types::{Chunk, ChunkingError};

pub(crate) type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Heading markers split on by default, paired with their metadata labels.
pub const DEFAULT_HEADERS: [(&str, &str); 3] =
    [("#", "Header 1"), ("##", "Header 2"), ("###", "Header 3")];

const MIN_AUTOMATIC_CHUNK_SIZE: usize = 256;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 2048;
const FENCES: [&str; 2] = ["```", "~~~"];

#[derive(Debug, Clone)]
struct HeadingRule {
    marker: String,
    label: String,
    level: usize,
}

struct TokenBudget {
    size: usize,
    counter: TokenCounter,
}

/// Splits markdown text into [`Chunk`]s at heading boundaries.
pub struct HeaderSplitter {
    // Longest marker first so `##` is never read as `#`.
    rules: Vec<HeadingRule>,
    budget: Option<TokenBudget>,
}

impl std::fmt::Debug for HeaderSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderSplitter")
            .field("rules", &self.rules)
            .field("token_budget", &self.budget.as_ref().map(|budget| budget.size))
            .finish()
    }
}

impl Default for HeaderSplitter {
    fn default() -> Self {
        Self::new(&DEFAULT_HEADERS)
    }
}

impl HeaderSplitter {
    /// Build a splitter for `(marker, label)` pairs. A marker's nesting level is its length.
    pub fn new(headers: &[(&str, &str)]) -> Self {
        let mut rules: Vec<HeadingRule> = headers
            .iter()
            .filter(|(marker, _)| !marker.is_empty())
            .map(|(marker, label)| HeadingRule {
                marker: (*marker).to_string(),
                label: (*label).to_string(),
                level: marker.chars().count(),
            })
            .collect();
        rules.sort_by(|a, b| b.marker.len().cmp(&a.marker.len()));
        Self {
            rules,
            budget: None,
        }
    }

    /// Default headers with the token budget derived from the embedding configuration.
    pub fn from_config(config: &Config) -> Result<Self, ChunkingError> {
        let size = determine_chunk_size(
            config.text_splitter_chunk_size,
            config.embedding_provider,
            &config.embedding_model,
        );
        let counter = build_token_counter(config.embedding_provider, &config.embedding_model)?;
        tracing::debug!(chunk_size = size, "Header splitter token budget");
        Self::default().with_token_budget(size, counter)
    }

    /// Re-split sections whose token count exceeds `size`.
    pub(crate) fn with_token_budget(
        mut self,
        size: usize,
        counter: TokenCounter,
    ) -> Result<Self, ChunkingError> {
        if size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        self.budget = Some(TokenBudget { size, counter });
        Ok(self)
    }

    /// Split `text` into chunks carrying the headings in effect at their position.
    ///
    /// Text before the first heading becomes a chunk with empty metadata. Whitespace-only
    /// sections are dropped, so empty input yields no chunks.
    pub fn split_text(&self, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut active: BTreeMap<usize, (&str, String)> = BTreeMap::new();
        let mut section: Vec<&str> = Vec::new();
        let mut open_fence: Option<&str> = None;

        for line in text.lines() {
            let stripped = line.trim_start();

            if let Some(fence) = open_fence {
                if stripped.starts_with(fence) {
                    open_fence = None;
                }
                section.push(line);
                continue;
            }

            if let Some(fence) = FENCES.iter().find(|fence| stripped.starts_with(**fence)) {
                open_fence = Some(*fence);
                section.push(line);
                continue;
            }

            match self.match_heading(line) {
                Some((rule, heading)) => {
                    self.flush(&mut section, &active, &mut chunks);
                    active.retain(|level, _| *level < rule.level);
                    active.insert(rule.level, (rule.label.as_str(), heading.to_string()));
                }
                None => section.push(line),
            }
        }
        self.flush(&mut section, &active, &mut chunks);

        chunks
    }

    fn match_heading<'a>(&self, line: &'a str) -> Option<(&HeadingRule, &'a str)> {
        let stripped = line.trim();
        self.rules.iter().find_map(|rule| {
            let rest = stripped.strip_prefix(rule.marker.as_str())?;
            if !rest.starts_with(char::is_whitespace) {
                return None;
            }
            let heading = rest.trim();
            (!heading.is_empty()).then_some((rule, heading))
        })
    }

    fn flush(
        &self,
        section: &mut Vec<&str>,
        active: &BTreeMap<usize, (&str, String)>,
        chunks: &mut Vec<Chunk>,
    ) {
        let lines = std::mem::take(section);
        let Some(first) = lines.iter().position(|line| !line.trim().is_empty()) else {
            return;
        };
        let last = lines
            .iter()
            .rposition(|line| !line.trim().is_empty())
            .unwrap_or(first);
        let content = lines[first..=last].join("\n");

        let metadata: BTreeMap<String, String> = active
            .values()
            .map(|(label, heading)| ((*label).to_string(), heading.clone()))
            .collect();

        match &self.budget {
            Some(budget) if budget.counter.as_ref()(&content) > budget.size => {
                let counter = budget.counter.clone();
                let chunker = Chunker::new(
                    budget.size,
                    Box::new(move |segment: &str| counter.as_ref()(segment)),
                );
                chunks.extend(
                    chunker
                        .chunk(&content)
                        .into_iter()
                        .filter(|piece| !piece.trim().is_empty())
                        .map(|piece| Chunk::new(piece, metadata.clone())),
                );
            }
            _ => chunks.push(Chunk::new(content, metadata)),
        }
    }
}

/// Determine the per-chunk token budget.
///
/// An explicit override (`TEXT_SPLITTER_CHUNK_SIZE`) wins and is clamped at `>= 1`. Otherwise the
/// budget is a quarter of the embedding model's context window, clamped into `[256, 2048]`.
pub(crate) fn determine_chunk_size(
    override_size: Option<usize>,
    provider: EmbeddingProvider,
    model: &str,
) -> usize {
    if let Some(explicit) = override_size {
        return explicit.max(1);
    }

    let window = embedding_context_window(provider, model);
    (window / 4).clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE)
}

/// Look up the embedding context window for a given provider/model combination.
pub(crate) fn embedding_context_window(provider: EmbeddingProvider, model: &str) -> usize {
    match provider {
        EmbeddingProvider::Azure | EmbeddingProvider::OpenAI => {
            openai_embedding_context_window(model)
        }
        EmbeddingProvider::Ollama => ollama_embedding_context_window(model),
        EmbeddingProvider::Hash => 4096,
    }
}

fn openai_embedding_context_window(model: &str) -> usize {
    if model.starts_with("text-embedding-3") || model.starts_with("text-embedding-ada-002") {
        return 8192;
    }

    let size = get_context_size(model);
    if size == 4096 && model.contains("embedding") {
        tracing::debug!(model, "Using default embedding context window fallback");
    }
    size
}

fn ollama_embedding_context_window(model: &str) -> usize {
    let normalized = model.to_lowercase();
    match normalized.as_str() {
        "nomic-embed-text" | "mxbai-embed-large" | "mxbai-embed-large-v1" => 8192,
        value if value.contains("all-minilm") => 512,
        value if value.contains("e5-large") => 4096,
        _ => {
            tracing::trace!(model, "Using default Ollama context window estimate");
            4096
        }
    }
}

/// Build a token counter for the given provider/model.
///
/// Azure deployments are often named freely, so unknown names resolve to `cl100k_base`.
pub(crate) fn build_token_counter(
    provider: EmbeddingProvider,
    model: &str,
) -> Result<TokenCounter, ChunkingError> {
    match provider {
        EmbeddingProvider::Azure | EmbeddingProvider::OpenAI => build_tiktoken_counter(model),
        EmbeddingProvider::Ollama => match build_tiktoken_counter(model) {
            Ok(counter) => Ok(counter),
            Err(error) => {
                tracing::warn!(
                    model,
                    error = %error,
                    "Tokenizer unavailable for Ollama model; falling back to whitespace counter"
                );
                Ok(whitespace_token_counter())
            }
        },
        EmbeddingProvider::Hash => Ok(whitespace_token_counter()),
    }
}

fn build_tiktoken_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::debug!(model, "Using 'cl100k_base' encoding for token counting");
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

pub(crate) fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}
