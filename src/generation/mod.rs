//! Answer generation through prompt-templated completion calls.
//!
//! Providers are reached over plain HTTP with `reqwest`. Every call is single-shot: failures
//! surface as [`GenerationError`] and are never retried here.

use crate::config::{CompletionProvider, Config, ConfigError};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;

mod chat;
mod ollama;

pub use chat::ChatCompletionClient;
pub use ollama::OllamaCompletionClient;

/// Prompt used for every question. `{context}` and `{question}` are filled by [`fill_prompt`].
pub const RAG_PROMPT_TEMPLATE: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.\n\
Question: {question}\n\
Context: {context}\n\
Answer:";

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider was unreachable, timed out, or rejected the request (quota, auth, 5xx).
    #[error("Completion backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Provider answered with a payload that could not be interpreted.
    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),
}

/// Interface implemented by completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete the prompt at the given sampling temperature and return the raw text.
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError>;
}

/// Substitute `{context}` and `{question}` into [`RAG_PROMPT_TEMPLATE`].
///
/// Substitution is single-pass, so braces inside the inserted values are left untouched.
pub fn fill_prompt(context: &str, question: &str) -> String {
    fill_template(
        RAG_PROMPT_TEMPLATE,
        &[("context", context), ("question", question)],
    )
}

fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });
        match replacement {
            Some((value, close)) => {
                output.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}

/// Build the completion client selected by configuration.
pub fn build_completion_client(
    config: &Config,
    http: Client,
) -> Result<Arc<dyn CompletionClient>, ConfigError> {
    let client: Arc<dyn CompletionClient> = match config.completion_provider {
        CompletionProvider::Azure => {
            let azure = config
                .azure_openai
                .as_ref()
                .ok_or_else(|| ConfigError::MissingVariable("AZURE_OPENAI_ENDPOINT".into()))?;
            Arc::new(ChatCompletionClient::azure(
                http,
                azure,
                &config.completion_model,
            ))
        }
        CompletionProvider::OpenAI => {
            let openai = config
                .openai
                .as_ref()
                .ok_or_else(|| ConfigError::MissingVariable("OPENAI_API_KEY".into()))?;
            Arc::new(ChatCompletionClient::openai(
                http,
                openai,
                &config.completion_model,
            ))
        }
        CompletionProvider::Ollama => Arc::new(OllamaCompletionClient::new(
            http,
            config.ollama_url.clone(),
            config.completion_model.clone(),
        )),
    };
    tracing::info!(
        provider = ?config.completion_provider,
        model = %config.completion_model,
        "Completion client initialized"
    );
    Ok(client)
}
