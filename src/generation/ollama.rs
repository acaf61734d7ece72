//! Text generation through a local Ollama runtime (`POST /api/generate`).

use super::{CompletionClient, GenerationError};
use crate::openai_compat::join_url;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Completion client for a local Ollama runtime (`POST /api/generate`, non-streaming).
pub struct OllamaCompletionClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

impl OllamaCompletionClient {
    /// Construct a client for the given runtime URL and model.
    pub fn new(http: Client, base_url: String, model: String) -> Self {
        Self {
            http,
            base_url,
            model,
        }
    }

    fn endpoint(&self) -> String {
        join_url(&self.base_url, "api/generate")
    }
}

#[async_trait]
impl CompletionClient for OllamaCompletionClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": temperature },
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::BackendUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::BackendUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::BackendUnavailable(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::MalformedResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::MalformedResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let client = OllamaCompletionClient::new(Client::new(), server.base_url(), "llama3".into());

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{ "stream": false, "options": { "temperature": 0.0 } }"#);
                then.status(200).json_body(json!({
                    "response": "Answer text",
                    "done": true
                }));
            })
            .await;

        let answer = client.complete("prompt", 0.0).await.expect("answer");

        mock.assert();
        assert_eq!(answer, "Answer text");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = OllamaCompletionClient::new(Client::new(), server.base_url(), "llama3".into());

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client.complete("prompt", 0.0).await.expect_err("error response");
        assert!(
            matches!(error, GenerationError::BackendUnavailable(ref message) if message.contains("500"))
        );
    }

    #[tokio::test]
    async fn incomplete_response_is_malformed() {
        let server = MockServer::start_async().await;
        let client = OllamaCompletionClient::new(Client::new(), server.base_url(), "llama3".into());

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({ "response": "partial", "done": false }));
            })
            .await;

        let error = client.complete("prompt", 0.0).await.expect_err("incomplete");
        assert!(matches!(error, GenerationError::MalformedResponse(_)));
    }
}
