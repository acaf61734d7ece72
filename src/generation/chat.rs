//! Chat completions against Azure OpenAI deployments or the OpenAI API.

use super::{CompletionClient, GenerationError};
use crate::config::{AzureOpenAiSettings, OpenAiSettings};
use crate::openai_compat::{ApiAuth, azure_deployment_url, join_url};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

/// Client for the OpenAI-style `/chat/completions` operation.
///
/// The filled prompt is sent as a single user message.
pub struct ChatCompletionClient {
    http: Client,
    url: String,
    auth: ApiAuth,
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionClient {
    /// Target an Azure OpenAI chat deployment.
    pub fn azure(http: Client, settings: &AzureOpenAiSettings, deployment: &str) -> Self {
        Self {
            http,
            url: azure_deployment_url(
                &settings.endpoint,
                deployment,
                "chat/completions",
                &settings.chat_api_version,
            ),
            auth: ApiAuth::ApiKey(settings.api_key.clone()),
            model: None,
        }
    }

    /// Target the OpenAI chat completions API.
    pub fn openai(http: Client, settings: &OpenAiSettings, model: &str) -> Self {
        Self {
            http,
            url: join_url(&settings.base_url, "chat/completions"),
            auth: ApiAuth::Bearer(settings.api_key.clone()),
            model: Some(model.to_string()),
        }
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
        let mut body = json!({
            "messages": [ { "role": "user", "content": prompt } ],
            "temperature": temperature,
        });
        if let (Some(model), Value::Object(map)) = (&self.model, &mut body) {
            map.insert("model".into(), Value::String(model.clone()));
        }

        let response = self
            .auth
            .apply(self.http.post(&self.url))
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                GenerationError::BackendUnavailable(format!(
                    "failed to reach completion endpoint: {error}"
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Chat completion failed");
            return Err(GenerationError::BackendUnavailable(format!(
                "completion endpoint returned {status}: {body}"
            )));
        }

        let payload: ChatResponse = response.json().await.map_err(|error| {
            GenerationError::MalformedResponse(format!(
                "failed to decode completion response: {error}"
            ))
        })?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationError::MalformedResponse("response contained no message content".into())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn azure_settings(endpoint: String) -> AzureOpenAiSettings {
        AzureOpenAiSettings {
            endpoint,
            api_key: "secret".into(),
            embedding_api_version: "2023-05-15".into(),
            chat_api_version: "2024-02-01".into(),
        }
    }

    #[tokio::test]
    async fn azure_completion_returns_message_verbatim() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/deployments/gpt-35-turbo/chat/completions")
                    .query_param("api-version", "2024-02-01")
                    .header("api-key", "secret")
                    .json_body_partial(r#"{ "temperature": 0.0 }"#);
                then.status(200).json_body(json!({
                    "choices": [
                        { "index": 0, "message": { "role": "assistant", "content": "  X is a letter.  " } }
                    ]
                }));
            })
            .await;

        let client =
            ChatCompletionClient::azure(Client::new(), &azure_settings(server.base_url()), "gpt-35-turbo");
        let answer = client.complete("prompt", 0.0).await.expect("answer");

        mock.assert();
        assert_eq!(answer, "  X is a letter.  ");
    }

    #[tokio::test]
    async fn openai_completion_sends_model() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(r#"{ "model": "gpt-4o-mini" }"#);
                then.status(200).json_body(json!({
                    "choices": [ { "message": { "content": "ok" } } ]
                }));
            })
            .await;

        let settings = OpenAiSettings {
            api_key: "sk-test".into(),
            base_url: server.url("/v1"),
        };
        let client = ChatCompletionClient::openai(Client::new(), &settings, "gpt-4o-mini");
        assert_eq!(client.complete("prompt", 0.0).await.expect("answer"), "ok");
        mock.assert();
    }

    #[tokio::test]
    async fn quota_errors_surface_as_backend_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(429).body("rate limited");
            })
            .await;

        let client =
            ChatCompletionClient::azure(Client::new(), &azure_settings(server.base_url()), "gpt");
        let error = client.complete("prompt", 0.0).await.expect_err("429");
        assert!(
            matches!(error, GenerationError::BackendUnavailable(ref message) if message.contains("429"))
        );
    }

    #[tokio::test]
    async fn empty_choices_are_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let client =
            ChatCompletionClient::azure(Client::new(), &azure_settings(server.base_url()), "gpt");
        let error = client.complete("prompt", 0.0).await.expect_err("malformed");
        assert!(matches!(error, GenerationError::MalformedResponse(_)));
    }
}
