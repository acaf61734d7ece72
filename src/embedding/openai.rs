//! Azure OpenAI and OpenAI embedding endpoints.

use super::{EmbeddingClient, EmbeddingClientError};
use crate::config::{AzureOpenAiSettings, OpenAiSettings};
use crate::openai_compat::{ApiAuth, azure_deployment_url, join_url};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

/// Client for the OpenAI-style `/embeddings` operation.
///
/// Azure deployments encode the model in the URL; OpenAI expects it in the request body.
pub struct OpenAiEmbeddingClient {
    http: Client,
    url: String,
    auth: ApiAuth,
    model: Option<String>,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl OpenAiEmbeddingClient {
    /// Target an Azure OpenAI embedding deployment.
    pub fn azure(
        http: Client,
        settings: &AzureOpenAiSettings,
        deployment: &str,
        dimension: usize,
    ) -> Self {
        Self {
            http,
            url: azure_deployment_url(
                &settings.endpoint,
                deployment,
                "embeddings",
                &settings.embedding_api_version,
            ),
            auth: ApiAuth::ApiKey(settings.api_key.clone()),
            model: None,
            dimension,
        }
    }

    /// Target the OpenAI embeddings API.
    pub fn openai(http: Client, settings: &OpenAiSettings, model: &str, dimension: usize) -> Self {
        Self {
            http,
            url: join_url(&settings.base_url, "embeddings"),
            auth: ApiAuth::Bearer(settings.api_key.clone()),
            model: Some(model.to_string()),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let mut body = json!({ "input": texts });
        if let (Some(model), Value::Object(map)) = (&self.model, &mut body) {
            map.insert("model".into(), Value::String(model.clone()));
        }

        tracing::debug!(inputs = expected, "Requesting embeddings");
        let response = self
            .auth
            .apply(self.http.post(&self.url))
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach embedding endpoint: {error}"
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Embedding request failed");
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "embedding endpoint returned {status}: {body}"
            )));
        }

        let payload: EmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode embedding response: {error}"
            ))
        })?;

        if payload.data.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected} embeddings, received {}",
                payload.data.len()
            )));
        }

        let mut data = payload.data;
        data.sort_by_key(|datum| datum.index.unwrap_or(usize::MAX));
        Ok(data.into_iter().map(|datum| datum.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
