//! Azure AI Document Intelligence adapter (markdown output).
//!
//! Analysis is asynchronous on the service side: the document is submitted once, then the
//! returned `Operation-Location` is polled until the run settles.

use super::{DocumentParser, ParseError, ParsedPage};
use crate::config::DocumentIntelligenceSettings;
use crate::openai_compat::join_url;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const API_VERSION: &str = "2024-11-30";
const API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const DEFAULT_MAX_POLLS: u32 = 300;

/// Parser backed by a Document Intelligence layout model.
pub struct AzureDocumentIntelligenceParser {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl AzureDocumentIntelligenceParser {
    /// Construct a parser from configuration.
    pub fn new(http: Client, settings: &DocumentIntelligenceSettings) -> Self {
        Self {
            http,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            poll_interval: settings.poll_interval,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Override how many status polls are attempted before giving up.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls.max(1);
        self
    }

    fn analyze_url(&self) -> String {
        let path = format!(
            "documentintelligence/documentModels/{}:analyze?api-version={API_VERSION}&outputContentFormat=markdown",
            self.model
        );
        join_url(&self.endpoint, &path)
    }

    async fn submit(&self, bytes: Vec<u8>) -> Result<String, ParseError> {
        let response = self
            .http
            .post(self.analyze_url())
            .header(API_KEY_HEADER, &self.api_key)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|error| {
                ParseError::ServiceUnavailable(format!("failed to submit document: {error}"))
            })?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Document analysis request rejected");
            return Err(ParseError::ServiceUnavailable(format!(
                "analyze request returned {status}: {body}"
            )));
        }

        response
            .headers()
            .get("operation-location")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ParseError::InvalidResponse("analyze response missing Operation-Location".into())
            })
    }

    async fn poll(&self, operation_url: &str) -> Result<String, ParseError> {
        for attempt in 1..=self.max_polls {
            let response = self
                .http
                .get(operation_url)
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .await
                .map_err(|error| {
                    ParseError::ServiceUnavailable(format!("failed to poll analysis: {error}"))
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ParseError::ServiceUnavailable(format!(
                    "analysis status returned {status}: {body}"
                )));
            }

            let operation: AnalyzeOperation = response.json().await.map_err(|error| {
                ParseError::InvalidResponse(format!("failed to decode analysis status: {error}"))
            })?;

            match operation.status.as_str() {
                "succeeded" => {
                    return operation
                        .analyze_result
                        .map(|result| result.content)
                        .ok_or_else(|| {
                            ParseError::InvalidResponse("succeeded without analyzeResult".into())
                        });
                }
                "failed" | "canceled" => {
                    let detail = operation
                        .error
                        .map(|error| format!("{}: {}", error.code, error.message))
                        .unwrap_or_else(|| operation.status.clone());
                    return Err(ParseError::AnalysisFailed(detail));
                }
                other => {
                    tracing::debug!(attempt, status = other, "Document analysis pending");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(ParseError::AnalysisFailed(format!(
            "analysis did not finish after {} polls",
            self.max_polls
        )))
    }
}

#[async_trait]
impl DocumentParser for AzureDocumentIntelligenceParser {
    async fn parse(&self, path: &Path) -> Result<Vec<ParsedPage>, ParseError> {
        let bytes = tokio::fs::read(path).await?;
        tracing::debug!(bytes = bytes.len(), model = %self.model, "Submitting document for analysis");

        let operation_url = self.submit(bytes).await?;
        let content = self.poll(&operation_url).await?;

        // Markdown output arrives as a single document-wide string.
        Ok(vec![ParsedPage::new(content)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };
    use serde_json::json;
    use std::io::Write;
    use tempfile::Builder;

    const RESULT_PATH: &str = "/documentintelligence/documentModels/prebuilt-layout/analyzeResults/op-1";

    fn parser(server: &MockServer) -> AzureDocumentIntelligenceParser {
        let settings = DocumentIntelligenceSettings {
            endpoint: server.base_url(),
            api_key: "di-key".into(),
            model: "prebuilt-layout".into(),
            poll_interval: Duration::from_millis(1),
        };
        AzureDocumentIntelligenceParser::new(Client::new(), &settings)
    }

    fn staged_pdf() -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".pdf").tempfile().expect("temp file");
        file.write_all(b"%PDF-1.4 fake").expect("write");
        file
    }

    #[tokio::test]
    async fn analyze_then_poll_returns_markdown() {
        let server = MockServer::start_async().await;
        let submit = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/documentintelligence/documentModels/prebuilt-layout:analyze")
                    .query_param("api-version", API_VERSION)
                    .query_param("outputContentFormat", "markdown")
                    .header(API_KEY_HEADER, "di-key")
                    .body("%PDF-1.4 fake");
                then.status(202)
                    .header("Operation-Location", server.url(RESULT_PATH));
            })
            .await;
        let status = server
            .mock_async(|when, then| {
                when.method(GET).path(RESULT_PATH).header(API_KEY_HEADER, "di-key");
                then.status(200).json_body(json!({
                    "status": "succeeded",
                    "analyzeResult": { "content": "# Intro\nHello world." }
                }));
            })
            .await;

        let file = staged_pdf();
        let pages = parser(&server).parse(file.path()).await.expect("parse");

        submit.assert();
        status.assert();
        assert_eq!(pages, vec![ParsedPage::new("# Intro\nHello world.")]);
    }

    #[tokio::test]
    async fn failed_analysis_reports_service_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(202)
                    .header("Operation-Location", server.url(RESULT_PATH));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(RESULT_PATH);
                then.status(200).json_body(json!({
                    "status": "failed",
                    "error": { "code": "InvalidContent", "message": "corrupted file" }
                }));
            })
            .await;

        let file = staged_pdf();
        let error = parser(&server).parse(file.path()).await.expect_err("failed");
        assert!(
            matches!(error, ParseError::AnalysisFailed(ref message) if message.contains("InvalidContent"))
        );
    }

    #[tokio::test]
    async fn polling_stops_after_limit() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(202)
                    .header("Operation-Location", server.url(RESULT_PATH));
            })
            .await;
        let status = server
            .mock_async(|when, then| {
                when.method(GET).path(RESULT_PATH);
                then.status(200).json_body(json!({ "status": "running" }));
            })
            .await;

        let file = staged_pdf();
        let error = parser(&server)
            .with_max_polls(3)
            .parse(file.path())
            .await
            .expect_err("timeout");

        assert_eq!(status.hits(), 3);
        assert!(matches!(error, ParseError::AnalysisFailed(_)));
    }

    #[tokio::test]
    async fn rejected_submission_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(401).body("access denied");
            })
            .await;

        let file = staged_pdf();
        let error = parser(&server).parse(file.path()).await.expect_err("401");
        assert!(matches!(error, ParseError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn missing_operation_location_is_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(202);
            })
            .await;

        let file = staged_pdf();
        let error = parser(&server).parse(file.path()).await.expect_err("no header");
        assert!(matches!(error, ParseError::InvalidResponse(_)));
    }
}
