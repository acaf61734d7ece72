//! HTTP surface for docrag.
//!
//! - `POST /indexdocument`: raw document bytes in the body, filename in `Content-Disposition`.
//!   Returns the new index identifier as plain text.
//! - `GET /chatwithdocument?question=..&index_name=..`: answer a question against an index.
//! - `GET /health`: liveness probe.
//! - `GET /metrics`: ingestion and query counters.
//!
//! Handlers await the whole pipeline before responding.

use crate::metrics::MetricsSnapshot;
use crate::parsing::ParseError;
use crate::processing::{Document, IngestionError, QueryError, RagApi, RetrievalError};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Build the HTTP router exposing ingestion and query endpoints.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/indexdocument", post(index_document::<S>))
        .route("/chatwithdocument", get(chat_with_document::<S>))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

/// Index an uploaded document and return its identifier.
async fn index_document<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<String, AppError>
where
    S: RagApi,
{
    let filename = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_disposition)
        .ok_or_else(|| {
            AppError::BadRequest("Content-Disposition header with a filename is required".into())
        })?;

    let index_name = service
        .ingest(Document::new(filename.clone(), body.to_vec()))
        .await?;
    tracing::info!(filename = %filename, index = %index_name, "Index request completed");
    Ok(index_name)
}

/// Query parameters for `GET /chatwithdocument`.
#[derive(Deserialize)]
struct ChatParams {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    index_name: Option<String>,
}

/// Answer a question against a previously indexed document.
async fn chat_with_document<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<ChatParams>,
) -> Result<String, AppError>
where
    S: RagApi,
{
    let question = required(params.question, "question")?;
    let index_name = required(params.index_name, "index_name")?;

    let answer = service.answer(&index_name, &question).await?;
    tracing::info!(index = %index_name, "Chat request completed");
    Ok(answer)
}

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("query parameter '{name}' is required")))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Return the ingestion and query counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
}

/// Extract the filename from a `Content-Disposition` value.
///
/// `filename*=` (RFC 5987) wins over `filename=`; quotes and any directory part are stripped.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = raw.trim().trim_matches('"');
                let encoded = encoded
                    .split_once("''")
                    .map(|(_, rest)| rest)
                    .unwrap_or(encoded);
                extended = percent_decode_str(encoded)
                    .decode_utf8()
                    .ok()
                    .map(|decoded| decoded.into_owned());
            }
            "filename" => plain = Some(raw.trim().trim_matches('"').to_string()),
            _ => {}
        }
    }

    extended
        .or(plain)
        .map(|name| {
            name.rsplit(['/', '\\'])
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        })
        .filter(|name| !name.is_empty())
}

/// Error wrapper translating pipeline failures into HTTP responses.
enum AppError {
    BadRequest(String),
    Ingestion(IngestionError),
    Query(QueryError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Ingestion(error) => match error {
                IngestionError::EmptyDocument | IngestionError::NoChunksProduced => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                IngestionError::Parse(
                    ParseError::Unsupported(_) | ParseError::AnalysisFailed(_),
                ) => StatusCode::UNPROCESSABLE_ENTITY,
                IngestionError::Parse(
                    ParseError::ServiceUnavailable(_) | ParseError::InvalidResponse(_),
                )
                | IngestionError::Embedding(_)
                | IngestionError::StorageFailure(_) => StatusCode::BAD_GATEWAY,
                IngestionError::Upload(_)
                | IngestionError::Parse(ParseError::Io(_))
                | IngestionError::Chunking(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Query(error) => match error {
                QueryError::EmptyQuestion => StatusCode::BAD_REQUEST,
                QueryError::Retrieval(RetrievalError::IndexNotFound(_)) => StatusCode::NOT_FOUND,
                QueryError::Retrieval(_) | QueryError::Generation(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(message) => message.clone(),
            Self::Ingestion(error) => error.to_string(),
            Self::Query(error) => error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "Request failed");
        } else {
            tracing::warn!(%status, error = %message, "Request rejected");
        }
        (status, message).into_response()
    }
}

impl From<IngestionError> for AppError {
    fn from(inner: IngestionError) -> Self {
        Self::Ingestion(inner)
    }
}

impl From<QueryError> for AppError {
    fn from(inner: QueryError) -> Self {
        Self::Query(inner)
    }
}
