//! Conversion of uploaded files into normalized markdown text.
//!
//! Parsers return one [`ParsedPage`] per logical page. Headings are expected as markdown
//! markers (`#`, `##`, `###`) so the header splitter can recover document structure.

use crate::config::{Config, ConfigError, ParserBackend};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

mod azure;

pub use azure::AzureDocumentIntelligenceParser;

/// Text extracted from one page of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    /// Page text in markdown form.
    pub page_content: String,
}

impl ParsedPage {
    /// Wrap page text.
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
        }
    }
}

/// Errors raised while turning a file into text.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Staged file could not be read.
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
    /// Parsing service was unreachable or rejected the request.
    #[error("Document parser unavailable: {0}")]
    ServiceUnavailable(String),
    /// Parsing service accepted the document but could not analyze it.
    #[error("Document analysis failed: {0}")]
    AnalysisFailed(String),
    /// Parsing service returned a payload that could not be interpreted.
    #[error("Invalid parser response: {0}")]
    InvalidResponse(String),
    /// File format is not handled by the configured parser.
    #[error("Unsupported document format: {0}")]
    Unsupported(String),
}

/// Interface implemented by document parsers.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse the file at `path` into pages of markdown text.
    async fn parse(&self, path: &Path) -> Result<Vec<ParsedPage>, ParseError>;
}

/// Reads plain text and markdown from disk, and PDFs when built with the `pdf` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalParser;

impl LocalParser {
    /// Construct a local parser.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentParser for LocalParser {
    async fn parse(&self, path: &Path) -> Result<Vec<ParsedPage>, ParseError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("pdf") => parse_pdf(path).await,
            Some("md" | "markdown" | "txt" | "text") | None => {
                let bytes = tokio::fs::read(path).await?;
                Ok(vec![ParsedPage::new(String::from_utf8_lossy(&bytes))])
            }
            Some(other) => {
                let bytes = tokio::fs::read(path).await?;
                String::from_utf8(bytes)
                    .map(|text| vec![ParsedPage::new(text)])
                    .map_err(|_| ParseError::Unsupported(format!(".{other} is not a text file")))
            }
        }
    }
}

#[cfg(feature = "pdf")]
async fn parse_pdf(path: &Path) -> Result<Vec<ParsedPage>, ParseError> {
    let path = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text(&path).map_err(|e| ParseError::AnalysisFailed(e.to_string()))
    })
    .await
    .map_err(|e| ParseError::Io(std::io::Error::other(e)))??;
    Ok(vec![ParsedPage::new(text)])
}

#[cfg(not(feature = "pdf"))]
async fn parse_pdf(_path: &Path) -> Result<Vec<ParsedPage>, ParseError> {
    Err(ParseError::Unsupported(
        "PDF support requires the `pdf` feature".into(),
    ))
}

/// Build the document parser selected by configuration.
pub fn build_document_parser(
    config: &Config,
    http: Client,
) -> Result<Arc<dyn DocumentParser>, ConfigError> {
    let parser: Arc<dyn DocumentParser> = match config.document_parser {
        ParserBackend::Azure => {
            let settings = config.document_intelligence.as_ref().ok_or_else(|| {
                ConfigError::MissingVariable("AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT".into())
            })?;
            Arc::new(AzureDocumentIntelligenceParser::new(http, settings))
        }
        ParserBackend::Local => Arc::new(LocalParser::new()),
    };
    tracing::info!(backend = ?config.document_parser, "Document parser initialized");
    Ok(parser)
}
