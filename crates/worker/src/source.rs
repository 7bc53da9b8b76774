//! Fetching the operation batch over HTTP or from a local file.

use std::path::PathBuf;
use std::time::Duration;

use opsync_core::error::CoreError;
use opsync_core::operation::extract_operations;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The source returned a non-2xx status code.
    #[error("Source returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Failed to read source file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Document(#[from] CoreError),
}

// ---------------------------------------------------------------------------
// OperationSource
// ---------------------------------------------------------------------------

/// Where `{"data": [operation, ...]}` is read from: an HTTP endpoint, or a
/// local file given as a `file://` URL or a plain path.
pub struct OperationSource {
    client: reqwest::Client,
    url: String,
}

impl OperationSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the document and return its raw operation elements.
    pub async fn fetch(&self) -> Result<Vec<Value>, SourceError> {
        let body = match local_path(&self.url) {
            Some(path) => tokio::fs::read(&path).await?,
            None => self.get().await?,
        };
        let operations = parse_document(&body)?;
        tracing::debug!(url = %self.url, count = operations.len(), "Fetched operations");
        Ok(operations)
    }

    async fn get(&self) -> Result<Vec<u8>, SourceError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus(status.as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// The file path `url` names, or `None` for a network URL.
fn local_path(url: &str) -> Option<PathBuf> {
    match url.strip_prefix("file://") {
        Some(path) => Some(PathBuf::from(path)),
        None if url.contains("://") => None,
        None => Some(PathBuf::from(url)),
    }
}

/// Decode a response body into its operation elements.
pub fn parse_document(body: &[u8]) -> Result<Vec<Value>, SourceError> {
    let document: Value = serde_json::from_slice(body)?;
    Ok(extract_operations(document)?)
}
