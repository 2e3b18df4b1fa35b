use axum::http::StatusCode;
use thiserror::Error;

/// Failures the pipeline distinguishes between.
///
/// Only [`RagError::Validation`] is meant to reach a client; everything else is
/// logged and converted into a safe default by the service.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("no usable content extracted from {url}")]
    Extraction { url: String },
    #[error("embedding provider failed: {0}")]
    Embedding(String),
    #[error("vector store write failed: {0}")]
    StoreWrite(String),
    #[error("vector store read failed: {0}")]
    StoreRead(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("{0}")]
    Validation(String),
}

impl RagError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RagError::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RagError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RagError> for (StatusCode, String) {
    fn from(err: RagError) -> Self {
        (err.status_code(), err.to_string())
    }
}
