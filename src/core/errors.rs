use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Failures raised by the retrieval-augmented generation pipeline.
#[derive(Debug, Clone, Error)]
pub enum RagError {
    #[error("document has no extractable text: {0}")]
    DocumentEmpty(String),
    #[error("failed to load document: {0}")]
    DocumentLoad(String),
    #[error("embedding service error: {0}")]
    EmbeddingService(String),
    #[error("failed to build index: {0}")]
    IndexBuild(String),
    #[error("no index found at {0}")]
    IndexNotFound(String),
    #[error("index contains no entries")]
    IndexEmpty,
    #[error("index storage error: {0}")]
    IndexStorage(String),
    #[error("embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("generation service error: {0}")]
    GenerationService(String),
    #[error("system not ready: {0}")]
    NotReady(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RagError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RagError::IndexStorage(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::NotReady(_) => ApiError::ServiceUnavailable(err.to_string()),
            RagError::InvalidQuery(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
