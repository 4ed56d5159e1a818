//! Error types for the file-share service

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use expiring_file_cache::CacheError;
use serde_json::json;
use std::fmt;

/// Errors that abort startup
#[derive(Debug)]
pub enum FileShareError {
    Cache(CacheError),
    ObjectStore(object_store_client::ObjectStoreError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for FileShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileShareError::Cache(err) => write!(f, "Cache error: {}", err),
            FileShareError::ObjectStore(err) => write!(f, "Object store error: {}", err),
            FileShareError::Io(err) => write!(f, "IO error: {}", err),
            FileShareError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for FileShareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileShareError::Cache(err) => Some(err),
            FileShareError::ObjectStore(err) => Some(err),
            FileShareError::Io(err) => Some(err.as_ref()),
            FileShareError::Config(_) => None,
        }
    }
}

impl From<CacheError> for FileShareError {
    fn from(err: CacheError) -> Self {
        FileShareError::Cache(err)
    }
}

impl From<object_store_client::ObjectStoreError> for FileShareError {
    fn from(err: object_store_client::ObjectStoreError) -> Self {
        FileShareError::ObjectStore(err)
    }
}

impl From<std::io::Error> for FileShareError {
    fn from(err: std::io::Error) -> Self {
        FileShareError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for FileShareError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        FileShareError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FileShareError>;

/// Handler error that converts to an HTTP response.
///
/// Internal details are logged and never sent to the client.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound,
    Unavailable,
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            AppError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service shutting down".to_string(),
            ),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidKey { reason, .. } => AppError::BadRequest(reason),
            CacheError::NotFound(_) => AppError::NotFound,
            CacheError::Closed => AppError::Unavailable,
            other => AppError::Internal(other.to_string()),
        }
    }
}
