//! Error types for the social login demo

use crate::types::GraphApiError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

#[derive(Debug)]
pub enum GraphError {
    Http(Box<reqwest::Error>),
    /// Error object reported by the API
    Api(GraphApiError),
    /// Non-success status without a parseable error object
    Status(u16),
    Config(String),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Http(err) => write!(f, "HTTP error: {}", err),
            GraphError::Api(err) => write!(f, "{}", err),
            GraphError::Status(status) => write!(f, "Status: {}", status),
            GraphError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GraphError {
    fn from(err: reqwest::Error) -> Self {
        GraphError::Http(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for GraphError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        GraphError::Config(err.to_string())
    }
}

impl From<std::io::Error> for GraphError {
    fn from(err: std::io::Error) -> Self {
        GraphError::Config(format!("server error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// Handler error rendered as a plain-text response
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Forbidden,
    /// Error reported back by the provider during login
    Provider(String),
    Graph(GraphError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            AppError::Provider(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
            AppError::Graph(err) => {
                tracing::error!(error = %err, "Graph API call failed");
                let msg = match err {
                    GraphError::Api(api) => api.to_string(),
                    _ => "Graph API request failed".to_string(),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
        }
    }
}

impl From<GraphError> for AppError {
    fn from(err: GraphError) -> Self {
        AppError::Graph(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error() -> GraphApiError {
        GraphApiError {
            message: "Invalid OAuth access token.".to_string(),
            error_type: "OAuthException".to_string(),
            code: 190,
        }
    }

    #[test]
    fn test_api_error_display() {
        let err = GraphError::Api(api_error());
        assert_eq!(
            format!("{}", err),
            "OAuthException: Invalid OAuth access token. (190)"
        );
    }

    #[test]
    fn test_status_error_display() {
        assert_eq!(format!("{}", GraphError::Status(502)), "Status: 502");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::BadRequest("state mismatch".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Graph(GraphError::Api(api_error()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
