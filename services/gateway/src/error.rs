use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Progress ID '{0}' not found")]
    ProgressNotFound(String),

    #[error("Index '{0}' already exists")]
    IndexExists(String),

    #[error("Index '{0}' is already being built")]
    BuildInProgress(String),

    #[error("Index build '{0}' is not running")]
    BuildNotRunning(String),

    #[error("Invalid index name: {0}")]
    InvalidIndexName(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    UnsupportedInput(String),

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Index creation failed: {0}")]
    BuildFailed(String),

    #[error("Index creation timed out after {0}s")]
    BuildTimeout(u64),

    #[error("Index creation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(error: tokio::task::JoinError) -> Self {
        GatewayError::Internal(error.to_string())
    }
}

impl GatewayError {
    /// Stable machine-readable code carried in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::ProgressNotFound(_) => "PROGRESS_NOT_FOUND",
            GatewayError::IndexExists(_) => "INDEX_EXISTS",
            GatewayError::BuildInProgress(_) => "BUILD_IN_PROGRESS",
            GatewayError::BuildNotRunning(_) => "BUILD_NOT_RUNNING",
            GatewayError::InvalidIndexName(_) => "INVALID_INDEX_NAME",
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
            GatewayError::UnsupportedInput(_) => "UNSUPPORTED_INPUT",
            GatewayError::SearchFailed(_) => "SEARCH_FAILED",
            GatewayError::Engine(_) => "ENGINE_ERROR",
            GatewayError::BuildFailed(_) => "BUILD_FAILED",
            GatewayError::BuildTimeout(_) => "BUILD_TIMEOUT",
            GatewayError::Cancelled => "BUILD_CANCELLED",
            GatewayError::Config(_) => "CONFIG_ERROR",
            GatewayError::Io(_) => "IO_ERROR",
            GatewayError::Json(_) => "SERIALIZATION_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::ProgressNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::IndexExists(_)
            | GatewayError::BuildInProgress(_)
            | GatewayError::BuildNotRunning(_) => StatusCode::CONFLICT,
            GatewayError::InvalidIndexName(_)
            | GatewayError::InvalidRequest(_)
            | GatewayError::UnsupportedInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::BuildTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Engine(_) | GatewayError::BuildFailed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    detail: String,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        } else {
            tracing::debug!(code = self.code(), "{}", self);
        }

        let message = self.to_string();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: message.clone(),
            },
            detail: message,
        };
        (status, Json(body)).into_response()
    }
}
