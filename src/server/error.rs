//! Handler errors and their JSON rendering.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::config::ConfigError;
use crate::conversation::StoreError;
use crate::vertex::UpstreamError;

/// Errors returned by the API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The question is missing or blank.
    #[error("Please provide a question")]
    MissingQuestion,

    /// The body is not the expected JSON.
    #[error("Invalid request body: {0}")]
    MalformedBody(String),

    /// Retrieval is not configured.
    #[error("Server is not configured: {0}")]
    Configuration(#[from] ConfigError),

    /// The model call failed.
    #[error("Model request failed: {0}")]
    Upstream(#[from] UpstreamError),

    /// Unknown conversation id.
    #[error("Conversation not found")]
    ConversationNotFound,
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingQuestion | Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(e) if e.is_local() => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::ConversationNotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::ConversationNotFound,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{self}");
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
