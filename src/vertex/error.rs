//! Error types for calls to Vertex AI.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while calling the remote model.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The service answered with a non-success status.
    #[error("upstream returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body as returned.
        body: String,
    },

    /// The request could not be sent or timed out.
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The whole exchange, token included, did not finish in time.
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body was not the expected JSON.
    #[error("upstream response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    /// No bearer token could be obtained.
    #[error("could not obtain access token: {0}")]
    Credentials(String),
}

impl UpstreamError {
    /// Whether the call was abandoned because it exceeded the request timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Transport(err) => err.is_timeout(),
            _ => false,
        }
    }

    /// Whether the failure happened locally before anything was sent.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Credentials(_))
    }
}
