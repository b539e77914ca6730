//! Grounded generation against Vertex AI.
//!
//! Provides:
//! - Request building from configuration and conversation history
//! - Two interchangeable transports (typed and raw JSON)
//! - Reply normalization into an answer and citations

pub mod auth;
pub mod error;
pub mod extract;
pub mod request;
pub mod response;
pub mod transport;

pub use auth::{AmbientCredentials, StaticToken, TokenSource};
pub use error::UpstreamError;
pub use extract::GroundedAnswer;
pub use request::RagRequest;
pub use transport::{InferenceTransport, RestTransport, TypedTransport, VertexEndpoint};

use std::sync::Arc;
use std::time::Duration;

use crate::config::{RetrievalConfig, TransportKind};
use crate::conversation::Message;

/// A configured retrieval source bound to a transport.
pub struct RagBackend {
    /// Resolved retrieval settings.
    pub retrieval: RetrievalConfig,
    /// Transport chosen at startup.
    pub transport: Arc<dyn InferenceTransport>,
}

impl RagBackend {
    /// Bind `retrieval` to a new transport of the given kind.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn connect(
        retrieval: RetrievalConfig,
        kind: TransportKind,
        timeout: Duration,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, UpstreamError> {
        let endpoint = VertexEndpoint::new(retrieval.generate_content_url(), timeout, tokens)?;
        let url = endpoint.url().to_string();
        let transport = transport::for_kind(kind, endpoint);
        tracing::info!("Vertex AI endpoint: {url} ({:?} transport)", transport.kind());
        Ok(Self { retrieval, transport })
    }

    /// Ask `question` with the last `window` messages of `history` as context.
    ///
    /// # Errors
    /// Returns an error if the remote call fails.
    pub async fn ask(
        &self,
        question: &str,
        history: &[Message],
        window: usize,
    ) -> Result<GroundedAnswer, UpstreamError> {
        let request = RagRequest::build(&self.retrieval, question, history, window);
        tracing::debug!(
            "Sending question via {} ({} history messages)",
            self.retrieval.source.kind(),
            history.len().min(window)
        );
        self.transport.generate(&request).await
    }
}
