//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::config::{ConfigError, RelayConfig};
use crate::conversation::ConversationStore;
use crate::vertex::{AmbientCredentials, RagBackend, StaticToken, TokenSource, UpstreamError};

/// Shared application state.
pub struct AppState {
    /// Conversation log.
    pub conversations: ConversationStore,
    /// Bound retrieval backend, or why none could be configured.
    pub backend: Result<RagBackend, ConfigError>,
    /// Prior messages replayed into each prompt.
    pub history_window: usize,
    /// Project id as configured, echoed by the health check.
    pub project_id: Option<String>,
}

impl AppState {
    /// Create the application state from the relay configuration.
    ///
    /// A missing retrieval configuration is kept and reported on first ask.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &RelayConfig) -> Result<Arc<Self>, UpstreamError> {
        let tokens: Arc<dyn TokenSource> = match &config.access_token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(AmbientCredentials::default()),
        };

        let backend = match &config.retrieval {
            Ok(retrieval) => Ok(RagBackend::connect(
                retrieval.clone(),
                config.transport,
                config.request_timeout,
                tokens,
            )?),
            Err(e) => Err(e.clone()),
        };

        Ok(Arc::new(Self {
            conversations: ConversationStore::new(config.store.clone()),
            backend,
            history_window: config.history_window,
            project_id: config.project_id.clone(),
        }))
    }
}
