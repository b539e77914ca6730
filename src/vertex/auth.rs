//! Bearer tokens for the Vertex AI API.

use async_trait::async_trait;
use tokio::sync::Mutex;
use yup_oauth2::authenticator::ApplicationDefaultCredentialsTypes;
use yup_oauth2::{
    AccessToken, ApplicationDefaultCredentialsAuthenticator, ApplicationDefaultCredentialsFlowOpts,
};

use super::error::UpstreamError;

/// OAuth scope required by `generateContent`.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Source of bearer tokens for outbound calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a currently valid access token.
    async fn access_token(&self) -> Result<String, UpstreamError>;
}

/// A fixed token, e.g. from `gcloud auth print-access-token`.
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, UpstreamError> {
        Ok(self.0.clone())
    }
}

/// Application default credentials: the service account key named by
/// `GOOGLE_APPLICATION_CREDENTIALS`, or the instance metadata server.
///
/// The last token is reused until it expires. Refreshes are serialized and carry no
/// deadline of their own; [`VertexEndpoint`](super::VertexEndpoint) bounds them.
#[derive(Default)]
pub struct AmbientCredentials {
    cached: Mutex<Option<AccessToken>>,
}

impl AmbientCredentials {
    async fn fetch() -> Result<AccessToken, UpstreamError> {
        let opts = ApplicationDefaultCredentialsFlowOpts::default();
        let auth = match ApplicationDefaultCredentialsAuthenticator::builder(opts).await {
            ApplicationDefaultCredentialsTypes::InstanceMetadata(builder) => builder.build().await,
            ApplicationDefaultCredentialsTypes::ServiceAccount(builder) => builder.build().await,
        }
        .map_err(|e| UpstreamError::Credentials(e.to_string()))?;

        auth.token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| UpstreamError::Credentials(e.to_string()))
    }
}

#[async_trait]
impl TokenSource for AmbientCredentials {
    async fn access_token(&self) -> Result<String, UpstreamError> {
        let mut cached = self.cached.lock().await;
        let valid = cached.as_ref().filter(|t| !t.is_expired());
        if let Some(token) = valid.and_then(AccessToken::token) {
            return Ok(token.to_string());
        }

        let fresh = Self::fetch().await?;
        let token = fresh
            .token()
            .map(str::to_string)
            .ok_or_else(|| UpstreamError::Credentials("OAuth token was None".to_string()))?;
        tracing::debug!("Refreshed Vertex AI access token");
        *cached = Some(fresh);
        Ok(token)
    }
}
