//! Outbound transports to the Vertex AI `generateContent` endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::auth::TokenSource;
use super::error::UpstreamError;
use super::extract::{self, GroundedAnswer};
use super::request::{self, GenerateContentRequest, RagRequest};
use super::response::GenerateContentResponse;
use crate::config::TransportKind;

/// Connection timeout for the HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends a [`RagRequest`] and returns the normalized reply.
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    /// Perform one generation call. No retries.
    async fn generate(&self, request: &RagRequest) -> Result<GroundedAnswer, UpstreamError>;

    /// Which variant this is.
    fn kind(&self) -> TransportKind;
}

/// Authenticated POST target shared by both transports.
pub struct VertexEndpoint {
    http: Client,
    url: String,
    timeout: Duration,
    tokens: Arc<dyn TokenSource>,
}

impl VertexEndpoint {
    /// Build an endpoint whose calls, token refresh included, are bounded by `timeout`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            timeout,
            tokens,
        })
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `body` and return the response text of a successful reply.
    async fn post<B>(&self, body: &B) -> Result<String, UpstreamError>
    where
        B: Serialize + Sync + ?Sized,
    {
        tokio::time::timeout(self.timeout, self.exchange(body))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))?
    }

    async fn exchange<B>(&self, body: &B) -> Result<String, UpstreamError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

/// Typed request and response structures.
pub struct TypedTransport {
    endpoint: VertexEndpoint,
}

impl TypedTransport {
    /// Wrap an endpoint.
    #[must_use]
    pub const fn new(endpoint: VertexEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl InferenceTransport for TypedTransport {
    async fn generate(&self, request: &RagRequest) -> Result<GroundedAnswer, UpstreamError> {
        let payload = GenerateContentRequest::from(request);
        let body = self.endpoint.post(&payload).await?;
        let response: GenerateContentResponse = serde_json::from_str(&body)?;
        Ok(extract::from_typed(&response))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Typed
    }
}

/// Hand-built JSON request, response walked as untyped JSON.
pub struct RestTransport {
    endpoint: VertexEndpoint,
}

impl RestTransport {
    /// Wrap an endpoint.
    #[must_use]
    pub const fn new(endpoint: VertexEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl InferenceTransport for RestTransport {
    async fn generate(&self, request: &RagRequest) -> Result<GroundedAnswer, UpstreamError> {
        let payload = request::to_json(request);
        let body = self.endpoint.post(&payload).await?;
        let response: Value = serde_json::from_str(&body)?;
        Ok(extract::from_json(&response))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Rest
    }
}

/// Build the transport selected by `kind`.
#[must_use]
pub fn for_kind(kind: TransportKind, endpoint: VertexEndpoint) -> Arc<dyn InferenceTransport> {
    match kind {
        TransportKind::Typed => Arc::new(TypedTransport::new(endpoint)),
        TransportKind::Rest => Arc::new(RestTransport::new(endpoint)),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Instant;

    use axum::Router;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use serde_json::json;

    use super::*;
    use crate::config::RetrievalSource;
    use crate::vertex::auth::StaticToken;

    const TOKEN: &str = "ya29.local";

    struct NeverToken;

    #[async_trait]
    impl TokenSource for NeverToken {
        async fn access_token(&self) -> Result<String, UpstreamError> {
            std::future::pending().await
        }
    }

    fn question() -> RagRequest {
        RagRequest {
            prompt: "What is the capital of France?".to_string(),
            source: RetrievalSource::DataStore {
                datastore: "d".to_string(),
            },
            temperature: request::TEMPERATURE,
        }
    }

    fn endpoint(url: &str, timeout: Duration, token: &str) -> VertexEndpoint {
        let tokens: Arc<dyn TokenSource> = Arc::new(StaticToken::new(token));
        let built = VertexEndpoint::new(url, timeout, tokens);
        assert!(built.is_ok(), "client should build");
        built.unwrap()
    }

    fn status_of(result: &Result<GroundedAnswer, UpstreamError>) -> Option<(u16, &str)> {
        match result {
            Err(UpstreamError::Status { status, body }) => Some((*status, body.as_str())),
            _ => None,
        }
    }

    async fn grounded_reply(headers: HeaderMap) -> Response {
        let expected = format!("Bearer {TOKEN}");
        let auth = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
        if auth != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
        }
        axum::Json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Paris." }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://example.com/france" } },
                        { "retrievedContext": { "uri": "gs://docs/capitals.pdf" } }
                    ],
                    "groundingSupports": [{ "groundingChunkIndices": [1, 0, 1] }]
                }
            }]
        }))
        .into_response()
    }

    async fn quota_exceeded() -> Response {
        (StatusCode::TOO_MANY_REQUESTS, "quota exceeded").into_response()
    }

    async fn slow_reply() -> Response {
        tokio::time::sleep(Duration::from_secs(5)).await;
        StatusCode::OK.into_response()
    }

    async fn spawn_upstream() -> SocketAddr {
        let app = Router::new()
            .route("/grounded", post(grounded_reply))
            .route("/quota", post(quota_exceeded))
            .route("/slow", post(slow_reply));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    #[test]
    fn test_for_kind() {
        for kind in [TransportKind::Typed, TransportKind::Rest] {
            let transport = for_kind(
                kind,
                endpoint("http://127.0.0.1:1/v1", Duration::from_secs(1), "t"),
            );
            assert_eq!(transport.kind(), kind);
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let transport = RestTransport::new(endpoint(
            "http://127.0.0.1:1/v1/models/m:generateContent",
            Duration::from_secs(2),
            "t",
        ));

        let result = transport.generate(&question()).await;
        assert!(matches!(result, Err(UpstreamError::Transport(_))));
    }

    #[tokio::test]
    async fn test_typed_and_rest_decode_the_same_answer() {
        let addr = spawn_upstream().await;
        let url = format!("http://{addr}/grounded");
        let typed = TypedTransport::new(endpoint(&url, Duration::from_secs(5), TOKEN));
        let rest = RestTransport::new(endpoint(&url, Duration::from_secs(5), TOKEN));

        let expected = GroundedAnswer {
            answer: "Paris.".to_string(),
            citations: vec![
                "gs://docs/capitals.pdf".to_string(),
                "https://example.com/france".to_string(),
            ],
        };
        assert_eq!(typed.generate(&question()).await.ok(), Some(expected.clone()));
        assert_eq!(rest.generate(&question()).await.ok(), Some(expected));
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent() {
        let addr = spawn_upstream().await;
        let url = format!("http://{addr}/grounded");
        let transport = TypedTransport::new(endpoint(&url, Duration::from_secs(5), "wrong"));

        let result = transport.generate(&question()).await;
        assert_eq!(status_of(&result), Some((401, "missing bearer token")));
    }

    #[tokio::test]
    async fn test_error_status_keeps_body() {
        let addr = spawn_upstream().await;
        let transport = RestTransport::new(endpoint(
            &format!("http://{addr}/quota"),
            Duration::from_secs(5),
            TOKEN,
        ));

        let result = transport.generate(&question()).await;
        assert_eq!(status_of(&result), Some((429, "quota exceeded")));
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let addr = spawn_upstream().await;
        let transport = TypedTransport::new(endpoint(
            &format!("http://{addr}/slow"),
            Duration::from_millis(300),
            TOKEN,
        ));

        let started = Instant::now();
        let result = transport.generate(&question()).await;
        assert!(result.as_ref().is_err_and(UpstreamError::is_timeout), "{result:?}");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_stalled_token_refresh_times_out() {
        let timeout = Duration::from_millis(200);
        let built = VertexEndpoint::new("http://127.0.0.1:1/v1", timeout, Arc::new(NeverToken));
        assert!(built.is_ok());
        let transport = RestTransport::new(built.unwrap());

        let started = Instant::now();
        let result = transport.generate(&question()).await;
        assert!(matches!(result, Err(UpstreamError::Timeout(t)) if t == timeout));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
