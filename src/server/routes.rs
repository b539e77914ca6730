//! HTTP route handlers for the relay API.

use std::path::Path;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path as UrlPath, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use crate::conversation::{Conversation, Role};

use super::error::ApiError;
use super::state::AppState;

/// Answer returned when the model produced no text.
pub const NO_ANSWER_FALLBACK: &str = "I could not find an answer to that question.";

/// Create the API router with all routes, serving `static_dir` at `/`.
pub fn create_router(state: Arc<AppState>, static_dir: &Path) -> Router {
    api_routes()
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

/// JSON API routes without the static front-end.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/ask", post(ask))
        .route("/api/conversation/new", post(new_conversation))
        .route(
            "/api/conversation/{id}",
            get(read_conversation).delete(delete_conversation),
        )
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok`.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Configured project id.
    pub project_id: Option<String>,
    /// Whether questions can be answered.
    pub configured: bool,
    /// Selected retrieval backend.
    pub retrieval_source: Option<&'static str>,
    /// Model id.
    pub model: Option<String>,
    /// Live conversations.
    pub conversations: usize,
}

/// Health check endpoint. Never calls the model.
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let backend = state.backend.as_ref().ok();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        project_id: state.project_id.clone(),
        configured: backend.is_some(),
        retrieval_source: backend.map(|b| b.retrieval.source.kind()),
        model: backend.map(|b| b.retrieval.model.clone()),
        conversations: state.conversations.len(),
    })
}

/// Ask request.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    /// The user's question.
    #[serde(default)]
    pub question: Option<String>,
    /// Conversation to continue.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Ask response.
#[derive(Debug, Serialize)]
pub struct AskResponse {
    /// The model's answer.
    pub answer: String,
    /// Source URIs backing the answer.
    pub citations: Vec<String>,
    /// Conversation the exchange was recorded in.
    pub conversation_id: String,
}

/// Answer a question grounded on the configured retrieval source.
async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::MalformedBody(e.body_text()))?;
    let question = request
        .question
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or(ApiError::MissingQuestion)?;

    let backend = state.backend.as_ref().map_err(|e| ApiError::Configuration(e.clone()))?;

    let conversation = state
        .conversations
        .get_or_create(request.conversation_id.as_deref());
    state
        .conversations
        .append(&conversation.id, Role::User, question, None)?;

    let grounded = backend
        .ask(question, &conversation.messages, state.history_window)
        .await
        .map_err(|e| {
            if e.is_timeout() {
                tracing::warn!("Model request for {} timed out", conversation.id);
            }
            ApiError::Upstream(e)
        })?;

    let answer = if grounded.answer.is_empty() {
        NO_ANSWER_FALLBACK.to_string()
    } else {
        grounded.answer
    };
    // The conversation may have been deleted or evicted while the model was answering.
    if let Err(e) = state.conversations.append(
        &conversation.id,
        Role::Assistant,
        answer.clone(),
        Some(grounded.citations.clone()),
    ) {
        tracing::warn!("Answer not recorded: {e}");
    }

    tracing::info!(
        "Answered in conversation {} with {} citations",
        conversation.id,
        grounded.citations.len()
    );

    Ok(Json(AskResponse {
        answer,
        citations: grounded.citations,
        conversation_id: conversation.id,
    }))
}

/// Return the full message log of a conversation.
async fn read_conversation(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<Conversation>, ApiError> {
    Ok(Json(state.conversations.get(&id)?))
}

/// Delete a conversation.
async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.conversations.delete(&id)?;
    tracing::debug!("Deleted conversation {id}");
    Ok(Json(serde_json::json!({ "success": true })))
}

/// New conversation response.
#[derive(Debug, Serialize)]
pub struct NewConversationResponse {
    /// Id of the created conversation.
    pub conversation_id: String,
}

/// Start a new conversation.
async fn new_conversation(State(state): State<Arc<AppState>>) -> Json<NewConversationResponse> {
    let conversation = state.conversations.create();
    Json(NewConversationResponse {
        conversation_id: conversation.id,
    })
}
