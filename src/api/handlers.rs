use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::{ChatMessage, SearchResultPayload},
    modes::SearchBar,
    services::{prompts, transport::validate_history},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct PromptsResponse {
    pub greeting: &'static str,
    pub quick_prompts: Vec<&'static str>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Streams the assistant's reply to a conversation as plain text
pub async fn chat(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Response> {
    validate_history(&request.messages)?;

    tracing::info!(
        request_id = %request_id,
        message_count = request.messages.len(),
        transport = state.transport.name(),
        "Processing chat request"
    );

    let fragments = state
        .transport
        .open(&request.messages)
        .await?
        .inspect_err(move |e| {
            tracing::error!(request_id = %request_id, error = %e, "Chat stream aborted");
        });

    let headers = [
        (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
        (header::CACHE_CONTROL, "no-cache"),
    ];
    Ok((headers, Body::from_stream(fragments)).into_response())
}

/// One-shot search: full reply plus extracted suggestions
pub async fn search(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<SearchRequest>,
) -> AppResult<Json<SearchResultPayload>> {
    tracing::info!(request_id = %request_id, query = %request.query, "Processing search request");

    let mut search_bar = SearchBar::new(state.transport.clone());
    let payload = search_bar.search(&request.query).await?;

    Ok(Json(payload))
}

/// Greeting and quick-start prompts for rendering the chat widget
pub async fn get_prompts() -> Json<PromptsResponse> {
    Json(PromptsResponse {
        greeting: prompts::GREETING,
        quick_prompts: prompts::QUICK_PROMPTS.to_vec(),
    })
}
