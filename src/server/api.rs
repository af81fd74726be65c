use axum::{
    body::Body,
    extract::{ rejection::JsonRejection, State },
    http::{ header, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use futures::StreamExt;
use log::{ debug, error, info, warn };
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::{ Any, CorsLayer };

use crate::analytics::Analytics;
use crate::analytics::trace::traced_stream_chat;
use crate::config::languages::{ Language, LANGUAGES };
use crate::config::prompt::{ system_prompt, DEFAULT_LANGUAGE };
use crate::llm::LlmError;
use crate::llm::chat::{ ChatClient, TokenStream };
use crate::models::chat::{ ChatRequest, ErrorBody };
use crate::store::{ MessageLog, NewLogEntry };

pub const GENERIC_FAILURE: &str = "An error occurred while processing your request.";

#[derive(Clone)]
pub struct AppState {
    pub chat_client: Arc<dyn ChatClient>,
    pub message_log: Arc<dyn MessageLog>,
    pub analytics: Analytics,
    pub log_write_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("request must contain at least one message")]
    EmptyMessages,

    #[error(transparent)]
    Model(#[from] LlmError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::InvalidBody(detail) => (
                StatusCode::BAD_REQUEST,
                ErrorBody { error: "Invalid request body.".into(), message: detail.clone() },
            ),
            ApiError::EmptyMessages => (
                StatusCode::BAD_REQUEST,
                ErrorBody { error: "Invalid request body.".into(), message: self.to_string() },
            ),
            ApiError::Model(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody { error: GENERIC_FAILURE.into(), message: e.public_message().into() },
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/languages", get(languages_handler))
        .route("/api/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected chat request: {}", rejection.body_text());
        ApiError::InvalidBody(rejection.body_text())
    })?;

    let (Some(first), Some(last)) = (request.messages.first(), request.messages.last()) else {
        warn!("Rejected chat request without messages");
        return Err(ApiError::EmptyMessages);
    };

    let language = request.language
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(DEFAULT_LANGUAGE);

    info!(
        "Rewrite requested: messages={} chars={} language={}",
        request.messages.len(),
        first.content.chars().count(),
        language
    );

    log_submission(&state, &last.content).await;

    let system = system_prompt(&first.content, language);

    let mut analytics = state.analytics.scope();
    let result = traced_stream_chat(
        state.chat_client.as_ref(),
        &mut analytics,
        &system,
        &request.messages
    ).await;
    analytics.shutdown();

    match result {
        Ok(tokens) => Ok(stream_response(tokens)),
        Err(e) => {
            error!("Error during text streaming: {}", e);
            Err(ApiError::Model(e))
        }
    }
}

/// Appends the submitted text to the message log. Failures are logged and
/// otherwise ignored; the write is bounded by `log_write_timeout`.
async fn log_submission(state: &AppState, content: &str) {
    let insert = state.message_log.insert(NewLogEntry::submitted(content));
    match tokio::time::timeout(state.log_write_timeout, insert).await {
        Ok(Ok(entry)) => debug!("Logged submitted message {}", entry.id),
        Ok(Err(e)) => error!("Error inserting message: {}", e),
        Err(_) => warn!("Message log write timed out after {:?}", state.log_write_timeout),
    }
}

fn stream_response(tokens: TokenStream) -> Response {
    let body = tokens.map(|item| {
        item.inspect_err(|e| error!("Model stream failed mid-response: {}", e))
    });

    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from_stream(body),
    ).into_response()
}

async fn languages_handler() -> Json<&'static [Language]> {
    Json(LANGUAGES)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
