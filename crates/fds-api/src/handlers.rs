//! Route handler functions for all API endpoints.
//!
//! Each handler extracts parameters via axum extractors, interacts with the
//! orchestrator through AppState, and returns JSON responses. The chat
//! endpoint streams its reply as SSE events.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use fds_chat::{reply_channel, SessionSummary, Turn, MAX_MESSAGE_LENGTH};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request and response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub session_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: Uuid,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
    pub chat_enabled: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /chat - process one user message, streaming the reply as SSE.
///
/// Emits `fragment` events in order, then one `done` event carrying the
/// session id, tool call count, and optional chart URL. A model or
/// dispatch fault after the stream has started becomes an `error` event.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>, ApiError> {
    if !state.config.chat.enabled {
        return Err(ApiError::ServiceUnavailable("Chat is disabled".to_string()));
    }
    if req.user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
    }
    if req.message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }
    if req.message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ApiError::UnprocessableEntity(format!(
            "message exceeds {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }

    let (sink, mut agg) = reply_channel(64);
    let orchestrator = Arc::clone(&state.orchestrator);
    let worker = tokio::spawn(async move {
        orchestrator
            .handle_message(&req.user_id, req.session_id, &req.message, &sink)
            .await
    });

    let (tx, rx) = mpsc::channel::<Event>(64);
    tokio::spawn(async move {
        while let Some(fragment) = agg.recv().await {
            let event = Event::default().event("fragment").data(fragment);
            if tx.send(event).await.is_err() {
                // Client gone; the worker still finishes the turn so it
                // lands in session history.
                return;
            }
        }
        let event = match worker.await {
            Ok(Ok((outcome, sid))) => {
                let done = serde_json::json!({
                    "session_id": sid,
                    "tool_calls": outcome.tool_calls,
                    "chart_url": outcome.chart_url,
                });
                Event::default().event("done").data(done.to_string())
            }
            Ok(Err(err)) => {
                // Raw error details stay in the log, not in the reply.
                tracing::error!("Chat turn failed: {}", err);
                Event::default()
                    .event("error")
                    .data("The request could not be completed. Please try again.")
            }
            Err(err) => {
                tracing::error!("Chat task panicked: {}", err);
                Event::default()
                    .event("error")
                    .data("The request could not be completed. Please try again.")
            }
        };
        let _ = tx.send(event).await;
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// GET /sessions - list active sessions.
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    let sessions = state.orchestrator.sessions().summaries();
    let total = sessions.len();
    Json(SessionsResponse { sessions, total })
}

/// GET /sessions/:id/history - full turn history of one session.
pub async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let turns = state
        .orchestrator
        .sessions()
        .history(id)
        .map_err(ApiError::from)?;
    Ok(Json(HistoryResponse {
        session_id: id,
        turns,
    }))
}

/// DELETE /sessions/:id - delete one session.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state
        .orchestrator
        .sessions()
        .delete(id)
        .map_err(ApiError::from)?;
    Ok(Json(DeleteResponse { deleted: id }))
}

/// GET /health - service health and uptime.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.orchestrator.sessions().summaries().len(),
        chat_enabled: state.config.chat.enabled,
    })
}
