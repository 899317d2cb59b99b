//! HTTP handlers for the conversation endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::application::{ContextAssembler, ProcessTurnError, ProcessTurnHandler};
use crate::domain::foundation::SessionId;
use crate::domain::funnel::LeadScorer;
use crate::ports::{SessionStore, StoreError};

use super::dto::{
    ErrorResponse, FrameRequest, FrameResponse, SessionResponse, TurnRequest, TurnResponse,
};

/// Shared handler state.
pub struct AppState<S: LeadScorer> {
    pub process: Arc<ProcessTurnHandler<S>>,
    pub assembler: Arc<ContextAssembler>,
    pub store: Arc<dyn SessionStore>,
}

impl<S: LeadScorer> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            process: Arc::clone(&self.process),
            assembler: Arc::clone(&self.assembler),
            store: Arc::clone(&self.store),
        }
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, Response> {
    raw.parse::<SessionId>().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::bad_request("Invalid session ID")),
        )
            .into_response()
    })
}

/// POST /api/sessions/:id/turns - Process one conversation turn
pub async fn process_turn<S: LeadScorer + 'static>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    if req.messages.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::bad_request("messages must not be empty")),
        )
            .into_response();
    }

    let history = req.into_history();

    match state.process.handle(session_id, &history).await {
        Ok(result) => {
            let response: TurnResponse = result.into();
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => handle_turn_error(e),
    }
}

/// POST /api/sessions/:id/frames - Ingest one evidence frame
pub async fn ingest_frame<S: LeadScorer + 'static>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<String>,
    Json(req): Json<FrameRequest>,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let scored = state
        .assembler
        .ingest_frame(session_id, req.into_frame())
        .await;
    let response: FrameResponse = scored.into();
    (StatusCode::ACCEPTED, Json(response)).into_response()
}

/// GET /api/sessions/:id - Get session state
pub async fn get_session<S: LeadScorer + 'static>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.store.get(&session_id).await {
        Ok(Some(record)) => {
            let response: SessionResponse = record.into();
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found(format!(
                "Session not found: {}",
                session_id
            ))),
        )
            .into_response(),
        Err(e) => handle_store_error(e),
    }
}

/// DELETE /api/sessions/:id - Delete a session past retention
pub async fn delete_session<S: LeadScorer + 'static>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.store.delete(&session_id).await {
        Ok(()) => {
            state.assembler.evict_session(&session_id).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => handle_store_error(e),
    }
}

/// GET /health - Liveness probe
pub async fn health() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

fn handle_turn_error(error: ProcessTurnError) -> Response {
    match error {
        ProcessTurnError::SessionRead(e) => handle_store_error(e),
        ProcessTurnError::Routing(e) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse::new("routing_failed", e.to_string())),
        )
            .into_response(),
        ProcessTurnError::Responder(e) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse::new("responder_failed", e.to_string())),
        )
            .into_response(),
        ProcessTurnError::ResponderUnavailable(kind) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(
                "responder_unavailable",
                format!("No responder registered for {}", kind),
            )),
        )
            .into_response(),
    }
}

fn handle_store_error(error: StoreError) -> Response {
    match error {
        StoreError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found(format!("Session not found: {}", id))),
        )
            .into_response(),
        StoreError::VersionConflict { .. } => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("version_conflict", error.to_string())),
        )
            .into_response(),
        StoreError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("store_unavailable", error.to_string())),
        )
            .into_response(),
    }
}
