use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use shared::models::{
    ClearResult, HistoryResult, MessageResult, SESSION_ID_HEADER, SendMessageRequest,
    SuccessResponse,
};
use shared::session::{SessionActor, SessionId};
use tracing::warn;

use super::errors::{bad_request_response, session_error_response};
use super::{AppState, header_str};

pub(super) async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session_id = match resolve_session(&headers) {
        Ok(session_id) => session_id,
        Err(response) => return response,
    };

    let request = match serde_json::from_slice::<SendMessageRequest>(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(session = %session_id.address(), "rejected malformed message body: {err}");
            return bad_request_response("Request body must be a JSON object with a message");
        }
    };

    let actor = state.sessions.actor_for(&session_id);
    match actor
        .message(request.message.as_deref().unwrap_or_default())
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(SuccessResponse::new(MessageResult {
                response: outcome.response,
                model: outcome.model,
                message_count: outcome.message_count,
            })),
        )
            .into_response(),
        Err(err) => session_error_response(err),
    }
}

pub(super) async fn get_history(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match actor.history().await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(SuccessResponse::new(HistoryResult {
                messages: snapshot.turns,
                message_count: snapshot.message_count,
            })),
        )
            .into_response(),
        Err(err) => session_error_response(err),
    }
}

pub(super) async fn clear_history(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match actor.clear().await {
        Ok(()) => (
            StatusCode::OK,
            Json(SuccessResponse::new(ClearResult { cleared: true })),
        )
            .into_response(),
        Err(err) => session_error_response(err),
    }
}

// Rejects before any actor exists for the request.
fn resolve_session(headers: &HeaderMap) -> Result<SessionId, Response> {
    SessionId::parse(header_str(headers, SESSION_ID_HEADER)).map_err(session_error_response)
}

fn resolve_actor(state: &AppState, headers: &HeaderMap) -> Result<Arc<SessionActor>, Response> {
    let session_id = resolve_session(headers)?;
    Ok(state.sessions.actor_for(&session_id))
}
