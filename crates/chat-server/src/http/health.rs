use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::models::{ErrorResponse, OkResponse, ServiceInfoResponse};
use tracing::{debug, warn};

use super::AppState;

const SERVICE_NAME: &str = "chat-server";
const ENDPOINTS: [&str; 3] = [
    "POST /api/chat/message",
    "GET /api/chat/history",
    "DELETE /api/chat/clear",
];

pub(super) async fn service_info(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ServiceInfoResponse {
            name: SERVICE_NAME.to_string(),
            model: state.model_name.clone(),
            endpoints: ENDPOINTS.iter().map(|endpoint| endpoint.to_string()).collect(),
        }),
    )
}

pub(super) async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(OkResponse { ok: true }))
}

pub(super) async fn readyz(State(state): State<AppState>) -> Response {
    match state.sessions.store().ping().await {
        Ok(()) => {
            debug!(
                resident_sessions = state.sessions.resident_sessions(),
                "readiness check passed"
            );
            (StatusCode::OK, Json(OkResponse { ok: true })).into_response()
        }
        Err(err) => {
            warn!("readiness check failed: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new("Session store not ready")),
            )
                .into_response()
        }
    }
}
