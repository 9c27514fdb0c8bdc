use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::llm::LlmGatewayError;
use shared::models::ErrorResponse;
use shared::session::SessionError;
use tracing::error;

pub(super) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

pub(super) fn bad_request_response(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

pub(super) async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

pub(super) fn session_error_response(err: SessionError) -> Response {
    match err {
        SessionError::Validation(message) => bad_request_response(&message),
        err @ SessionError::MissingSession => bad_request_response(&err.to_string()),
        SessionError::Backend(err @ LlmGatewayError::Timeout) => {
            error!("generative backend call failed: {err}");
            error_response(StatusCode::GATEWAY_TIMEOUT, "Generative backend timed out")
        }
        SessionError::Backend(err) => {
            error!("generative backend call failed: {err}");
            error_response(StatusCode::BAD_GATEWAY, "Generative backend request failed")
        }
        SessionError::Storage(err) => {
            error!("session storage operation failed: {err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session storage is unavailable",
            )
        }
    }
}
