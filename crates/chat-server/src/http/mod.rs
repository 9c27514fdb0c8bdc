use axum::http::{HeaderMap, HeaderName, Method, header};
use axum::routing::{delete, get, post};
use axum::{Router, middleware};
use shared::models::SESSION_ID_HEADER;
use shared::session::SessionRegistry;
use tower_http::cors::{Any, CorsLayer};

mod chat;
mod errors;
mod health;
mod observability;

pub use observability::REQUEST_ID_HEADER;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub model_name: String,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(health::service_info))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/api/chat/message", post(chat::send_message))
        .route("/api/chat/history", get(chat::get_history))
        .route("/api/chat/clear", delete(chat::clear_history))
        .fallback(errors::not_found)
        .method_not_allowed_fallback(errors::not_found)
        .layer(middleware::from_fn(
            observability::request_observability_middleware,
        ))
        .layer(cors_layer())
        .with_state(app_state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(SESSION_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
