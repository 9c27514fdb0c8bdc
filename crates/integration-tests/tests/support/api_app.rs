#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use chat_server::http::{AppState, build_router};
use serde_json::{Value, json};
use shared::config::SessionConfig;
use shared::llm::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
};
use shared::models::{Role, SESSION_ID_HEADER, Turn};
use shared::repos::{MemoryTranscriptStore, StoreError, StoreFuture, TranscriptStore};
use shared::session::{SessionAddress, SessionRegistry};
use tower::ServiceExt;

pub const TEST_MODEL: &str = "test-model";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Echo,
    Fail,
    Hang,
}

/// Replies with `echo: <latest user turn>` unless told to fail or hang.
pub struct StubGateway {
    mode: GatewayMode,
    calls: AtomicUsize,
}

impl StubGateway {
    pub fn new(mode: GatewayMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmGateway for StubGateway {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                GatewayMode::Echo => {
                    let latest = request
                        .messages
                        .iter()
                        .rev()
                        .find(|message| message.role == Role::User)
                        .map(|message| message.content.clone())
                        .unwrap_or_default();
                    Ok(LlmGatewayResponse {
                        model: TEST_MODEL.to_string(),
                        provider_request_id: None,
                        content: format!("echo: {latest}"),
                        usage: None,
                    })
                }
                GatewayMode::Fail => Err(LlmGatewayError::ProviderFailure(
                    "status=503 code=overloaded".to_string(),
                )),
                GatewayMode::Hang => {
                    std::future::pending::<()>().await;
                    Err(LlmGatewayError::Timeout)
                }
            }
        })
    }
}

/// Memory store that counts the calls reaching it.
#[derive(Clone, Default)]
pub struct CountingStore {
    inner: MemoryTranscriptStore,
    loads: Arc<AtomicUsize>,
    saves: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn stored_turns(&self, session_id: &str) -> Option<Vec<Turn>> {
        self.inner
            .load(&SessionAddress::derive(session_id))
            .await
            .expect("memory store load should succeed")
    }
}

impl TranscriptStore for CountingStore {
    fn load<'a>(&'a self, address: &'a SessionAddress) -> StoreFuture<'a, Option<Vec<Turn>>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(address)
    }

    fn save<'a>(&'a self, address: &'a SessionAddress, turns: &'a [Turn]) -> StoreFuture<'a, ()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(address, turns)
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        self.inner.ping()
    }
}

/// Every call fails as if the backing database were down.
pub struct UnavailableStore;

impl TranscriptStore for UnavailableStore {
    fn load<'a>(&'a self, _address: &'a SessionAddress) -> StoreFuture<'a, Option<Vec<Turn>>> {
        Box::pin(async { Err(StoreError::Unavailable("connection refused".to_string())) })
    }

    fn save<'a>(
        &'a self,
        _address: &'a SessionAddress,
        _turns: &'a [Turn],
    ) -> StoreFuture<'a, ()> {
        Box::pin(async { Err(StoreError::Unavailable("connection refused".to_string())) })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Err(StoreError::Unavailable("connection refused".to_string())) })
    }
}

pub struct TestApp {
    pub router: axum::Router,
    pub gateway: Arc<StubGateway>,
    pub store: CountingStore,
}

impl TestApp {
    pub fn new(mode: GatewayMode) -> Self {
        Self::with_store(mode, CountingStore::default())
    }

    /// A second app over the same store behaves like a restarted process.
    pub fn with_store(mode: GatewayMode, store: CountingStore) -> Self {
        let gateway = StubGateway::new(mode);
        let router = build_test_router(Arc::new(store.clone()), gateway.clone());
        Self {
            router,
            gateway,
            store,
        }
    }
}

pub fn build_test_router(
    store: Arc<dyn TranscriptStore>,
    gateway: Arc<dyn LlmGateway>,
) -> axum::Router {
    let config = SessionConfig {
        backend_timeout: Duration::from_millis(100),
        persist_retry_backoff: Duration::from_millis(1),
        max_message_chars: 200,
        ..SessionConfig::default()
    };

    build_router(AppState {
        sessions: SessionRegistry::new(store, gateway, Arc::new(config)),
        model_name: TEST_MODEL.to_string(),
    })
}

pub struct JsonResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send_json(app: &axum::Router, request: Request<Body>) -> JsonResponse {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should succeed");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should read");
    let body = serde_json::from_slice::<Value>(&body).unwrap_or_else(|_| json!({}));

    JsonResponse {
        status,
        headers,
        body,
    }
}

pub fn request(
    method: Method,
    uri: &str,
    session_id: Option<&str>,
    json_body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(session_id) = session_id {
        builder = builder.header(SESSION_ID_HEADER, session_id);
    }

    match json_body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build"),
        None => builder.body(Body::empty()).expect("request should build"),
    }
}

pub fn raw_request(method: Method, uri: &str, session_id: &str, raw_body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(SESSION_ID_HEADER, session_id)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(raw_body.to_string()))
        .expect("request should build")
}

pub fn message_request(session_id: &str, message: &str) -> Request<Body> {
    request(
        Method::POST,
        "/api/chat/message",
        Some(session_id),
        Some(json!({ "message": message })),
    )
}

pub fn history_request(session_id: &str) -> Request<Body> {
    request(Method::GET, "/api/chat/history", Some(session_id), None)
}

pub fn clear_request(session_id: &str) -> Request<Body> {
    request(Method::DELETE, "/api/chat/clear", Some(session_id), None)
}
