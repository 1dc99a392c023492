//! In-process stand-in for the hosted platform, used by unit tests.
//!
//! Binds an axum router to `127.0.0.1:0`, serves canned responses for every
//! endpoint the crate talks to and records what it received.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::auth::{ClientCredentials, CredentialBroker};
use crate::core::config::PlatformSettings;

#[derive(Clone)]
pub struct MockConfig {
    pub token_status: u16,
    pub token_body: Value,
    pub token_delay: Duration,
    pub search_status: u16,
    pub search_body: Value,
    pub completion_status: u16,
    pub completion_body: Value,
    pub ingest_status: u16,
    pub ingest_body: Value,
    pub chat_status: u16,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            token_status: 200,
            token_body: json!({
                "access_token": "token-1",
                "token_type": "Bearer",
                "expires_in": 3600
            }),
            token_delay: Duration::ZERO,
            search_status: 200,
            search_body: json!({ "data": [] }),
            completion_status: 200,
            completion_body: json!({
                "choices": [{ "message": { "content": "generated answer" } }],
                "sources_returned": true,
                "model": "gloo-test-model"
            }),
            ingest_status: 200,
            ingest_body: json!({
                "message": "accepted",
                "ingesting": ["item-1"],
                "duplicates": []
            }),
            chat_status: 200,
        }
    }
}

#[derive(Default)]
pub struct Recorded {
    pub token_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub completion_calls: AtomicUsize,
    pub grounded_calls: AtomicUsize,
    pub ingest_calls: AtomicUsize,
    pub token_forms: Mutex<Vec<String>>,
    pub token_auth: Mutex<Vec<String>>,
    pub search_bodies: Mutex<Vec<Value>>,
    pub completion_bodies: Mutex<Vec<Value>>,
    pub ingest_bodies: Mutex<Vec<Value>>,
    pub chat_bodies: Mutex<Vec<Value>>,
    pub bearer_tokens: Mutex<Vec<String>>,
}

struct MockState {
    config: MockConfig,
    recorded: Arc<Recorded>,
    token_serial: AtomicUsize,
}

pub struct MockPlatform {
    pub base_url: String,
    pub recorded: Arc<Recorded>,
}

impl MockPlatform {
    pub async fn start(config: MockConfig) -> Self {
        let recorded = Arc::new(Recorded::default());
        let state = Arc::new(MockState {
            config,
            recorded: recorded.clone(),
            token_serial: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/oauth2/token", post(token))
            .route("/ai/data/v1/search", post(search))
            .route("/ai/v2/chat/completions", post(completion))
            .route("/ai/v2/chat/completions/grounded", post(grounded))
            .route("/ingestion/v1/real_time_upload", post(ingest_json))
            .route("/engine/v2/item", post(ingest_json))
            .route("/ingestion/v2/files", post(ingest_multipart))
            .route("/ai/v1/message", post(chat_message))
            .route("/ai/v1/chat", get(chat_history))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            recorded,
        }
    }

    pub fn settings(&self) -> PlatformSettings {
        PlatformSettings {
            base_url: self.base_url.clone(),
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            tenant: "test-tenant".to_string(),
            publisher_id: Some("pub-1".to_string()),
            ..PlatformSettings::default()
        }
    }

    pub fn broker(&self) -> Arc<CredentialBroker> {
        Arc::new(CredentialBroker::new(
            reqwest::Client::new(),
            format!("{}/oauth2/token", self.base_url),
            ClientCredentials::new("test-client", "test-secret"),
        ))
    }

    pub fn token_calls(&self) -> usize {
        self.recorded.token_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.recorded.search_calls.load(Ordering::SeqCst)
    }

    pub fn completion_calls(&self) -> usize {
        self.recorded.completion_calls.load(Ordering::SeqCst)
            + self.recorded.grounded_calls.load(Ordering::SeqCst)
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn record_bearer(state: &MockState, headers: &HeaderMap) {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.recorded.bearer_tokens.lock().unwrap().push(value.to_string());
    }
}

async fn token(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    state.recorded.token_calls.fetch_add(1, Ordering::SeqCst);
    state.recorded.token_forms.lock().unwrap().push(body);
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.recorded.token_auth.lock().unwrap().push(value.to_string());
    }
    if !state.config.token_delay.is_zero() {
        tokio::time::sleep(state.config.token_delay).await;
    }

    // Each grant hands out a distinct token so reuse is observable.
    let serial = state.token_serial.fetch_add(1, Ordering::SeqCst) + 1;
    let mut body = state.config.token_body.clone();
    if body.get("access_token").and_then(|v| v.as_str()) == Some("token-1") {
        body["access_token"] = json!(format!("token-{}", serial));
    }
    (status(state.config.token_status), Json(body))
}

async fn search(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.recorded.search_calls.fetch_add(1, Ordering::SeqCst);
    record_bearer(&state, &headers);
    state.recorded.search_bodies.lock().unwrap().push(body);
    (
        status(state.config.search_status),
        Json(state.config.search_body.clone()),
    )
}

async fn completion(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.recorded.completion_calls.fetch_add(1, Ordering::SeqCst);
    record_bearer(&state, &headers);
    state.recorded.completion_bodies.lock().unwrap().push(body);
    (
        status(state.config.completion_status),
        Json(state.config.completion_body.clone()),
    )
}

async fn grounded(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.recorded.grounded_calls.fetch_add(1, Ordering::SeqCst);
    record_bearer(&state, &headers);
    state.recorded.completion_bodies.lock().unwrap().push(body);
    (
        status(state.config.completion_status),
        Json(state.config.completion_body.clone()),
    )
}

async fn ingest_json(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.recorded.ingest_calls.fetch_add(1, Ordering::SeqCst);
    record_bearer(&state, &headers);
    state.recorded.ingest_bodies.lock().unwrap().push(body);
    (
        status(state.config.ingest_status),
        Json(state.config.ingest_body.clone()),
    )
}

async fn ingest_multipart(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    state.recorded.ingest_calls.fetch_add(1, Ordering::SeqCst);
    record_bearer(&state, &headers);
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    state.recorded.ingest_bodies.lock().unwrap().push(json!({
        "content_type": content_type,
        "raw": String::from_utf8_lossy(&body),
        "query": query.unwrap_or_default(),
    }));
    (
        status(state.config.ingest_status),
        Json(state.config.ingest_body.clone()),
    )
}

async fn chat_message(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record_bearer(&state, &headers);
    state.recorded.chat_bodies.lock().unwrap().push(body.clone());
    if state.config.chat_status != 200 {
        return (
            status(state.config.chat_status),
            Json(json!({ "detail": "slow down" })),
        );
    }
    let chat_id = body
        .get("chat_id")
        .and_then(|v| v.as_str())
        .unwrap_or("chat-1")
        .to_string();
    (
        StatusCode::OK,
        Json(json!({
            "chat_id": chat_id,
            "query_id": "q-1",
            "message_id": "m-1",
            "message": "chat answer",
            "timestamp": "2025-01-01T00:00:00Z",
            "success": true,
            "suggestions": ["What is a first step?", "Where can I read more?"],
            "sources": []
        })),
    )
}

#[derive(Deserialize)]
struct ChatParams {
    chat_id: String,
}

async fn chat_history(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<ChatParams>,
) -> impl IntoResponse {
    record_bearer(&state, &headers);
    Json(json!({
        "chat_id": params.chat_id,
        "created_at": "2025-01-01T00:00:00Z",
        "messages": [
            {
                "query_id": "q-1",
                "message_id": "m-0",
                "timestamp": "2025-01-01T00:00:00Z",
                "role": "user",
                "message": "hello"
            },
            {
                "query_id": "q-1",
                "message_id": "m-1",
                "timestamp": "2025-01-01T00:00:01Z",
                "role": "assistant",
                "message": "chat answer",
                "character_limit": 1000
            }
        ]
    }))
}

/// A search hit shaped like the platform's wire format.
pub fn search_hit(title: &str, kind: &str, snippet: &str, certainty: f64) -> Value {
    json!({
        "uuid": format!("id-{}", title),
        "properties": {
            "item_title": title,
            "type": kind,
            "author": ["Author One"],
            "snippet": snippet
        },
        "metadata": { "certainty": certainty }
    })
}
