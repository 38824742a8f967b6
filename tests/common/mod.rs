//! Common utilities for integration tests
//!
//! Provides the binary location, an environment-isolated command builder and
//! an in-process mock of the products API built on axum.

#![allow(dead_code)] // Each test crate uses a different subset

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_API_KEY: &str = "test-api-key-123456";
pub const TEST_BUDGET_KEY: &str = "test-budget-key-98765";

const ENV_VARS: [&str; 3] = [
    "AGENTPMT_API_URL",
    "AGENTPMT_API_KEY",
    "AGENTPMT_BUDGET_KEY",
];

/// Get the path to the `agent-payment-router` binary
///
/// Prefers `CARGO_BIN_EXE_agent-payment-router`, which cargo sets for
/// integration tests, and falls back to `cargo_bin()` for custom target
/// directories.
#[allow(deprecated)] // cargo_bin() is deprecated but needed for fallback
pub fn router_binary() -> PathBuf {
    std::env::var("CARGO_BIN_EXE_agent-payment-router")
        .map(PathBuf::from)
        .unwrap_or_else(|_| assert_cmd::cargo::cargo_bin("agent-payment-router"))
}

/// Command for the relay with none of the credential variables inherited
pub fn router_command() -> std::process::Command {
    let mut cmd = std::process::Command::new(router_binary());
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Same as [`router_command`] with valid credentials pointing at `api_url`
pub fn router_command_with_credentials(api_url: &str) -> std::process::Command {
    let mut cmd = router_command();
    cmd.env("AGENTPMT_API_URL", api_url)
        .env("AGENTPMT_API_KEY", TEST_API_KEY)
        .env("AGENTPMT_BUDGET_KEY", TEST_BUDGET_KEY);
    cmd
}

/// One request as seen by the mock upstream
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: &'static str,
    pub query: Vec<(String, String)>,
    pub api_key: Option<String>,
    pub budget_key: Option<String>,
    pub user_agent: Option<String>,
    pub accept: Option<String>,
    pub body: Option<Value>,
}

impl RecordedRequest {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockState {
    fn record(
        &self,
        path: &'static str,
        query: Vec<(String, String)>,
        headers: &HeaderMap,
        body: Option<Value>,
    ) {
        let header_value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.requests.lock().unwrap().push(RecordedRequest {
            path,
            query,
            api_key: header_value("x-api-key"),
            budget_key: header_value("x-budget-key"),
            user_agent: header_value("user-agent"),
            accept: header_value("accept"),
            body,
        });
    }
}

/// Products API stand-in listening on an ephemeral local port
///
/// Catalog (two pages):
/// - page 1: `prod_smart_math` "Smart Math — does math",
///   `prod_stream` "Stream Tool — streams letters"
/// - page 2: `prod_stream_error` "Stream Tool — fails midway"
///
/// Purchases by product id: `prod_smart_math` → `"42"`, `prod_json` → an
/// object output, `prod_fail` → `success:false`, `prod_status` → HTTP 500,
/// `prod_slow` → never completes. With `stream=true`, `prod_stream` sends
/// `A`, `B` then `done`, `prod_stream_error` sends an `error` event,
/// `prod_slow` sends one chunk and stalls, anything else gets a plain JSON
/// reply.
pub struct MockUpstream {
    pub base_url: String,
    state: MockState,
    server: tokio::task::JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/products/fetch", get(fetch_handler))
            .route("/products/purchase", post(purchase_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock upstream");
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            server,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Base URL on which nothing is listening
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Accepts connections and never writes a byte back
pub struct SilentUpstream {
    pub base_url: String,
    server: tokio::task::JoinHandle<()>,
}

impl SilentUpstream {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind silent upstream");
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            server,
        }
    }
}

impl Drop for SilentUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[derive(Debug, Deserialize)]
struct FetchQuery {
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PurchaseQuery {
    stream: Option<String>,
}

fn catalog_entry(id: &str, description: &str) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": id,
            "description": description,
            "parameters": {"type": "object", "properties": {"x": {"type": "number"}}}
        }
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-api-key").and_then(|v| v.to_str().ok()) == Some(TEST_API_KEY)
        && headers.get("x-budget-key").and_then(|v| v.to_str().ok()) == Some(TEST_BUDGET_KEY)
}

async fn fetch_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<FetchQuery>,
) -> Response {
    let mut recorded = Vec::new();
    if let Some(page) = query.page {
        recorded.push(("page".to_string(), page.to_string()));
    }
    if let Some(size) = query.page_size {
        recorded.push(("page_size".to_string(), size.to_string()));
    }
    state.record("/products/fetch", recorded, &headers, None);

    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }

    let body = match query.page.unwrap_or(1) {
        1 => json!({
            "success": true,
            "details": {"has_next_page": true, "total_pages": 2},
            "tools": [
                catalog_entry("prod_smart_math", "Smart Math — does math"),
                catalog_entry("prod_stream", "Stream Tool — streams letters"),
            ]
        }),
        _ => json!({
            "success": true,
            "details": {"has_next_page": false, "total_pages": 2},
            "tools": [catalog_entry("prod_stream_error", "Stream Tool — fails midway")]
        }),
    };
    Json(body).into_response()
}

async fn purchase_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<PurchaseQuery>,
    Json(body): Json<Value>,
) -> Response {
    let streaming = query.stream.as_deref() == Some("true");
    let recorded = query
        .stream
        .iter()
        .map(|v| ("stream".to_string(), v.clone()))
        .collect();
    state.record("/products/purchase", recorded, &headers, Some(body.clone()));

    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }

    let product_id = body["product_id"].as_str().unwrap_or_default().to_string();
    match (product_id.as_str(), streaming) {
        ("prod_stream", true) => event_stream("data: A\n\ndata: B\n\nevent: done\ndata: \n\n"),
        ("prod_stream_error", true) => event_stream("event: error\ndata: boom\n\n"),
        ("prod_slow", true) => {
            let chunks = stream::once(async {
                Ok::<_, std::io::Error>(b"data: partial\n\n".to_vec())
            })
            .chain(stream::pending());
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(chunks),
            )
                .into_response()
        },
        ("prod_slow", false) => {
            tokio::time::sleep(Duration::from_secs(300)).await;
            Json(json!({"success": true, "output": "too late"})).into_response()
        },
        ("prod_fail", _) => {
            Json(json!({"success": false, "error": "insufficient budget"})).into_response()
        },
        ("prod_status", _) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response()
        },
        ("prod_json", _) => {
            Json(json!({"success": true, "output": {"value": 1}})).into_response()
        },
        _ => Json(json!({"success": true, "output": "42"})).into_response(),
    }
}

fn event_stream(body: &'static str) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}
