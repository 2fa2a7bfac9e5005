//! Thin inbound HTTP surface.
//!
//! `GET /healthz`, `GET /debug/version`, `POST /debug/replay` (routing and
//! retrieval only), and `POST /api/v1/ask` guarded by bearer API keys with
//! a fixed-window per-key rate limit. Everything else about serving
//! (event receipt, signatures, reply posting) belongs to the shells.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::{QuestionInput, ThreadMessage};
use crate::pipeline::{Lightopedia, PIPELINE_VERSION};
use crate::retrieval::RETRIEVAL_VERSION;
use crate::router::ROUTER_VERSION;

/// Requests allowed per key per window.
const RATE_LIMIT_MAX: u32 = 30;
/// Fixed rate-limit window.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Shared state behind the HTTP surface.
pub struct AppState {
    pipeline: Arc<Lightopedia>,
    api_keys: Vec<String>,
    limiter: Mutex<HashMap<String, (Instant, u32)>>,
}

impl AppState {
    /// Creates HTTP state over the pipeline.
    #[must_use]
    pub fn new(pipeline: Arc<Lightopedia>, api_keys: Vec<String>) -> Self {
        Self {
            pipeline,
            api_keys,
            limiter: Mutex::new(HashMap::new()),
        }
    }

    /// Fixed-window check; returns `false` when the key is over budget.
    fn within_rate_limit(&self, key: &str) -> bool {
        let Ok(mut windows) = self.limiter.lock() else {
            return false;
        };
        let now = Instant::now();
        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) > RATE_LIMIT_WINDOW {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 <= RATE_LIMIT_MAX
    }
}

/// Builds the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/debug/version", get(version))
        .route("/debug/replay", post(debug_replay))
        .route("/api/v1/ask", post(ask))
        .with_state(state)
}

/// Serves the router until ctrl-c.
///
/// # Errors
///
/// Returns IO errors from binding or serving.
pub async fn serve(state: Arc<AppState>, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "http surface listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down http surface");
        })
        .await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({
        "router": ROUTER_VERSION,
        "retrieval": RETRIEVAL_VERSION,
        "pipeline": PIPELINE_VERSION,
    }))
}

/// Request body for `POST /debug/replay` and `POST /api/v1/ask`.
#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    thread_history: Vec<ThreadMessage>,
    #[serde(default)]
    user_context: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReplayResponse {
    route: crate::router::RouteDecision,
    candidates: Vec<crate::telemetry::ReplayCandidate>,
}

async fn debug_replay(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskRequest>,
) -> Json<ReplayResponse> {
    let (route, candidates) = state
        .pipeline
        .dry_run(&body.question, &body.thread_history)
        .await;
    Json(ReplayResponse { route, candidates })
}

async fn ask(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AskRequest>,
) -> Response {
    if state.api_keys.is_empty() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "ask api disabled");
    }

    let Some(key) = bearer_token(&headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "missing bearer token");
    };
    if !state.api_keys.iter().any(|k| k == key) {
        return error_response(StatusCode::UNAUTHORIZED, "invalid api key");
    }
    if !state.within_rate_limit(key) {
        return error_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
    }

    let input = QuestionInput::bare(&body.question);
    match state
        .pipeline
        .handle_question(
            &input,
            &body.thread_history,
            body.user_context.as_deref(),
            &CancellationToken::new(),
        )
        .await
    {
        Ok(outcome) => Json(json!({
            "request_id": outcome.request_id,
            "response": outcome.response,
            "answer": outcome.answer,
        }))
        .into_response(),
        Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "request was cancelled"),
    }
}

/// Extracts the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage};
    use crate::agent::provider::LlmProvider;
    use crate::embedding::{EMBEDDING_DIMENSIONS, Embedder};
    use crate::error::LlmError;
    use crate::store::{ArticleStore, SqliteStore, shared};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct StubProvider;

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            // Classifier and expansion prompts both get harmless JSON; the
            // loop gets a plain refusal.
            let content = if request.json_mode {
                r#"{"mode": "capability_docs", "queries": []}"#.to_string()
            } else {
                "No documented answer found.".to_string()
            };
            Ok(ChatResponse {
                content,
                usage: TokenUsage::default(),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    struct ZeroEmbedder;

    #[async_trait]
    impl Embedder for ZeroEmbedder {
        fn dimensions(&self) -> usize {
            EMBEDDING_DIMENSIONS
        }

        fn model(&self) -> &str {
            "zero-test"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, LlmError> {
            Ok(texts.iter().map(|_| vec![0.0; EMBEDDING_DIMENSIONS]).collect())
        }
    }

    fn test_state(api_keys: Vec<String>) -> Arc<AppState> {
        let mut store = SqliteStore::in_memory().unwrap_or_else(|e| panic!("open: {e}"));
        store.init().unwrap_or_else(|e| panic!("init: {e}"));
        let pipeline = Arc::new(Lightopedia::new(
            shared(store),
            Arc::new(StubProvider),
            Arc::new(ZeroEmbedder),
            None,
        ));
        Arc::new(AppState::new(pipeline, api_keys))
    }

    async fn body_string(response: Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .map(http_body_util::Collected::to_bytes)
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn test_healthz() {
        let app = router(test_state(Vec::new()));
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap_or_else(|e| panic!("request build: {e}")))
            .await
            .unwrap_or_else(|_| panic!("request failed"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }

    #[tokio::test]
    async fn test_version_reports_pinned_versions() {
        let app = router(test_state(Vec::new()));
        let response = app
            .oneshot(
                Request::get("/debug/version")
                    .body(Body::empty())
                    .unwrap_or_else(|e| panic!("request build: {e}")),
            )
            .await
            .unwrap_or_else(|_| panic!("request failed"));
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains(ROUTER_VERSION));
        assert!(body.contains(RETRIEVAL_VERSION));
        assert!(body.contains(PIPELINE_VERSION));
    }

    #[tokio::test]
    async fn test_ask_requires_key() {
        let app = router(test_state(vec!["secret".to_string()]));
        let request = Request::post("/api/v1/ask")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"question": "Can Light handle invoices?"}"#))
            .unwrap_or_else(|e| panic!("request build: {e}"));
        let response = app
            .oneshot(request)
            .await
            .unwrap_or_else(|_| panic!("request failed"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ask_disabled_without_keys() {
        let app = router(test_state(Vec::new()));
        let request = Request::post("/api/v1/ask")
            .header("content-type", "application/json")
            .header("authorization", "Bearer anything")
            .body(Body::from(r#"{"question": "hi"}"#))
            .unwrap_or_else(|e| panic!("request build: {e}"));
        let response = app
            .oneshot(request)
            .await
            .unwrap_or_else(|_| panic!("request failed"));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_ask_answers_with_valid_key() {
        let app = router(test_state(vec!["secret".to_string()]));
        let request = Request::post("/api/v1/ask")
            .header("content-type", "application/json")
            .header("authorization", "Bearer secret")
            .body(Body::from(
                r#"{"question": "Can Light handle multi-currency invoicing?"}"#,
            ))
            .unwrap_or_else(|e| panic!("request build: {e}"));
        let response = app
            .oneshot(request)
            .await
            .unwrap_or_else(|_| panic!("request failed"));
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("request_id"));
        assert!(body.contains("needs_clarification"));
    }

    #[tokio::test]
    async fn test_debug_replay_returns_route() {
        let app = router(test_state(Vec::new()));
        let request = Request::post("/debug/replay")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"question": "Can Light handle multi-currency invoicing?"}"#,
            ))
            .unwrap_or_else(|e| panic!("request build: {e}"));
        let response = app
            .oneshot(request)
            .await
            .unwrap_or_else(|_| panic!("request failed"));
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("capability_docs"));
        assert!(body.contains("candidates"));
    }

    #[test]
    fn test_rate_limit_window() {
        let state = test_state(vec!["k".to_string()]);
        for _ in 0..RATE_LIMIT_MAX {
            assert!(state.within_rate_limit("k"));
        }
        assert!(!state.within_rate_limit("k"));
        // A different key has its own window.
        assert!(state.within_rate_limit("other"));
    }
}
