//! Route table and the proxy endpoint handler.
//!
//! `POST /rpc` is the single proxy surface: the body is a JSON-RPC 2.0
//! envelope, forwarded verbatim through the serial queue. The response is
//! either the upstream's payload untouched (200) or a fixed JSON-RPC error
//! envelope (502) that never leaks the specific upstream failure.

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{any, get},
    Router,
};
use conduit_core::{analytics::Analytics, queue::SerialQueue, types::JsonRpcResponse};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::error;

/// Largest accepted request body. JSON-RPC envelopes are small; anything
/// bigger is abuse.
const MAX_BODY_BYTES: usize = 128 * 1024;

/// Shared state for the proxy routes.
#[derive(Clone)]
pub struct AppState {
    pub queue: SerialQueue,
    pub analytics: Arc<Analytics>,
}

/// Builds the proxy router.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/rpc", any(rpc_entry))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn rpc_entry(
    method: Method,
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    if method != Method::POST {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({ "error": "Method not allowed" })),
        );
    }

    let Ok(request) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid JSON body" })));
    };

    let request_id = request.get("id").cloned().unwrap_or(Value::Null);
    let rpc_method =
        request.get("method").and_then(|m| m.as_str()).unwrap_or("unknown").to_string();

    state.analytics.record_enqueued();

    match state.queue.submit(request).await {
        Ok(payload) => {
            state.analytics.record_settled(true);
            (StatusCode::OK, Json(payload))
        }
        Err(err) => {
            state.analytics.record_settled(false);
            // Timed-out exhaustion is expected and frequent; logging every
            // instance would drown the signal.
            if !err.is_timeout() {
                error!(error = %err, method = %rpc_method, "rpc proxy error");
            }
            let envelope = JsonRpcResponse::error(
                -32603,
                "All RPC nodes temporarily unavailable. Please retry.".to_string(),
                Arc::new(request_id),
            );
            let body = serde_json::to_value(&envelope).unwrap_or(Value::Null);
            (StatusCode::BAD_GATEWAY, Json(body))
        }
    }
}
