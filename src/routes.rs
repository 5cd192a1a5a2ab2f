use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::bridge::{self, BridgeConfig};

/// The whole HTTP surface: every path is served by the same handler.
pub fn routes(config: Arc<BridgeConfig>) -> Router {
    Router::new().fallback(forward).with_state(config)
}

/// Forwards one POST body through a fresh MCP server process.
///
/// The captured stdout is returned verbatim with an asserted JSON content
/// type; the server speaks JSON-RPC over stdio, the bytes are never
/// inspected here.
async fn forward(
    State(config): State<Arc<BridgeConfig>>,
    method: Method,
    uri: Uri,
    body: Body,
) -> Response {
    let id = fastrand::u64(..);
    log::info!(id; "received request: {method} {}", uri.path());

    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
    }

    let payload = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!(id; "failed reading request body: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error reading request").into_response();
        }
    };

    log::debug!(id, size = payload.len(); "forwarding request body to server");

    let outcome = bridge::run(&config, &payload, id).await;
    if outcome.is_fatal() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error processing request",
        )
            .into_response();
    }

    log::debug!(id, size = outcome.stdout.len(); "returning server response");

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        outcome.stdout,
    )
        .into_response()
}
