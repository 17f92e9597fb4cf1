use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

/// Liveness probe.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<String> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(ServerError::NotFound)
}
