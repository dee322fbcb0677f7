//! HTTP surface: webhook intake, audit log readback and health check

pub mod metrics;
pub mod webhook;

use axum::{
    Json, Router,
    extract::{Query, State as AxumState},
    response::IntoResponse,
    routing,
};
use serde_json::json;
use std::collections::HashMap;

use crate::SharedState;

// Re-export handlers
pub use metrics::get_metrics;
pub use webhook::handle_webhook;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(root))
        .route("/webhook", routing::post(handle_webhook))
        .route("/metrics", routing::get(get_metrics))
        .with_state(state)
}

/// Root health check endpoint
/// Supports ?format=json for detailed JSON response
pub async fn root(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if params.get("format").map(String::as_str) == Some("json") {
        Json(json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
            "total_projects": state.registry.len(),
            "status": "healthy"
        }))
        .into_response()
    } else {
        "deploy_hook - healthy".into_response()
    }
}
