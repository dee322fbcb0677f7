//! Audit log readback

use axum::{
    Json,
    extract::State as AxumState,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::SharedState;

/// GET /metrics - raw audit log contents
pub async fn get_metrics(AxumState(state): AxumState<SharedState>) -> Response {
    let Some(path) = state.audit.path() else {
        error!("Audit log is not backed by a file");
        return unavailable();
    };

    match tokio::fs::read(path).await {
        Ok(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            content,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to read audit log {}: {}", path.display(), e);
            unavailable()
        }
    }
}

fn unavailable() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "status": "error", "reason": "audit_log_unavailable" })),
    )
        .into_response()
}
