//! Webhook handler for GitHub deliveries

use axum::{
    Json,
    body::{self, Body, Bytes},
    extract::{Query, State as AxumState},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::HashMap;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::audit::{AuditRecord, STATUS_SUCCESS, snapshot_headers};
use crate::error::{DeployError, Result};
use crate::utils::verify_github_signature;
use crate::webhook::{PayloadSummary, decode_payload};

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const PUSH_EVENT: &str = "push";

/// Handles `POST /webhook?project=<name>`.
///
/// Every request, whatever its outcome, produces exactly one audit record
/// before the response is returned.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let request_id = Uuid::now_v7();
    let project_name = params.get("project").cloned().unwrap_or_default();
    let span = info_span!("webhook", %request_id, project = %project_name);

    async move {
        let mut summary = None;
        let result = process_delivery(&state, &project_name, &headers, body, &mut summary).await;

        let status = match &result {
            Ok(_) => STATUS_SUCCESS.to_string(),
            Err(e) => e.audit_status(),
        };
        let record = AuditRecord::new(
            request_id,
            project_name,
            snapshot_headers(&headers),
            summary,
            status,
        );
        state.audit.append(&record).await;

        match result {
            Ok(deployed) => (
                StatusCode::OK,
                Json(json!({ "status": "ok", "deployed": deployed })),
            )
                .into_response(),
            Err(e) => {
                warn!("Webhook rejected: {}", e.reason());
                (
                    e.status_code(),
                    Json(json!({ "status": "error", "reason": e.reason() })),
                )
                    .into_response()
            }
        }
    }
    .instrument(span)
    .await
}

/// Runs the delivery through name check, decode, lookup, signature check,
/// event filter and deployment, stopping at the first failure.
/// Returns whether the deployment script ran.
async fn process_delivery(
    state: &SharedState,
    project_name: &str,
    headers: &HeaderMap,
    body: Body,
    summary: &mut Option<PayloadSummary>,
) -> Result<bool> {
    if project_name.is_empty() {
        return Err(DeployError::MissingProjectName);
    }

    let raw: Bytes = body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| {
            error!("Could not read request body: {}", e);
            DeployError::BodyRead(e.to_string())
        })?;

    let content_type = header_str(headers, "Content-Type").unwrap_or_default();
    let payload = decode_payload(&raw, content_type).inspect_err(|e| {
        info!("Could not decode payload: {}", e);
    })?;
    *summary = payload.summary();

    let project = state.registry.lookup(project_name).inspect_err(|_| {
        warn!("No project named '{}' is configured", project_name);
    })?;

    // GitHub signs the request body as sent, form-encoded or not
    let signature = header_str(headers, SIGNATURE_HEADER).unwrap_or_default();
    if !verify_github_signature(&project.secret, &raw, signature) {
        error!("Signature verification failed for project '{}'!", project_name);
        return Err(DeployError::SignatureMismatch);
    }

    let event = header_str(headers, EVENT_HEADER);
    if event != Some(PUSH_EVENT) {
        info!("Not push event; Received {:?} event", event);
        return Ok(false);
    }

    debug!("Waiting for deploy lock of project '{}'", project_name);
    let _guard = project.deploy_lock.lock().await;
    info!("Push event for project '{}'. Running deployment script.", project_name);
    let outcome = state.runner.run(&project.path).await?;
    info!(
        "Deployment of '{}' finished with {} (permissions repaired: {}, output truncated: {})",
        project_name, outcome.exit_status, outcome.permissions_repaired, outcome.output_truncated
    );
    debug!("Script output:\n{}", outcome.output);

    Ok(true)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
