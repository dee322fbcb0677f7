//! Append-only audit trail, one JSON line per webhook request

use axum::http::HeaderMap;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{DeployError, Result};
use crate::webhook::PayloadSummary;

pub const STATUS_SUCCESS: &str = "success";

/// What happened to a single webhook request.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub request_id: Uuid,
    pub timestamp: String,
    pub project_name: String,
    pub headers: BTreeMap<String, String>,
    pub payload: Option<PayloadSummary>,
    pub status: String,
}

impl AuditRecord {
    pub fn new(
        request_id: Uuid,
        project_name: String,
        headers: BTreeMap<String, String>,
        payload: Option<PayloadSummary>,
        status: String,
    ) -> Self {
        Self {
            request_id,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            project_name,
            headers,
            payload,
            status,
        }
    }
}

/// First value of every header, keyed by lowercase name.
pub fn snapshot_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            let value = headers.get(name)?;
            Some((
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            ))
        })
        .collect()
}

type AuditWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Single-writer handle to the audit log.
///
/// Appends are serialized through an internal mutex so concurrent requests
/// never interleave partial lines.
pub struct AuditLogger {
    writer: Mutex<AuditWriter>,
    path: Option<PathBuf>,
}

impl AuditLogger {
    /// Opens (creating if needed) the log file in append mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        info!("Audit log at {}", path.display());

        Ok(Self {
            writer: Mutex::new(Box::new(file)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Wraps an arbitrary writer, e.g. an in-memory buffer.
    pub fn from_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            path: None,
        }
    }

    /// File backing this logger, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Best-effort append; failures only reach the diagnostic log.
    pub async fn append(&self, record: &AuditRecord) {
        if let Err(e) = self.try_append(record).await {
            error!(request_id = %record.request_id, "Failed to write audit record: {}", e);
        }
    }

    pub async fn try_append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| DeployError::LogWrite(format!("serialization failed: {}", e)))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| DeployError::LogWrite(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| DeployError::LogWrite(e.to_string()))
    }
}
