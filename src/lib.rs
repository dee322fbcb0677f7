pub mod api;
pub mod audit;
pub mod deploy;
pub mod error;
pub mod logging;
pub mod settings;
pub mod utils;
pub mod webhook;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::audit::AuditLogger;
use crate::deploy::ScriptRunner;
use crate::error::{DeployError, Result};

/// A deployment target as configured on disk.
#[derive(Debug, Deserialize, Clone)]
pub struct Project {
    pub secret: String,
    pub path: PathBuf,
    /// Serializes deployments of this project
    #[serde(skip)]
    pub deploy_lock: Arc<Mutex<()>>,
}

impl Project {
    pub fn new(secret: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            secret: secret.into(),
            path: path.into(),
            deploy_lock: Arc::default(),
        }
    }
}

/// Read-only mapping from project name to its secret and path.
///
/// Loaded once at startup; changes on disk need a restart.
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    projects: HashMap<String, Project>,
}

impl ProjectRegistry {
    /// Builds a registry from an in-memory map, rejecting empty names.
    pub fn from_projects(projects: HashMap<String, Project>) -> Result<Self> {
        if projects.keys().any(|name| name.trim().is_empty()) {
            return Err(DeployError::ConfigLoad(
                "project names must not be empty".to_string(),
            ));
        }
        Ok(Self { projects })
    }

    /// Load and parse the project configuration file.
    ///
    /// `.toml` files are parsed as TOML, everything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            DeployError::ConfigLoad(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let parsed: std::result::Result<HashMap<String, Project>, String> = if is_toml {
            toml::from_str(&config_str).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&config_str).map_err(|e| e.to_string())
        };
        let projects = parsed.map_err(|e| {
            DeployError::ConfigLoad(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_projects(projects)
    }

    pub fn lookup(&self, name: &str) -> Result<&Project> {
        self.projects
            .get(name)
            .ok_or_else(|| DeployError::ProjectNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

pub struct AppState {
    pub registry: ProjectRegistry,
    pub audit: AuditLogger,
    pub runner: ScriptRunner,
    pub max_body_bytes: usize,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: ProjectRegistry, audit: AuditLogger, max_body_bytes: usize) -> Self {
        Self {
            registry,
            audit,
            runner: ScriptRunner::default(),
            max_body_bytes,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
