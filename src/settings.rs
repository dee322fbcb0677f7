//! Process settings read from the environment

use std::path::PathBuf;

use crate::error::{DeployError, Result};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3002";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_LOG_DIR: &str = "logs";
/// GitHub caps webhook payloads at 25MB
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind_address: String,
    pub config_path: PathBuf,
    pub log_dir: PathBuf,
    pub max_body_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup, falling back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let max_body_bytes = match lookup("MAX_BODY_BYTES") {
            Some(raw) => raw.trim().parse().map_err(|e| {
                DeployError::ConfigLoad(format!("Invalid MAX_BODY_BYTES '{}': {}", raw, e))
            })?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        Ok(Self {
            bind_address: lookup("BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            config_path: lookup("DEPLOY_CONFIG")
                .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
                .into(),
            log_dir: lookup("LOG_DIR")
                .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())
                .into(),
            max_body_bytes,
        })
    }
}
