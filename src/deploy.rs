//! Deployment script execution

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::{error, info};

use crate::error::{DeployError, Result};

/// Script location relative to the project directory
pub const DEFAULT_SCRIPT_PATH: &str = "scripts/cd.sh";

/// Maximum size for captured output before truncation (1MB)
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

const SHELL: &str = "/bin/sh";
const OWNER_EXEC: u32 = 0o100;
const EXEC_BITS: u32 = 0o111;

/// Result of a successful script run
#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    pub exit_status: std::process::ExitStatus,
    /// Interleaved stdout and stderr
    pub output: String,
    pub output_truncated: bool,
    pub permissions_repaired: bool,
}

/// Runs a project's deployment script through the shell.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    script_path: PathBuf,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new(DEFAULT_SCRIPT_PATH)
    }
}

impl ScriptRunner {
    pub fn new(script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
        }
    }

    pub fn script_for(&self, project_path: &Path) -> PathBuf {
        project_path.join(&self.script_path)
    }

    /// Resolves, repairs and runs the script with `project_path` as cwd.
    /// Blocks until the script exits; a non-zero exit is an error carrying the output.
    pub async fn run(&self, project_path: &Path) -> Result<DeploymentOutcome> {
        let script = self.script_for(project_path);
        if !fs::try_exists(&script).await.unwrap_or(false) {
            error!("Deployment script not found: {}", script.display());
            return Err(DeployError::ScriptNotFound(script));
        }

        let permissions_repaired = ensure_executable(&script).await?;

        info!("Running (cwd = '{}'): {}", project_path.display(), script.display());
        // Let the shell merge stderr into stdout so the output keeps its ordering
        let result = Command::new(SHELL)
            .arg("-c")
            .arg(format!("exec {} \"$0\" 2>&1", SHELL))
            .arg(&script)
            .current_dir(project_path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                error!("Script failed to start: {}", e);
                DeployError::ScriptSpawn(e)
            })?;

        let (output, output_truncated) = truncate_output(&result.stdout);
        if !result.status.success() {
            error!("Script {} failed with {}", script.display(), result.status);
            return Err(DeployError::ScriptExecutionFailed {
                status: result.status.to_string(),
                output,
            });
        }

        info!("Script executed successfully: {}", script.display());
        Ok(DeploymentOutcome {
            exit_status: result.status,
            output,
            output_truncated,
            permissions_repaired,
        })
    }
}

/// Adds the execute bits for owner, group and other when the owner cannot
/// execute `script`. Returns whether the mode was changed.
pub async fn ensure_executable(script: &Path) -> Result<bool> {
    let metadata = fs::metadata(script)
        .await
        .map_err(DeployError::ScriptPermissions)?;
    let mut permissions = metadata.permissions();
    let mode = permissions.mode();

    if mode & OWNER_EXEC != 0 {
        return Ok(false);
    }

    permissions.set_mode(mode | EXEC_BITS);
    fs::set_permissions(script, permissions)
        .await
        .map_err(DeployError::ScriptPermissions)?;
    info!("Made script executable: {}", script.display());
    Ok(true)
}

fn truncate_output(raw: &[u8]) -> (String, bool) {
    if raw.len() <= MAX_OUTPUT_SIZE {
        return (String::from_utf8_lossy(raw).into_owned(), false);
    }
    let mut output = String::from_utf8_lossy(&raw[..MAX_OUTPUT_SIZE]).into_owned();
    output.push_str("\n... (output truncated)");
    (output, true)
}
