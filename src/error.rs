use axum::http::StatusCode;
use std::io;
use std::path::PathBuf;

/// Custom error type for deploy_hook operations
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    ConfigLoad(String),

    #[error("project name required")]
    MissingProjectName,

    #[error("error reading request body: {0}")]
    BodyRead(String),

    #[error("error parsing payload: {0}")]
    Decode(String),

    /// The project name is kept for diagnostics only, the message stays generic.
    #[error("invalid project")]
    ProjectNotFound(String),

    #[error("invalid signature")]
    SignatureMismatch,

    #[error("script does not exist: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("error making script executable: {0}")]
    ScriptPermissions(io::Error),

    #[error("failed to start script: {0}")]
    ScriptSpawn(io::Error),

    #[error("script execution failed: {status}\nOutput: {output}")]
    ScriptExecutionFailed { status: String, output: String },

    #[error("error writing audit record: {0}")]
    LogWrite(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DeployError {
    /// HTTP status returned to the webhook sender.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeployError::MissingProjectName
            | DeployError::Decode(_)
            | DeployError::ProjectNotFound(_) => StatusCode::BAD_REQUEST,
            DeployError::SignatureMismatch => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable reason. Never carries paths or script output.
    pub fn reason(&self) -> &'static str {
        match self {
            DeployError::MissingProjectName => "project_name_required",
            DeployError::BodyRead(_) => "body_read_failed",
            DeployError::Decode(_) => "invalid_payload",
            DeployError::ProjectNotFound(_) => "invalid_project",
            DeployError::SignatureMismatch => "invalid_signature",
            DeployError::ScriptNotFound(_)
            | DeployError::ScriptPermissions(_)
            | DeployError::ScriptSpawn(_)
            | DeployError::ScriptExecutionFailed { .. } => "script_failed",
            DeployError::ConfigLoad(_) | DeployError::LogWrite(_) | DeployError::Io(_) => {
                "internal_error"
            }
        }
    }

    /// Status text stored in the audit record for this failure.
    pub fn audit_status(&self) -> String {
        match self {
            DeployError::ScriptNotFound(_)
            | DeployError::ScriptPermissions(_)
            | DeployError::ScriptSpawn(_)
            | DeployError::ScriptExecutionFailed { .. } => {
                format!("error executing script: {}", self)
            }
            _ => self.to_string(),
        }
    }
}

/// Helper type for Results that use DeployError
pub type Result<T> = std::result::Result<T, DeployError>;
