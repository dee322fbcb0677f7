use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::Result;

const DIAGNOSTIC_LOG_PREFIX: &str = "deploy_hook";
const DEFAULT_FILTER: &str = "info";

/// Audit log file name inside the log directory
pub const AUDIT_LOG_FILE: &str = "log.log";

/// Rolling diagnostic log inside the log directory.
pub struct FileLogger {
    log_directory: PathBuf,
    rotation: Rotation,
}

impl FileLogger {
    pub fn new(log_directory: impl Into<PathBuf>) -> Self {
        Self {
            log_directory: log_directory.into(),
            rotation: Rotation::DAILY,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.log_directory.join(AUDIT_LOG_FILE)
    }

    pub fn setup_file_logging(&self) -> Result<(NonBlocking, WorkerGuard)> {
        // Ensure log directory exists
        std::fs::create_dir_all(&self.log_directory)?;

        let file_appender = RollingFileAppender::new(
            self.rotation.clone(),
            &self.log_directory,
            DIAGNOSTIC_LOG_PREFIX,
        );
        Ok(tracing_appender::non_blocking(file_appender))
    }
}

/// Console plus rolling-file diagnostics, filtered by `RUST_LOG`.
///
/// The returned guard flushes the file writer on drop; keep it alive in `main`.
pub fn setup_logging(file_logger: &FileLogger) -> Result<WorkerGuard> {
    let (file_writer, guard) = file_logger.setup_file_logging()?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer()) // Console output
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false), // Disable ANSI colors for file logs
        )
        .init();

    Ok(guard)
}
