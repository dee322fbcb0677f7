use deploy_hook::audit::AuditLogger;
use deploy_hook::error::DeployError;
use deploy_hook::logging::{FileLogger, setup_logging};
use deploy_hook::settings::Settings;
use deploy_hook::{AppState, ProjectRegistry, api};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    if let Err(e) = run().await {
        eprintln!("Startup error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), DeployError> {
    let settings = Settings::from_env()?;

    // Refuse to serve with a missing or partial configuration
    let registry = ProjectRegistry::load(&settings.config_path)?;

    let file_logger = FileLogger::new(&settings.log_dir);
    let _guard = setup_logging(&file_logger)?;
    info!(
        "Loaded {} project(s) from {:?}",
        registry.len(),
        settings.config_path
    );

    let audit = AuditLogger::open(file_logger.audit_log_path()).await?;
    let state = Arc::new(AppState::new(registry, audit, settings.max_body_bytes));
    let app = api::router(state);

    info!("Listening on {}", settings.bind_address);
    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
