use anyhow::{Context, Result};
use desk_core::init_tracing;
use tracing::{info, instrument};

use super::components::build_components;
use super::config::BotConfig;
use super::webhook;

/// Main entry: validate config, init logging, build components, spawn the job worker, then
/// serve the webhook until the process is stopped.
#[instrument(skip(config))]
pub async fn run_service(config: BotConfig) -> Result<()> {
    config.validate()?;
    init_tracing(config.log_file())?;

    info!(
        database_url = %config.database_url(),
        listen_addr = %config.listen_addr(),
        "Initializing support desk"
    );

    let components = build_components(&config).await?;
    let app = webhook::router(components.webhook_state());
    let worker = components.worker.spawn();

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr()))?;
    info!(addr = %config.listen_addr(), "Webhook server listening");

    axum::serve(listener, app)
        .await
        .context("Webhook server stopped")?;

    worker.abort();
    Ok(())
}
