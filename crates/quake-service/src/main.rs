//! Disaster alert service binary.

use quake_service::{DisasterService, ServiceConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;
    let sender = DisasterService::default_sender(&config);
    info!(
        targets = config.targets.len(),
        sender = sender.name(),
        "Starting disaster service v{}",
        quake_service::version()
    );

    let service = DisasterService::new(config, sender, None)?;
    service.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    service.stop().await;

    let status = service.status().await;
    info!("Final stats: {}", serde_json::to_string(&status.stats)?);
    Ok(())
}
