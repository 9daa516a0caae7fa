use anyhow::Result;
use tracing::info;

mod config;
mod server;
mod telemetry;

pub use config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load()
        .map_err(|e| anyhow::anyhow!("Failed to load server configuration: {}", e))?;

    telemetry::init_with_format(config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to init telemetry: {}", e))?;

    info!("Waddle notification relay starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("License: AGPL-3.0");

    config.log_config();

    server::start(config).await?;

    telemetry::shutdown();

    Ok(())
}
