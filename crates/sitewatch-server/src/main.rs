//! Sitewatch server binary

use sitewatch_server::{Config, ServerConfig, SitewatchServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration first: it carries the logging settings
    let (config, load_error) = match Config::load() {
        Ok(cfg) => (cfg, None),
        Err(e) => (Config::default(), Some(e)),
    };

    let level = config.logging.level.as_deref().unwrap_or("info");
    match config.logging.format.as_deref() {
        Some("json") => common::logging::init_json(level),
        _ => common::logging::init(level),
    }

    tracing::info!("Sitewatch server starting");

    let server_config = match load_error {
        None => {
            tracing::info!("Configuration loaded successfully");
            config.to_server_config()
        }
        Some(e) => {
            tracing::warn!(error = %e, "Configuration error, using default configuration");
            ServerConfig::default()
        }
    };

    let directory = config.to_directory();
    if directory.is_empty() {
        tracing::warn!("No resources configured");
    }

    SitewatchServer::new(server_config, directory).run().await
}
