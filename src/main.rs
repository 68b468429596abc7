use anyhow::Context;
use ratelimiter::{config::AppConfig, init_server, init_tracing};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/ratelimiter.yaml".to_string());

    // Load configuration; the file is optional, RATELIMITER__* variables override it
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    init_server(config).await.context("Rate limiter error")?;

    Ok(())
}
