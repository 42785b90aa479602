//! PageBot Relay - Main entry point.

use anyhow::Result;
use pagebot_common::config::Config;
use pagebot_common::logging::init_logging;
use pagebot_relay::start_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (file + environment overrides)
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("PageBot Relay v{}", env!("CARGO_PKG_VERSION"));

    // Start the HTTP server
    start_server(&config).await
}
