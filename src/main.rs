//! dataviz-gateway server entry point.
//!
//! Loads configuration, binds the gateway, and runs it until Ctrl-C or
//! SIGTERM, draining outstanding work before exit.

use anyhow::Context;

use dataviz_gateway::config::GatewayConfig;
use dataviz_gateway::server::{Server, shutdown_signal};
use dataviz_gateway::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().context("loading configuration")?;

    // Initialize tracing
    telemetry::init_tracing(config.log_format);
    tracing::info!(addr = %config.bind_addr(), "starting dataviz-gateway");

    // Bind listener and worker pool
    let server = Server::bind(&config)
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;

    // Wire the stop signal
    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        handle.shutdown();
    });

    server.run().await.context("serving")?;

    Ok(())
}
