//! # Service Gateway - Main Entry Point
//!
//! Loads configuration, installs logging and serves until SIGINT or SIGTERM.
//!
//! Configuration comes from the YAML file named by `GATEWAY_CONFIG_PATH` when it
//! is set, otherwise from environment variables (`USER_SERVICE_URL`,
//! `PRODUCT_SERVICE_URL`, `GATEWAY_BACKEND_<NAME>_URL`, `PORT`, ...). Any startup
//! error is logged and the process exits with status 1.

use tracing::{error, info};

use service_gateway::observability::config::LogConfig;
use service_gateway::observability::logging::init_logging;
use service_gateway::{GatewayConfig, GatewayResult, GatewayServer};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Failed to start gateway: {}", e);
        std::process::exit(1);
    }

    info!("Gateway shutdown complete");
}

async fn run() -> GatewayResult<()> {
    let config = match GatewayConfig::load().await {
        Ok(config) => config,
        Err(e) => {
            // Config failed before its logging section could be read
            let _ = init_logging(&LogConfig::default());
            return Err(e);
        }
    };

    init_logging(&config.observability.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting service gateway");
    log_backends(&config);

    let server = GatewayServer::new(config)?;
    server.start().await
}

fn log_backends(config: &GatewayConfig) {
    for (name, backend) in &config.backends {
        info!(
            service = %name,
            url = %backend.url,
            route = %format!("/{}/{}/", config.routing.prefix, name),
            "Backend registered"
        );
    }
    info!(
        health_timeout_ms = config.health.timeout.as_millis() as u64,
        upstream_timeout_ms = config.server.timeouts.upstream_timeout.as_millis() as u64,
        "Timeouts configured"
    );
}
