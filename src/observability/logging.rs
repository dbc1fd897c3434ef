//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. Output is JSON by default (one object
//! per line, suitable for container log collectors) or human-readable text.
//!
//! The filter comes from `RUST_LOG` when it is set, otherwise from the configured
//! level applied to this crate, with `tower_http` at the same level so the
//! request trace layer is visible.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::error::{GatewayError, GatewayResult};
use crate::observability::config::{LogConfig, LogFormat};

/// Build the filter directive used when `RUST_LOG` is absent
pub fn default_filter(config: &LogConfig) -> String {
    let level = config.level.to_lowercase();
    format!("service_gateway={level},tower_http={level}")
}

/// Initialize the global subscriber
///
/// Fails if a subscriber was already installed (e.g. called twice).
pub fn init_logging(config: &LogConfig) -> GatewayResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    result.map_err(|e| GatewayError::internal(format!("Failed to initialize logging: {}", e)))
}
