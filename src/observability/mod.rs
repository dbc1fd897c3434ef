// Logging configuration
pub mod config;

// Structured logging
pub mod logging;

// Backend health aggregation
pub mod health;

pub use config::{LogConfig, LogFormat, ObservabilityConfig};
pub use health::{AggregateHealth, HealthAggregator, HealthProbe, HttpHealthProbe};
pub use logging::init_logging;
