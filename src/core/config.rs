//! # Configuration Module
//!
//! This module holds the gateway configuration and its loading rules.
//!
//! ## Key Features
//! - YAML configuration parsing with serde
//! - Environment variable overrides (`USER_SERVICE_URL`, `GATEWAY_SERVER_HTTP_PORT`, ...)
//! - An optional `.env` file in the working directory; real environment variables win
//! - Validation that reports every problem at once and fails startup
//!
//! Configuration is read once. Nothing in the gateway mutates it after startup;
//! the backend registry, proxy client and health aggregator are all built from an
//! immutable `GatewayConfig`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};
use crate::middleware::cors::CorsConfig;
use crate::observability::config::{LogFormat, ObservabilityConfig};

/// Environment variable naming an optional YAML configuration file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG_PATH";

/// Optional dotenv file read from the working directory
pub const DOTENV_FILE: &str = ".env";

/// Well-known backend variables and the logical service names they register
pub const WELL_KNOWN_BACKEND_ENV: [(&str, &str); 2] = [
    ("USER_SERVICE_URL", "users"),
    ("PRODUCT_SERVICE_URL", "products"),
];

const BACKEND_ENV_PREFIX: &str = "GATEWAY_BACKEND_";
const BACKEND_ENV_SUFFIX: &str = "_URL";

/// Main gateway configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener, body limit and timeouts
    pub server: ServerConfig,

    /// Path prefix handling
    pub routing: RoutingConfig,

    /// Backend health probing
    pub health: HealthConfig,

    /// Logical service name -> backend definition
    pub backends: BTreeMap<String, BackendConfig>,

    /// Cross-origin headers
    pub cors: CorsConfig,

    /// Logging settings
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,

    /// HTTP port
    pub http_port: u16,

    /// Maximum request body size forwarded to a backend
    pub max_request_size: usize,

    /// Server timeouts
    pub timeouts: TimeoutConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            max_request_size: 16 * 1024 * 1024, // 16MB
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for a backend to send its response head
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,

    /// TCP connect timeout for backend connections
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Grace period for in-flight requests on shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Reserved first path segment, without slashes (`api` matches `/api/...`)
    pub prefix: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            prefix: "api".to_string(),
        }
    }
}

/// Health probe configuration shared by all backends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Path probed on every backend
    pub path: String,

    /// Per-probe timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

/// A single backend service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL, e.g. `http://user-service:8081`
    pub url: String,
}

impl BackendConfig {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self { url: url.into() }
    }
}

impl GatewayConfig {
    /// Load configuration the way the binary does
    ///
    /// Uses the YAML file named by `GATEWAY_CONFIG_PATH` when set, otherwise builds
    /// the configuration purely from the environment. Either way `.env` is merged
    /// into the environment first.
    pub async fn load() -> GatewayResult<Self> {
        let vars = process_env()?;
        match vars.get(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => Self::read_file(Path::new(path), &vars).await,
            _ => Self::from_vars(&vars),
        }
    }

    /// Load configuration from a YAML file, then apply environment overrides
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        Self::read_file(path.as_ref(), &process_env()?).await
    }

    async fn read_file(path: &Path, vars: &HashMap<String, String>) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml_str(&content, vars)
    }

    /// Parse YAML content and apply overrides from `vars`
    pub fn from_yaml_str(content: &str, vars: &HashMap<String, String>) -> GatewayResult<Self> {
        let mut config: GatewayConfig = serde_yaml::from_str(content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides(vars)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the process environment
    pub fn from_env() -> GatewayResult<Self> {
        Self::from_vars(&process_env()?)
    }

    /// Build configuration from defaults and a set of environment variables
    ///
    /// The `users` and `products` backends are required in this mode.
    pub fn from_vars(vars: &HashMap<String, String>) -> GatewayResult<Self> {
        let mut config = GatewayConfig::default();
        config.apply_env_overrides(vars)?;

        let missing: Vec<String> = WELL_KNOWN_BACKEND_ENV
            .iter()
            .filter(|(_, name)| !config.backends.contains_key(*name))
            .map(|(var, name)| format!("{} is not set (backend '{}')", var, name))
            .collect();
        if !missing.is_empty() {
            return Err(GatewayError::config(format!(
                "Configuration validation failed:\n{}",
                missing.join("\n")
            )));
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Backend variables that are present but empty are kept as empty URLs so
    /// that validation rejects them instead of silently dropping the backend.
    pub fn apply_env_overrides(&mut self, vars: &HashMap<String, String>) -> GatewayResult<()> {
        // PORT is the conventional container variable; the namespaced one wins
        for var in ["PORT", "GATEWAY_SERVER_HTTP_PORT"] {
            if let Some(port) = vars.get(var) {
                self.server.http_port = port
                    .parse()
                    .map_err(|e| GatewayError::config(format!("Invalid {}: {}", var, e)))?;
            }
        }

        if let Some(addr) = vars.get("GATEWAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr.clone();
        }

        if let Some(size) = vars.get("GATEWAY_SERVER_MAX_REQUEST_SIZE") {
            self.server.max_request_size = size.parse().map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_SERVER_MAX_REQUEST_SIZE: {}", e))
            })?;
        }

        if let Some(timeout) = vars.get("GATEWAY_SERVER_UPSTREAM_TIMEOUT") {
            self.server.timeouts.upstream_timeout =
                parse_duration_var("GATEWAY_SERVER_UPSTREAM_TIMEOUT", timeout)?;
        }

        if let Some(timeout) = vars.get("GATEWAY_SERVER_CONNECT_TIMEOUT") {
            self.server.timeouts.connect_timeout =
                parse_duration_var("GATEWAY_SERVER_CONNECT_TIMEOUT", timeout)?;
        }

        if let Some(timeout) = vars.get("GATEWAY_HEALTH_TIMEOUT") {
            self.health.timeout = parse_duration_var("GATEWAY_HEALTH_TIMEOUT", timeout)?;
        }

        if let Some(prefix) = vars.get("GATEWAY_ROUTING_PREFIX") {
            self.routing.prefix = prefix.trim_matches('/').to_string();
        }

        if let Some(level) = vars.get("GATEWAY_LOG_LEVEL") {
            self.observability.logging.level = level.clone();
        }

        if let Some(format) = vars.get("GATEWAY_LOG_FORMAT") {
            self.observability.logging.format = format.parse::<LogFormat>()?;
        }

        for (var, name) in WELL_KNOWN_BACKEND_ENV {
            if let Some(url) = vars.get(var) {
                self.backends
                    .insert(name.to_string(), BackendConfig::new(url.trim()));
            }
        }

        // GATEWAY_BACKEND_<NAME>_URL, applied last so it can override the aliases
        let mut generic: Vec<(String, &String)> = vars
            .iter()
            .filter_map(|(key, value)| backend_name_from_var(key).map(|name| (name, value)))
            .collect();
        generic.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, url) in generic {
            self.backends.insert(name, BackendConfig::new(url.trim()));
        }

        Ok(())
    }

    /// Validation with detailed error messages
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if self.server.max_request_size == 0 {
            errors.push("max_request_size must be greater than 0".to_string());
        }

        if self.server.timeouts.upstream_timeout.is_zero() {
            errors.push("upstream_timeout must be greater than 0".to_string());
        }

        if self.server.timeouts.connect_timeout.is_zero() {
            errors.push("connect_timeout must be greater than 0".to_string());
        }

        if self.routing.prefix.is_empty() {
            errors.push("routing prefix cannot be empty".to_string());
        } else if self.routing.prefix.contains('/') {
            errors.push(format!(
                "routing prefix must be a single path segment, got '{}'",
                self.routing.prefix
            ));
        }

        if !self.health.path.starts_with('/') {
            errors.push(format!(
                "health path must start with '/', got '{}'",
                self.health.path
            ));
        }

        if self.health.timeout.is_zero() {
            errors.push("health timeout must be greater than 0".to_string());
        }

        if self.backends.is_empty() {
            errors.push("at least one backend must be configured".to_string());
        }

        for (name, backend) in &self.backends {
            if name.is_empty() || name.contains('/') {
                errors.push(format!("Backend name '{}' is not a valid path segment", name));
            }
            if let Err(reason) = validate_backend_url(&backend.url) {
                errors.push(format!("Backend '{}' {}", name, reason));
            }
        }

        match self.observability.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!(
                "Invalid log level: {}",
                self.observability.logging.level
            )),
        }

        if !errors.is_empty() {
            return Err(GatewayError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}

/// Parse a backend base URL, enforcing the rules the registry relies on
pub fn parse_backend_url(raw: &str) -> Result<Url, String> {
    if raw.trim().is_empty() {
        return Err("has an empty url".to_string());
    }

    let url = Url::parse(raw).map_err(|e| format!("has an invalid url '{}': {}", raw, e))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("url '{}' must use http or https", raw));
    }
    if url.host_str().is_none() {
        return Err(format!("url '{}' has no host", raw));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(format!("url '{}' must not carry a query or fragment", raw));
    }

    Ok(url)
}

fn validate_backend_url(raw: &str) -> Result<(), String> {
    parse_backend_url(raw).map(|_| ())
}

fn parse_duration_var(var: &str, value: &str) -> GatewayResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| GatewayError::config(format!("Invalid {}: {}", var, e)))
}

/// `GATEWAY_BACKEND_ORDER_HISTORY_URL` -> `order-history`
fn backend_name_from_var(key: &str) -> Option<String> {
    let name = key
        .strip_prefix(BACKEND_ENV_PREFIX)?
        .strip_suffix(BACKEND_ENV_SUFFIX)?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase().replace('_', "-"))
}

fn process_env() -> GatewayResult<HashMap<String, String>> {
    environment_with_dotenv(Path::new(DOTENV_FILE), std::env::vars())
}

/// Merge the dotenv file at `path` under `vars`
///
/// A missing file is not an error. Keys present in `vars` keep their value.
pub fn environment_with_dotenv<I>(
    path: &Path,
    vars: I,
) -> GatewayResult<HashMap<String, String>>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut merged: HashMap<String, String> = match std::fs::read_to_string(path) {
        Ok(contents) => parse_dotenv(&contents).into_iter().collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
        Err(e) => {
            return Err(GatewayError::config(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };
    merged.extend(vars);
    Ok(merged)
}

/// `KEY=value` lines; blank lines, `#` comments and an `export ` prefix are allowed
pub fn parse_dotenv(contents: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line).trim();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        if value.is_empty() {
            continue;
        }

        out.insert(key.to_string(), value.to_string());
    }

    out
}
