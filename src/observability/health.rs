//! # Health Aggregation
//!
//! On-demand health checking of every registered backend. Nothing is cached and
//! nothing runs in the background: each call to [`HealthAggregator::check_all`]
//! probes all backends afresh and folds the answers into one report.
//!
//! Probes run concurrently, so a full check takes roughly one probe timeout in the
//! worst case no matter how many backends are registered.
//!
//! ## Rust Concepts Used
//! - `async_trait` for async methods in the `HealthProbe` trait
//! - `futures::future::join_all` to drive the probes together while keeping order
//! - `Arc<dyn HealthProbe>` so tests can swap in a fake probe

use async_trait::async_trait;
use axum::http::StatusCode;
use futures::future::join_all;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::core::config::HealthConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::discovery::{Backend, BackendRegistry};

/// Health of one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

/// Health of the gateway as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    /// Every backend answered its probe with 200
    Healthy,
    /// At least one backend did not
    Degraded,
}

/// Probe result for one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub name: String,
    pub status: ServiceStatus,
    pub url: String,
}

impl BackendHealth {
    pub fn healthy(backend: &Backend) -> Self {
        Self::with_status(backend, ServiceStatus::Healthy)
    }

    pub fn unhealthy(backend: &Backend) -> Self {
        Self::with_status(backend, ServiceStatus::Unhealthy)
    }

    fn with_status(backend: &Backend, status: ServiceStatus) -> Self {
        Self {
            name: backend.name.clone(),
            status,
            url: backend.display_url(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Combined report returned by `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateHealth {
    pub gateway: GatewayStatus,
    pub services: Vec<BackendHealth>,
}

impl AggregateHealth {
    pub fn from_results(services: Vec<BackendHealth>) -> Self {
        let gateway = if services.iter().all(BackendHealth::is_healthy) {
            GatewayStatus::Healthy
        } else {
            GatewayStatus::Degraded
        };

        Self { gateway, services }
    }

    /// 200 when healthy, 503 when degraded
    pub fn status_code(&self) -> StatusCode {
        match self.gateway {
            GatewayStatus::Healthy => StatusCode::OK,
            GatewayStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Health check probe trait for different kinds of backend checks
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe a backend; never fails, failures are reported as `Unhealthy`
    async fn check(&self, backend: &Backend) -> BackendHealth;

    /// Get the probe type name
    fn probe_type(&self) -> &'static str;
}

/// `GET <base_url><path>` with a bounded timeout; only 200 counts as healthy
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: HttpClient,
    path: String,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(config: &HealthConfig) -> GatewayResult<Self> {
        let client = HttpClient::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                GatewayError::internal(format!("Failed to create health check client: {}", e))
            })?;

        Ok(Self {
            client,
            path: config.path.clone(),
            timeout: config.timeout,
        })
    }

    /// Probe URL for a backend, joined onto its base path
    pub fn probe_url(&self, backend: &Backend) -> Url {
        let mut url = backend.base_url.clone();
        let joined = format!("{}{}", url.path().trim_end_matches('/'), self.path);
        url.set_path(&joined);
        url.set_query(None);
        url
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, backend: &Backend) -> BackendHealth {
        let url = self.probe_url(backend);
        let start_time = Instant::now();

        let result = timeout(self.timeout, self.client.get(url.clone()).send()).await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) if response.status() == StatusCode::OK => {
                debug!(service = %backend.name, duration_ms, "Health probe succeeded");
                BackendHealth::healthy(backend)
            }
            Ok(Ok(response)) => {
                warn!(
                    service = %backend.name,
                    probe_url = %url,
                    status = response.status().as_u16(),
                    duration_ms,
                    "Health probe returned unexpected status"
                );
                BackendHealth::unhealthy(backend)
            }
            Ok(Err(e)) => {
                warn!(
                    service = %backend.name,
                    probe_url = %url,
                    error = %e,
                    duration_ms,
                    "Health probe failed"
                );
                BackendHealth::unhealthy(backend)
            }
            Err(_) => {
                warn!(
                    service = %backend.name,
                    probe_url = %url,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Health probe timed out"
                );
                BackendHealth::unhealthy(backend)
            }
        }
    }

    fn probe_type(&self) -> &'static str {
        "http"
    }
}

/// Probes every registered backend and aggregates the answers
#[derive(Clone)]
pub struct HealthAggregator {
    registry: Arc<BackendRegistry>,
    probe: Arc<dyn HealthProbe>,
}

impl HealthAggregator {
    pub fn new(registry: Arc<BackendRegistry>, probe: Arc<dyn HealthProbe>) -> Self {
        Self { registry, probe }
    }

    /// Run one probe per backend concurrently
    ///
    /// Services appear in registry order regardless of which probe finished first.
    pub async fn check_all(&self) -> AggregateHealth {
        let probes = self
            .registry
            .iter()
            .map(|backend| self.probe.check(backend));
        let services = join_all(probes).await;

        let report = AggregateHealth::from_results(services);
        debug!(
            probe_type = self.probe.probe_type(),
            gateway = ?report.gateway,
            backends = report.services.len(),
            "Health check complete"
        );
        report
    }
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAggregator")
            .field("backends", &self.registry.names())
            .field("probe_type", &self.probe.probe_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Reports every backend in `down` as unhealthy, after an optional delay
    struct FakeProbe {
        down: HashSet<&'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl HealthProbe for FakeProbe {
        async fn check(&self, backend: &Backend) -> BackendHealth {
            tokio::time::sleep(self.delay).await;
            if self.down.contains(backend.name.as_str()) {
                BackendHealth::unhealthy(backend)
            } else {
                BackendHealth::healthy(backend)
            }
        }

        fn probe_type(&self) -> &'static str {
            "fake"
        }
    }

    fn registry() -> Arc<BackendRegistry> {
        Arc::new(BackendRegistry::from_backends([
            Backend::new("users", Url::parse("http://u:8081").unwrap()),
            Backend::new("products", Url::parse("http://p:8082").unwrap()),
        ]))
    }

    fn aggregator(down: &[&'static str], delay: Duration) -> HealthAggregator {
        let probe = FakeProbe {
            down: down.iter().copied().collect(),
            delay,
        };
        HealthAggregator::new(registry(), Arc::new(probe))
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let report = aggregator(&[], Duration::ZERO).check_all().await;

        assert_eq!(report.gateway, GatewayStatus::Healthy);
        assert_eq!(report.status_code(), StatusCode::OK);
        assert_eq!(report.services.len(), 2);
    }

    #[tokio::test]
    async fn test_one_unhealthy_degrades_gateway() {
        let report = aggregator(&["products"], Duration::ZERO).check_all().await;

        assert_eq!(report.gateway, GatewayStatus::Degraded);
        assert_eq!(report.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let products = report.services.iter().find(|s| s.name == "products").unwrap();
        assert_eq!(products.status, ServiceStatus::Unhealthy);
        assert_eq!(products.url, "http://p:8082");
    }

    #[tokio::test]
    async fn test_results_in_registry_order() {
        let report = aggregator(&[], Duration::ZERO).check_all().await;
        let names: Vec<_> = report.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["products", "users"]);
    }

    #[tokio::test]
    async fn test_probes_run_concurrently() {
        let started = Instant::now();
        aggregator(&[], Duration::from_millis(400)).check_all().await;
        assert!(started.elapsed() < Duration::from_millis(750));
    }

    #[test]
    fn test_report_serialization() {
        let backend = Backend::new("users", Url::parse("http://u:8081").unwrap());
        let report = AggregateHealth::from_results(vec![BackendHealth::unhealthy(&backend)]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "gateway": "degraded",
                "services": [{"name": "users", "status": "unhealthy", "url": "http://u:8081"}]
            })
        );
    }

    #[test]
    fn test_probe_url_joins_base_path() {
        let probe = HttpHealthProbe::new(&HealthConfig::default()).unwrap();

        let plain = Backend::new("users", Url::parse("http://u:8081").unwrap());
        assert_eq!(probe.probe_url(&plain).as_str(), "http://u:8081/health");

        let nested = Backend::new("legacy", Url::parse("http://l:9000/v1/").unwrap());
        assert_eq!(probe.probe_url(&nested).as_str(), "http://l:9000/v1/health");
    }
}
