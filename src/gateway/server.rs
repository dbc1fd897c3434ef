//! # HTTP Server Module
//!
//! Wires the gateway together: registry, router, forwarder and health aggregator
//! behind one axum application.
//!
//! ## Route Table
//!
//! - `/health` (any method) runs the health aggregation
//! - everything else falls through to the proxy handler, which answers
//!   `Invalid path` for anything outside `/<prefix>/<service>/...`
//!
//! ## Layer Order (outermost first)
//!
//! 1. request id + access log, so even preflight answers carry `x-request-id`
//! 2. `tower_http` trace spans
//! 3. CORS boundary, which answers `OPTIONS` without calling a handler
//!
//! ## Rust Concepts Used
//!
//! - `Arc<T>` for sharing immutable server state across request tasks
//! - `axum::serve` with connect info so the proxy can set `X-Forwarded-For`
//! - `tokio::select!` to bound graceful shutdown by a drain timeout

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Json, Router as AxumRouter,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::discovery::BackendRegistry;
use crate::middleware::cors::{cors_middleware, CorsHeaders};
use crate::middleware::request_logging::request_logging_middleware;
use crate::observability::health::{HealthAggregator, HttpHealthProbe};
use crate::protocols::http::{HttpProxy, HttpProxyConfig};
use crate::routing::ProxyRouter;

/// Path of the gateway's own health endpoint
pub const HEALTH_ROUTE: &str = "/health";

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub router: Arc<ProxyRouter>,
    pub proxy: Arc<HttpProxy>,
    pub health: Arc<HealthAggregator>,
}

impl ServerState {
    /// Build every request-path component from validated configuration
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let registry = Arc::new(BackendRegistry::from_config(config)?);
        let router = ProxyRouter::new(config.routing.prefix.clone(), registry.clone());
        let proxy = HttpProxy::new(HttpProxyConfig::from(config))?;
        let probe = HttpHealthProbe::new(&config.health)?;
        let health = HealthAggregator::new(registry, Arc::new(probe));

        Ok(Self {
            router: Arc::new(router),
            proxy: Arc::new(proxy),
            health: Arc::new(health),
        })
    }
}

/// The gateway HTTP server
pub struct GatewayServer {
    config: GatewayConfig,
    state: ServerState,
    app: AxumRouter,
}

impl GatewayServer {
    /// Validate `config` and build the application
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;

        let state = ServerState::from_config(&config)?;
        let app = Self::build_app(&config, state.clone())?;

        Ok(Self { config, state, app })
    }

    fn build_app(config: &GatewayConfig, state: ServerState) -> GatewayResult<AxumRouter> {
        let mut app = AxumRouter::new()
            .route(HEALTH_ROUTE, any(health_handler))
            .fallback(proxy_handler)
            .with_state(state);

        if config.cors.enabled {
            let cors = Arc::new(CorsHeaders::from_config(&config.cors)?);
            app = app.layer(middleware::from_fn_with_state(cors, cors_middleware));
        } else {
            info!("CORS boundary disabled");
        }

        Ok(app.layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(TraceLayer::new_for_http()),
        ))
    }

    /// The assembled application, for serving or in-process testing
    pub fn app(&self) -> AxumRouter {
        self.app.clone()
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Address the listener binds to, as `host:port`
    pub fn bind_addr(&self) -> String {
        format!(
            "{}:{}",
            self.config.server.bind_address, self.config.server.http_port
        )
    }

    /// Bind the configured address and serve until SIGINT or SIGTERM
    pub async fn start(self) -> GatewayResult<()> {
        let bind_addr = self.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind gateway server to {}: {}", bind_addr, e))
        })?;

        info!(
            address = %bind_addr,
            prefix = %self.state.router.prefix(),
            backends = self.state.router.registry().len(),
            "Gateway HTTP server listening"
        );

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` completes
    ///
    /// In-flight requests get `shutdown_timeout` to finish after the signal.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> GatewayResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let drain_timeout = self.config.server.timeouts.shutdown_timeout;
        let signalled = Arc::new(Notify::new());
        let notifier = signalled.clone();

        let server = axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            notifier.notify_one();
        })
        .into_future();

        tokio::select! {
            result = server => {
                result.map_err(|e| GatewayError::internal(format!("Gateway server error: {}", e)))?;
                info!("Gateway server stopped");
            }
            _ = drain_deadline(signalled, drain_timeout) => {
                warn!(
                    timeout_ms = drain_timeout.as_millis() as u64,
                    "Shutdown timeout reached, abandoning in-flight requests"
                );
            }
        }

        Ok(())
    }
}

async fn drain_deadline(signalled: Arc<Notify>, drain_timeout: Duration) {
    signalled.notified().await;
    tokio::time::sleep(drain_timeout).await;
}

/// `GET /health`: probe every backend and report
async fn health_handler(State(state): State<ServerState>) -> Response {
    let report = state.health.check_all().await;
    (report.status_code(), Json(report)).into_response()
}

/// Catch-all handler: route, then forward
async fn proxy_handler(State(state): State<ServerState>, request: Request) -> Response {
    let path = request.uri().path().to_string();

    let target = match state.router.route(&path) {
        Ok(target) => target,
        Err(e) => {
            warn!(
                method = %request.method(),
                path = %path,
                error = %e,
                "Request could not be routed"
            );
            return e.into_response();
        }
    };

    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    match state.proxy.forward(request, &target, client_addr).await {
        Ok(response) => response,
        Err(e) => {
            if matches!(e, GatewayError::PayloadTooLarge { .. }) {
                warn!(service = %target.service(), path = %path, error = %e, "Request rejected");
            }
            e.into_response()
        }
    }
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
