//! # Service Gateway Library
//!
//! A thin HTTP gateway in front of a set of CRUD microservices. Requests under
//! `/<prefix>/<service>/...` are forwarded to the backend registered for
//! `<service>` with the prefix and service token stripped, and `/health` reports
//! the combined health of every backend.
//!
//! ## Module Map
//!
//! - `core`: configuration loading and the error type shared by every module
//! - `discovery`: the immutable backend registry (name -> base URL)
//! - `routing`: path matching and rewriting
//! - `protocols`: the HTTP forwarder built on `reqwest`
//! - `observability`: logging setup and backend health aggregation
//! - `middleware`: the CORS boundary and the request-id access log
//! - `gateway`: the axum server that ties the pieces together
//!
//! ## Rust Concepts Used
//!
//! - `pub use` re-exports create a short public API at the crate root
//! - Shared state is immutable after startup and passed around in `Arc`s,
//!   so request tasks never take a lock

/// Configuration and error types
pub mod core;

/// Backend registry
pub mod discovery;

/// HTTP server and handlers
pub mod gateway;

/// Cross-cutting request/response layers
pub mod middleware;

/// Structured logging and health aggregation
pub mod observability;

/// Upstream forwarding
pub mod protocols;

/// Path-prefix routing
pub mod routing;

pub use core::config::GatewayConfig;
pub use core::error::{GatewayError, GatewayResult};
pub use discovery::{Backend, BackendRegistry};
pub use gateway::server::GatewayServer;
pub use routing::{ProxyRouter, ProxyTarget, RoutePath};
