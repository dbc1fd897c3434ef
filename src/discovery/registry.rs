//! # Backend Registry
//!
//! Static mapping from logical service name to backend base URL. The registry is
//! built once from [`GatewayConfig`] and is read-only afterwards, so it is shared
//! between request tasks behind a plain `Arc` with no locking.
//!
//! Every URL is parsed while the registry is built. A malformed backend URL is a
//! startup error; request handling only ever sees valid `Url` values.

use std::collections::BTreeMap;
use url::Url;

use crate::core::config::{parse_backend_url, GatewayConfig};
use crate::core::error::{GatewayError, GatewayResult};

/// A single registered backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Logical service name used as the path token (`users`)
    pub name: String,
    /// Base URL requests are forwarded to
    pub base_url: Url,
}

impl Backend {
    pub fn new<S: Into<String>>(name: S, base_url: Url) -> Self {
        Self {
            name: name.into(),
            base_url,
        }
    }

    /// Base URL as configured, without the trailing slash `Url` adds to bare hosts
    pub fn display_url(&self) -> String {
        let url = self.base_url.as_str();
        if self.base_url.path() == "/" {
            url.trim_end_matches('/').to_string()
        } else {
            url.to_string()
        }
    }
}

/// Immutable name -> backend lookup table
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Backend>,
}

impl BackendRegistry {
    /// Build the registry from validated configuration
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let mut backends = BTreeMap::new();

        for (name, backend) in &config.backends {
            let url = parse_backend_url(&backend.url)
                .map_err(|reason| GatewayError::config(format!("Backend '{}' {}", name, reason)))?;
            backends.insert(name.clone(), Backend::new(name.clone(), url));
        }

        if backends.is_empty() {
            return Err(GatewayError::config("at least one backend must be configured"));
        }

        Ok(Self { backends })
    }

    /// Build a registry from already-parsed backends
    pub fn from_backends<I>(backends: I) -> Self
    where
        I: IntoIterator<Item = Backend>,
    {
        Self {
            backends: backends
                .into_iter()
                .map(|backend| (backend.name.clone(), backend))
                .collect(),
        }
    }

    /// Exact-match lookup of a logical service name
    pub fn resolve(&self, service: &str) -> GatewayResult<&Backend> {
        self.backends
            .get(service)
            .ok_or_else(|| GatewayError::service_not_found(service))
    }

    /// Backends in name order
    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
