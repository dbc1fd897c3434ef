//! # Router Module
//!
//! Decides which backend an inbound request goes to and what path the backend sees.
//!
//! Paths have the shape `/<prefix>/<service>/<rest...>`. Matching is done on explicit
//! segments rather than by indexing into a split vector, so the edge cases are
//! spelled out:
//!
//! | inbound path            | result                                |
//! |-------------------------|---------------------------------------|
//! | `/api`                  | invalid path                          |
//! | `/api/`                 | invalid path (empty service token)    |
//! | `/api//42`              | invalid path (empty service token)    |
//! | `/api/users`            | `users`, backend path `/`             |
//! | `/api/users/`           | `users`, backend path `/`             |
//! | `/api/users/42`         | `users`, backend path `/42`           |
//! | `/api/users/42/orders/` | `users`, backend path `/42/orders/`   |
//! | `/api/users/../admin`   | invalid path (dot segment)            |
//! | `/api/users/%2e%2e/x`   | invalid path (encoded dot segment)    |
//!
//! The backend path is joined onto the backend base URL path, so a backend
//! registered as `http://u:8081/users` receives `/users/42`. URL normalization
//! would resolve `.` and `..` against that base path, so dot segments are refused
//! outright rather than forwarded.

use std::sync::Arc;
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};
use crate::discovery::{Backend, BackendRegistry};

/// Result of matching a request path against the gateway prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePath<'a> {
    /// Logical service token, never empty
    pub service: &'a str,
    /// Everything after the token; empty or starting with `/`
    pub remainder: &'a str,
}

impl<'a> RoutePath<'a> {
    /// Match `path` against `/<prefix>/<service>...`
    ///
    /// `prefix` is a single segment without slashes.
    pub fn parse(prefix: &str, path: &'a str) -> GatewayResult<Self> {
        let rest = path
            .strip_prefix('/')
            .and_then(|p| p.strip_prefix(prefix))
            .and_then(|p| p.strip_prefix('/'))
            .ok_or_else(|| GatewayError::invalid_path(path))?;

        let (service, remainder) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        let dotted = is_dot_segment(service) || remainder.split('/').any(is_dot_segment);
        if service.is_empty() || dotted {
            return Err(GatewayError::invalid_path(path));
        }

        Ok(Self { service, remainder })
    }

    /// Path the backend receives, relative to its own root
    pub fn rewritten_path(&self) -> &'a str {
        if self.remainder.is_empty() {
            "/"
        } else {
            self.remainder
        }
    }
}

/// `.` or `..`, literal or percent-encoded
fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// A resolved routing decision for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    /// Backend chosen for the request
    pub backend: Backend,
    /// Path the backend receives, relative to its root
    pub rewritten_path: String,
    /// Raw remainder used when joining onto a base URL with a path
    remainder: String,
}

impl ProxyTarget {
    pub fn service(&self) -> &str {
        &self.backend.name
    }

    /// Full upstream URL for this request, carrying the query string unchanged
    pub fn upstream_url(&self, query: Option<&str>) -> Url {
        let mut url = self.backend.base_url.clone();

        let base_path = url.path().trim_end_matches('/');
        let joined = format!("{}{}", base_path, self.remainder);
        if joined.is_empty() {
            url.set_path("/");
        } else {
            url.set_path(&joined);
        }

        url.set_query(query);
        url
    }
}

/// Path-prefix router over an immutable backend registry
#[derive(Debug, Clone)]
pub struct ProxyRouter {
    prefix: String,
    registry: Arc<BackendRegistry>,
}

impl ProxyRouter {
    pub fn new<S: Into<String>>(prefix: S, registry: Arc<BackendRegistry>) -> Self {
        Self {
            prefix: prefix.into(),
            registry,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Resolve an inbound path to its backend and rewritten path
    pub fn route(&self, path: &str) -> GatewayResult<ProxyTarget> {
        let matched = RoutePath::parse(&self.prefix, path)?;
        let backend = self.registry.resolve(matched.service)?;

        Ok(ProxyTarget {
            backend: backend.clone(),
            rewritten_path: matched.rewritten_path().to_string(),
            remainder: matched.remainder.to_string(),
        })
    }
}
