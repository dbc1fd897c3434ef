//! # CORS Boundary
//!
//! Innermost layer of the gateway, directly around the route handlers and beneath
//! the request-id and trace layers. It stamps the configured
//! `Access-Control-Allow-*` headers on every response, including error responses
//! and the health report, and answers `OPTIONS` itself with an empty 200 so
//! preflights never reach a backend.
//!
//! Header values are validated once when the layer is built; a value that is not
//! a legal header is a configuration error.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// When false the layer is not installed at all
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    /// Preflight cache lifetime in seconds
    pub max_age: Option<u32>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            max_age: None,
        }
    }
}

/// Pre-rendered CORS header values
#[derive(Debug, Clone)]
pub struct CorsHeaders {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    max_age: Option<HeaderValue>,
}

impl CorsHeaders {
    pub fn from_config(config: &CorsConfig) -> GatewayResult<Self> {
        Ok(Self {
            allow_origin: join_header("allowed_origins", &config.allowed_origins)?,
            allow_methods: join_header("allowed_methods", &config.allowed_methods)?,
            allow_headers: join_header("allowed_headers", &config.allowed_headers)?,
            max_age: config.max_age.map(HeaderValue::from),
        })
    }

    /// Overwrite the CORS headers on `headers`
    ///
    /// Values relayed from a backend are replaced so the gateway policy wins.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        if let Some(max_age) = &self.max_age {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, max_age.clone());
        }
    }

    /// Empty 200 answer to a preflight
    pub fn preflight_response(&self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::OK;
        self.apply(response.headers_mut());
        response
    }
}

fn join_header(field: &str, values: &[String]) -> GatewayResult<HeaderValue> {
    HeaderValue::from_str(&values.join(", "))
        .map_err(|_| GatewayError::config(format!("cors.{} is not a valid header value", field)))
}

/// `axum::middleware::from_fn_with_state` handler
pub async fn cors_middleware(
    State(cors): State<Arc<CorsHeaders>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return cors.preflight_response();
    }

    let mut response = next.run(request).await;
    cors.apply(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_headers() {
        let cors = CorsHeaders::from_config(&CorsConfig::default()).unwrap();
        let mut headers = HeaderMap::new();
        cors.apply(&mut headers);

        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(
            headers.get("access-control-allow-methods").unwrap(),
            "GET, POST, PUT, DELETE, OPTIONS"
        );
        assert_eq!(
            headers.get("access-control-allow-headers").unwrap(),
            "Content-Type, Authorization"
        );
        assert!(headers.get("access-control-max-age").is_none());
    }

    #[test]
    fn test_apply_overrides_backend_values() {
        let cors = CorsHeaders::from_config(&CorsConfig::default()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://backend.internal"),
        );

        cors.apply(&mut headers);
        assert_eq!(headers.get_all("access-control-allow-origin").iter().count(), 1);
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    }

    #[test]
    fn test_preflight_response() {
        let config = CorsConfig {
            max_age: Some(600),
            ..CorsConfig::default()
        };
        let response = CorsHeaders::from_config(&config).unwrap().preflight_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("access-control-max-age").unwrap(), "600");
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        let config = CorsConfig {
            allowed_origins: vec!["https://a.example\n".to_string()],
            ..CorsConfig::default()
        };
        let err = CorsHeaders::from_config(&config).unwrap_err();
        assert!(matches!(err, GatewayError::Configuration { .. }));
    }

    #[test]
    fn test_config_from_yaml() {
        let config: CorsConfig = serde_yaml::from_str(
            "allowed_origins: [\"https://app.example.com\"]\nmax_age: 3600\n",
        )
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.allowed_origins, vec!["https://app.example.com"]);
        assert_eq!(config.allowed_headers.len(), 2);
        assert_eq!(config.max_age, Some(3600));
    }
}
