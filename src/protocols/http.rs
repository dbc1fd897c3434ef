//! # HTTP Forwarding
//!
//! Sends a routed request to its backend and relays the answer.
//!
//! The inbound body is read into memory up to `max_request_size` before it is
//! forwarded; anything larger is refused with 413 without contacting the backend.
//! The upstream response body is never buffered: it is handed to the client as a
//! byte stream as chunks arrive.
//!
//! `upstream_timeout` bounds the wait for the upstream response head, and the same
//! value bounds every individual read while the body is relayed. A long download
//! that keeps making progress is never cut off; a backend that goes quiet mid-body
//! is, and the client connection is aborted. If the client goes away, axum drops
//! the handler future and the outbound request is cancelled with it.
//!
//! ## Rust Concepts Used
//!
//! - `reqwest::Client` is an `Arc` internally; cloning it shares the connection pool
//! - `tokio::time::timeout` turns a slow future into an `Err(Elapsed)`

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use futures::TryStreamExt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::routing::ProxyTarget;

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Forwarding limits, taken from the server section of the gateway config
#[derive(Debug, Clone)]
pub struct HttpProxyConfig {
    /// Maximum wait for the upstream response head, and between body reads
    pub upstream_timeout: Duration,
    /// Maximum time to establish the TCP connection
    pub connect_timeout: Duration,
    /// Largest inbound body accepted, in bytes
    pub max_request_size: usize,
}

impl Default for HttpProxyConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(2),
            max_request_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

impl From<&GatewayConfig> for HttpProxyConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            upstream_timeout: config.server.timeouts.upstream_timeout,
            connect_timeout: config.server.timeouts.connect_timeout,
            max_request_size: config.server.max_request_size,
        }
    }
}

/// Reverse proxy over a shared `reqwest` connection pool
#[derive(Debug, Clone)]
pub struct HttpProxy {
    client: reqwest::Client,
    config: HttpProxyConfig,
}

impl HttpProxy {
    pub fn new(config: HttpProxyConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.upstream_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpProxyConfig {
        &self.config
    }

    /// Forward `request` to `target` and relay the upstream response
    ///
    /// Upstream status codes are passed through untouched, including 4xx and 5xx.
    /// Only failure to obtain a response at all maps to `ServiceUnavailable`.
    pub async fn forward(
        &self,
        request: Request,
        target: &ProxyTarget,
        client_addr: Option<SocketAddr>,
    ) -> GatewayResult<Response> {
        let (parts, body) = request.into_parts();
        let limit = self.config.max_request_size;

        if declared_length(&parts.headers).is_some_and(|len| len > limit) {
            return Err(GatewayError::PayloadTooLarge { limit });
        }

        let body = to_bytes(body, limit)
            .await
            .map_err(|_| GatewayError::PayloadTooLarge { limit })?;

        let url = target.upstream_url(parts.uri.query());
        let mut headers = parts.headers;
        let original_host = headers.get(header::HOST).cloned();
        sanitize_request_headers(&mut headers);
        append_forwarded_headers(&mut headers, client_addr, original_host);

        debug!(
            service = %target.service(),
            method = %parts.method,
            upstream_url = %url,
            body_bytes = body.len(),
            "Forwarding request"
        );

        let mut builder = self
            .client
            .request(parts.method.clone(), url.clone())
            .headers(headers);
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let started = Instant::now();
        let upstream = match timeout(self.config.upstream_timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(
                    service = %target.service(),
                    upstream_url = %url,
                    path = %target.rewritten_path,
                    error = %e,
                    "Upstream request failed"
                );
                return Err(GatewayError::service_unavailable(target.service(), e.to_string()));
            }
            Err(_) => {
                error!(
                    service = %target.service(),
                    upstream_url = %url,
                    path = %target.rewritten_path,
                    timeout_ms = self.config.upstream_timeout.as_millis() as u64,
                    "Upstream request timed out"
                );
                return Err(GatewayError::service_unavailable(
                    target.service(),
                    format!("no response within {:?}", self.config.upstream_timeout),
                ));
            }
        };

        debug!(
            service = %target.service(),
            status = upstream.status().as_u16(),
            upstream_ms = started.elapsed().as_millis() as u64,
            "Upstream responded"
        );

        Ok(relay_response(upstream, target.service()))
    }
}

/// Turn an upstream response into a streamed client response
fn relay_response(upstream: reqwest::Response, service: &str) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let service = service.to_string();
    let stream = upstream.bytes_stream().inspect_err(move |e| {
        warn!(service = %service, error = %e, "Upstream body stream failed");
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
}

/// Remove hop-by-hop headers, plus any header named in `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Prepare inbound headers for the upstream hop
///
/// `Host` and `Content-Length` are recomputed by the client for the new request.
pub fn sanitize_request_headers(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
}

fn append_forwarded_headers(
    headers: &mut HeaderMap,
    client_addr: Option<SocketAddr>,
    original_host: Option<HeaderValue>,
) {
    if let Some(addr) = client_addr {
        let ip = addr.ip().to_string();
        let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, ip),
            _ => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if let Some(host) = original_host {
        headers.insert(X_FORWARDED_HOST, host);
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_request_headers_removes_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert("proxy-authorization", HeaderValue::from_static("Basic abc"));
        headers.insert("x-private", HeaderValue::from_static("secret"));
        headers.insert("host", HeaderValue::from_static("gateway:8080"));
        headers.insert("content-length", HeaderValue::from_static("12"));
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));
        headers.insert("x-custom", HeaderValue::from_static("kept"));

        sanitize_request_headers(&mut headers);

        for removed in [
            "connection",
            "keep-alive",
            "transfer-encoding",
            "upgrade",
            "proxy-authorization",
            "x-private",
            "host",
            "content-length",
        ] {
            assert!(!headers.contains_key(removed), "{removed} should be stripped");
        }
        assert_eq!(headers.get("authorization").unwrap(), "Bearer t");
        assert_eq!(headers.get("x-custom").unwrap(), "kept");
    }

    #[test]
    fn test_strip_hop_by_hop_keeps_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", HeaderValue::from_static("5"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("trailer", HeaderValue::from_static("x-checksum"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.contains_key("content-length"));
        assert!(headers.contains_key("content-type"));
        assert!(!headers.contains_key("trailer"));
    }

    #[test]
    fn test_forwarded_headers_appended() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));
        let addr: SocketAddr = "192.168.1.7:51000".parse().unwrap();

        append_forwarded_headers(
            &mut headers,
            Some(addr),
            Some(HeaderValue::from_static("api.example.com")),
        );

        assert_eq!(headers.get(X_FORWARDED_FOR).unwrap(), "10.0.0.1, 192.168.1.7");
        assert_eq!(headers.get(X_FORWARDED_HOST).unwrap(), "api.example.com");
        assert_eq!(headers.get(X_FORWARDED_PROTO).unwrap(), "http");
    }

    #[test]
    fn test_forwarded_for_without_client_addr() {
        let mut headers = HeaderMap::new();
        append_forwarded_headers(&mut headers, None, None);

        assert!(!headers.contains_key(X_FORWARDED_FOR));
        assert!(!headers.contains_key(X_FORWARDED_HOST));
        assert_eq!(headers.get(X_FORWARDED_PROTO).unwrap(), "http");
    }

    #[test]
    fn test_declared_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), None);
        headers.insert("content-length", HeaderValue::from_static("1024"));
        assert_eq!(declared_length(&headers), Some(1024));
    }

    #[test]
    fn test_proxy_config_from_gateway_config() {
        let mut config = GatewayConfig::default();
        config.server.timeouts.upstream_timeout = Duration::from_millis(750);
        config.server.max_request_size = 1024;

        let proxy_config = HttpProxyConfig::from(&config);
        assert_eq!(proxy_config.upstream_timeout, Duration::from_millis(750));
        assert_eq!(proxy_config.max_request_size, 1024);
        assert!(HttpProxy::new(proxy_config).is_ok());
    }
}
