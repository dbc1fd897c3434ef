//! # CORS Boundary Tests

use axum::http::{Method, StatusCode};
use axum_test::TestServer;
use service_gateway::core::config::BackendConfig;
use service_gateway::middleware::cors::CorsConfig;
use service_gateway::{GatewayConfig, GatewayServer};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(backend_url: String, cors: CorsConfig) -> TestServer {
    let mut config = GatewayConfig::default();
    config
        .backends
        .insert("users".to_string(), BackendConfig::new(backend_url));
    config.cors = cors;

    let server = GatewayServer::new(config).unwrap();
    TestServer::new(server.app()).unwrap()
}

fn assert_default_cors_headers(headers: &axum::http::HeaderMap) {
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(
        headers.get("access-control-allow-methods").unwrap(),
        "GET, POST, PUT, DELETE, OPTIONS"
    );
    assert_eq!(
        headers.get("access-control-allow-headers").unwrap(),
        "Content-Type, Authorization"
    );
}

/// Preflights are answered by the gateway and never reach a backend
#[tokio::test]
async fn test_options_short_circuits() {
    let users = MockServer::start().await;
    Mock::given(path("/42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&users)
        .await;

    let server = gateway(users.uri(), CorsConfig::default());

    let response = server.method(Method::OPTIONS, "/api/users/42").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.as_bytes().is_empty());
    assert_default_cors_headers(response.headers());
    assert!(response.headers().get("x-request-id").is_some());
}

/// Preflights succeed even for paths that would not route
#[tokio::test]
async fn test_options_on_unroutable_path() {
    let users = MockServer::start().await;
    let server = gateway(users.uri(), CorsConfig::default());

    for path in ["/health", "/api/orders/1", "/anything"] {
        let response = server.method(Method::OPTIONS, path).await;
        assert_eq!(response.status_code(), StatusCode::OK, "OPTIONS {path}");
    }
}

/// Proxied responses carry the gateway's CORS policy, overriding the backend's
#[tokio::test]
async fn test_headers_on_proxied_response() {
    let users = MockServer::start().await;
    Mock::given(path("/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("access-control-allow-origin", "https://internal.example"),
        )
        .mount(&users)
        .await;

    let server = gateway(users.uri(), CorsConfig::default());

    let response = server.get("/api/users/1").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_default_cors_headers(response.headers());
}

/// Error responses carry CORS headers too
#[tokio::test]
async fn test_headers_on_errors() {
    let users = MockServer::start().await;
    let server = gateway(users.uri(), CorsConfig::default());

    let response = server.get("/api/orders/1").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_default_cors_headers(response.headers());
}

/// Configured values and max-age are used verbatim
#[tokio::test]
async fn test_custom_policy() {
    let users = MockServer::start().await;
    let cors = CorsConfig {
        allowed_origins: vec!["https://app.example.com".to_string()],
        allowed_methods: vec!["GET".to_string(), "OPTIONS".to_string()],
        max_age: Some(600),
        ..CorsConfig::default()
    };
    let server = gateway(users.uri(), cors);

    let response = server.method(Method::OPTIONS, "/api/users").await;
    let headers = response.headers();
    assert_eq!(
        headers.get("access-control-allow-origin").unwrap(),
        "https://app.example.com"
    );
    assert_eq!(headers.get("access-control-allow-methods").unwrap(), "GET, OPTIONS");
    assert_eq!(headers.get("access-control-max-age").unwrap(), "600");
}

/// With the boundary disabled no CORS headers are added
#[tokio::test]
async fn test_disabled_boundary() {
    let users = MockServer::start().await;
    let cors = CorsConfig {
        enabled: false,
        ..CorsConfig::default()
    };
    let server = gateway(users.uri(), cors);

    let response = server.get("/api/orders/1").await;
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

/// CORS runs inside the request-id layer, so a preflight echoes the caller's id
#[tokio::test]
async fn test_preflight_keeps_caller_request_id() {
    let users = MockServer::start().await;
    let server = gateway(users.uri(), CorsConfig::default());

    let response = server
        .method(Method::OPTIONS, "/api/users/42")
        .add_header(
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::HeaderValue::from_static("preflight-7"),
        )
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_default_cors_headers(response.headers());
    assert_eq!(response.headers().get("x-request-id").unwrap(), "preflight-7");
}
