use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id carried by the request, or a fresh uuid v4
///
/// The id is written back onto the request so the backend sees the same value.
pub fn ensure_request_id(request: &mut Request) -> HeaderValue {
    let existing = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .filter(|v| !v.is_empty())
        .cloned();

    match existing {
        Some(id) => id,
        None => {
            let generated = HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
            request.headers_mut().insert(REQUEST_ID_HEADER, generated.clone());
            generated
        }
    }
}

/// Tags every exchange with `x-request-id` and logs its outcome
pub async fn request_logging_middleware(mut request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let request_id = ensure_request_id(&mut request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER, request_id.clone());

    let status = response.status();
    let duration_ms = start_time.elapsed().as_millis() as u64;
    let request_id = request_id.to_str().unwrap_or_default();

    if status.is_server_error() {
        warn!(
            request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms,
            "Request failed"
        );
    } else {
        info!(
            request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms,
            "Request processed"
        );
    }

    response
}
