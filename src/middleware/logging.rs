//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, status code, and latency.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{error, info, warn};

/// Logs at INFO for success, WARN for 4xx, ERROR for 5xx. Health checks and
/// WebSocket upgrades are not logged here.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path == "/health" || path == "/ws" {
        return next.run(request).await;
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if status >= 500 {
        error!(%method, %path, status, latency_ms, "Request failed (5xx)");
    } else if status >= 400 {
        warn!(%method, %path, status, latency_ms, "Request rejected (4xx)");
    } else {
        info!(%method, %path, status, latency_ms, "Request completed");
    }

    response
}
