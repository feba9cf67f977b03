//! API middleware

use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::{info, warn};

/// Logs every mutating request with its outcome
///
/// Calculation saves and billing link changes alter stored history, so
/// each one leaves an `audit` event with status and duration.
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    if method.is_safe() {
        return response;
    }

    let status = response.status();
    if status.is_success() {
        info!(target: "audit", %method, %uri, %request_id, status = status.as_u16(), duration_ms, "API write");
    } else {
        warn!(target: "audit", %method, %uri, %request_id, status = status.as_u16(), duration_ms, "API write rejected");
    }

    response
}
