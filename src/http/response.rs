//! Rejection responses and the diagnostic header.
//!
//! # Responsibilities
//! - Build 429/503 rejections with `Retry-After` and a plain-text body
//! - Carry a human-readable diagnostic in `X-Middleware-Error`
//! - Log that diagnostic and strip it before the response reaches the client
//!
//! # Design Decisions
//! - Rejections are ordinary responses, never errors: the admission
//!   components have nothing to propagate
//! - The diagnostic header is internal; only `error_header_middleware` reads it

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Internal header naming why a middleware rejected a request.
pub const X_MIDDLEWARE_ERROR: HeaderName = HeaderName::from_static("x-middleware-error");

/// Whole seconds for a `Retry-After` hint, rounded up and at least one.
pub fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

/// Build a rejection carrying `Retry-After`, the diagnostic header and a short body.
pub fn rejection(status: StatusCode, retry_after: Duration, diagnostic: &str, body: &str) -> Response {
    let mut response = (status, body.to_string()).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::RETRY_AFTER,
        HeaderValue::from(retry_after_secs(retry_after)),
    );
    // Diagnostics may quote client-supplied keys; drop them if not header-safe.
    if let Ok(value) = HeaderValue::from_str(diagnostic) {
        headers.insert(X_MIDDLEWARE_ERROR, value);
    }
    response
}

/// Outermost layer: logs and removes `X-Middleware-Error`.
pub async fn error_header_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;
    if let Some(diagnostic) = response.headers_mut().remove(X_MIDDLEWARE_ERROR) {
        tracing::warn!(
            status = response.status().as_u16(),
            method = %method,
            path = %path,
            error = diagnostic.to_str().unwrap_or("<non-ascii diagnostic>"),
            "Request rejected by middleware"
        );
    }
    response
}
