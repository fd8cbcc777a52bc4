//! Per-client rate limiting middleware.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::config::{validation::rate_limit_errors, RateLimitConfig, ValidationError};
use crate::http::response::rejection;
use crate::observability::metrics;
use crate::security::client_key::{self, ClientKey};
use crate::security::registry::BucketRegistry;
use crate::security::token_bucket::{Admission, BucketParams};

/// State for the per-client rate limiter.
///
/// One instance guards one wrapped handler; its registry lives as long as the
/// handler does.
pub struct RateLimiter {
    registry: BucketRegistry,
    client_key: Arc<dyn ClientKey>,
    send_rate: f64,
}

impl RateLimiter {
    /// Build a limiter from config, using the configured client-key strategy.
    pub fn new(config: &RateLimitConfig) -> Result<Self, ValidationError> {
        let client_key = client_key::from_config(&config.client_key)?;
        Self::with_client_key(config, client_key)
    }

    /// Build a limiter with a caller-supplied client-key strategy.
    pub fn with_client_key(
        config: &RateLimitConfig,
        client_key: Arc<dyn ClientKey>,
    ) -> Result<Self, ValidationError> {
        if let Some(error) = rate_limit_errors(config).into_iter().next() {
            return Err(error);
        }
        let params = BucketParams::new(config.send_rate, config.slack, config.policy)?;

        Ok(Self {
            registry: BucketRegistry::new(params, config.max_clients),
            client_key,
            send_rate: config.send_rate,
        })
    }

    /// Charge one request to `key`.
    pub fn check(&self, key: &str) -> Admission {
        self.registry.resize();
        self.registry.get(key).allow()
    }

    pub fn send_rate(&self) -> f64 {
        self.send_rate
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.registry.len()
    }

    /// Number of coarse registry resets so far.
    pub fn resets(&self) -> u64 {
        self.registry.resets()
    }
}

/// Middleware function for per-client rate limiting.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = limiter.client_key.key(&request);

    match limiter.check(&key) {
        Admission::Admit => {
            metrics::record_decision(metrics::RATE_LIMIT, "admitted");
            next.run(request).await
        }
        Admission::Delay(wait) => {
            tracing::debug!(client = %key, delay = ?wait, "Throttling client");
            metrics::record_decision(metrics::RATE_LIMIT, "delayed");
            // Dropping the request future (client gone) cancels the wait.
            tokio::time::sleep(wait).await;
            next.run(request).await
        }
        Admission::Reject { retry_after } => {
            tracing::warn!(client = %key, retry_after = ?retry_after, "Rate limit exceeded");
            metrics::record_decision(metrics::RATE_LIMIT, "rejected");
            let diagnostic = format!(
                "rate limited: client {} exceeded {} request(s) per second",
                key, limiter.send_rate
            );
            rejection(
                StatusCode::TOO_MANY_REQUESTS,
                retry_after,
                &diagnostic,
                "rate limited, retry later",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientKeyConfig, ThrottlePolicy};
    use crate::http::response::X_MIDDLEWARE_ERROR;
    use axum::{http::header, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn config(send_rate: f64, policy: ThrottlePolicy) -> RateLimitConfig {
        RateLimitConfig {
            send_rate,
            policy,
            client_key: ClientKeyConfig::Header {
                name: "x-client".into(),
            },
            ..Default::default()
        }
    }

    fn app(limiter: Arc<RateLimiter>) -> Router {
        Router::new()
            .route("/", get(|| async { "hello" }))
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
    }

    fn request(client: &str) -> Request<Body> {
        Request::builder()
            .uri("/")
            .header("x-client", client)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_construction_fails_fast() {
        assert!(RateLimiter::new(&config(0.0, ThrottlePolicy::Reject)).is_err());
        let bad_key = RateLimitConfig {
            client_key: ClientKeyConfig::Header { name: String::new() },
            ..Default::default()
        };
        assert!(RateLimiter::new(&bad_key).is_err());
    }

    #[test]
    fn test_check_resets_full_registry() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            max_clients: 2,
            ..Default::default()
        })
        .unwrap();

        limiter.check("a");
        limiter.check("b");
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.check("c");
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.resets(), 1);
    }

    #[tokio::test]
    async fn test_second_rapid_request_is_rejected() {
        let limiter = Arc::new(RateLimiter::new(&config(1.0, ThrottlePolicy::Reject)).unwrap());
        let app = app(limiter);

        let first = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request("198.51.100.1")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()[header::RETRY_AFTER], "1");
        let diagnostic = second.headers()[X_MIDDLEWARE_ERROR].to_str().unwrap();
        assert!(diagnostic.contains("198.51.100.1"));

        let body = axum::body::to_bytes(second.into_body(), 1024).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("rate limited"));
    }

    #[tokio::test]
    async fn test_clients_have_separate_budgets() {
        let limiter = Arc::new(RateLimiter::new(&config(1.0, ThrottlePolicy::Reject)).unwrap());
        let app = app(limiter.clone());

        for client in ["a", "b", "c"] {
            let response = app.clone().oneshot(request(client)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(limiter.tracked_clients(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_policy_waits_then_admits() {
        let limiter = Arc::new(RateLimiter::new(&config(2.0, ThrottlePolicy::Delay)).unwrap());
        let app = app(limiter);

        let first = app.clone().oneshot(request("d")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let started = tokio::time::Instant::now();
        let second = app.oneshot(request("d")).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert!(started.elapsed() >= std::time::Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_delayed_request_never_reaches_handler() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let limiter = Arc::new(RateLimiter::new(&config(1.0, ThrottlePolicy::Delay)).unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new()
            .route(
                "/",
                get(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { "hello" }
                }),
            )
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

        let first = app.clone().oneshot(request("gone")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The client gives up while its request is held for about a second.
        let pending = app.oneshot(request("gone"));
        let abandoned = tokio::time::timeout(Duration::from_millis(100), pending).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
