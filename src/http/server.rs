//! HTTP server setup and admission composition.
//!
//! # Responsibilities
//! - Compose rate limiting and load shedding onto any axum Router
//! - Keep one load shedder per protected route
//! - Build the demo application served by the binary
//! - Bind server to listener with graceful shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Query,
    middleware,
    routing::{get, MethodRouter},
    Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{validation::load_shed_errors, GuardConfig, LoadShedConfig, ValidationError};
use crate::http::response::error_header_middleware;
use crate::resilience::{load_shed_middleware, LoadShedder, ShedSnapshot};
use crate::security::{rate_limit_middleware, RateLimiter};

/// Longest sleep the demo `/work` route accepts.
const MAX_WORK_MS: u64 = 10_000;

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rate limiter view for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    pub send_rate: f64,
    pub tracked_clients: usize,
    pub registry_resets: u64,
}

/// Everything the admission stack knows right now.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionSnapshot {
    pub rate_limit: Option<RateLimitSnapshot>,
    pub routes: Vec<ShedSnapshot>,
}

/// The admission pipeline: `RateLimiter → LoadShedder → handler`.
///
/// The rate limiter wraps the whole router; each route registered through
/// [`GuardStack::protect`] gets its own load shedder, so a slow route cannot
/// shed traffic for a fast one.
#[derive(Clone, Default)]
pub struct GuardStack {
    limiter: Option<Arc<RateLimiter>>,
    shed_config: Option<LoadShedConfig>,
    shedders: Vec<Arc<LoadShedder>>,
}

impl GuardStack {
    /// Build the enabled components. Invalid sections fail here, not per request.
    pub fn from_config(config: &GuardConfig) -> Result<Self, ValidationError> {
        let limiter = if config.rate_limit.enabled {
            Some(Arc::new(RateLimiter::new(&config.rate_limit)?))
        } else {
            None
        };

        let shed_config = if config.load_shed.enabled {
            if let Some(error) = load_shed_errors(&config.load_shed).into_iter().next() {
                return Err(error);
            }
            Some(config.load_shed.clone())
        } else {
            None
        };

        Ok(Self {
            limiter,
            shed_config,
            shedders: Vec::new(),
        })
    }

    /// Use a pre-built rate limiter (e.g. with a custom client key).
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Wrap a route's handler with its own load shedder.
    pub fn protect<S>(
        &mut self,
        route: &str,
        handler: MethodRouter<S>,
    ) -> Result<MethodRouter<S>, ValidationError>
    where
        S: Clone + Send + Sync + 'static,
    {
        let Some(config) = &self.shed_config else {
            return Ok(handler);
        };

        let shedder = Arc::new(LoadShedder::new(route, config)?);
        self.shedders.push(shedder.clone());
        Ok(handler.layer(middleware::from_fn_with_state(shedder, load_shed_middleware)))
    }

    /// Put the rate limiter and the diagnostic-header layer around `router`.
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let router = match &self.limiter {
            Some(limiter) => router.layer(middleware::from_fn_with_state(
                limiter.clone(),
                rate_limit_middleware,
            )),
            None => router,
        };
        router.layer(middleware::from_fn(error_header_middleware))
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    pub fn shedders(&self) -> &[Arc<LoadShedder>] {
        &self.shedders
    }

    pub fn snapshot(&self) -> AdmissionSnapshot {
        AdmissionSnapshot {
            rate_limit: self.limiter.as_ref().map(|limiter| RateLimitSnapshot {
                send_rate: limiter.send_rate(),
                tracked_clients: limiter.tracked_clients(),
                registry_resets: limiter.resets(),
            }),
            routes: self.shedders.iter().map(|s| s.snapshot()).collect(),
        }
    }
}

/// HTTP server for the demo application behind the admission stack.
pub struct GuardServer {
    router: Router,
    config: GuardConfig,
    stack: GuardStack,
}

impl GuardServer {
    /// Create a new server with the given configuration.
    pub fn new(config: GuardConfig) -> Result<Self, ValidationError> {
        let mut stack = GuardStack::from_config(&config)?;
        let router = Self::build_router(&config, &mut stack)?;
        Ok(Self {
            router,
            config,
            stack,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GuardConfig, stack: &mut GuardStack) -> Result<Router, ValidationError> {
        let app = Router::new()
            .route("/", stack.protect("/", get(index))?)
            .route("/work", stack.protect("/work", get(work))?);

        Ok(stack
            .apply(app)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http()))
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn stack(&self) -> &GuardStack {
        &self.stack
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            rate_limit = self.stack.rate_limiter().is_some(),
            protected_routes = self.stack.shedders().len(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct WorkParams {
    ms: Option<u64>,
}

async fn index() -> &'static str {
    "ok"
}

/// Simulates a handler whose latency is chosen by the caller.
async fn work(Query(params): Query<WorkParams>) -> String {
    let ms = params.ms.unwrap_or(0).min(MAX_WORK_MS);
    tokio::time::sleep(Duration::from_millis(ms)).await;
    format!("worked {ms}ms")
}
