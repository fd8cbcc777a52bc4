//! Latency-based load shedding.
//!
//! # States
//! - Healthy: p99 ≤ breach latency, or fewer than `min_sample_size` samples
//! - Overloaded: p99 > breach latency; requests are shed except for a small
//!   random fraction of probes
//!
//! # State Transitions
//! ```text
//! Nothing is stored: every request recomputes p99 from the window.
//! Healthy → Overloaded: slow handler completions push p99 over the threshold
//! Overloaded → Healthy: probe completions refill the window with fast samples
//! ```
//!
//! # Design Decisions
//! - One shedder per protected route, shared by all of its requests
//! - Only requests that reach the handler are sampled; a shed response says
//!   nothing about capacity and would drag p99 down during an outage
//! - Trimming runs at most once per resize period to keep the lock cheap

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use crate::config::{validation::load_shed_errors, LoadShedConfig, ValidationError};
use crate::http::response::rejection;
use crate::observability::metrics;
use crate::resilience::latency::LatencyQueue;

/// Outcome of the shedding check for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    /// Overloaded, but admitted to sample recovery.
    Probe { p99: Duration },
    Shed { p99: Duration },
}

enum ProbeSource {
    ThreadLocal,
    Seeded(Mutex<StdRng>),
}

impl ProbeSource {
    /// `ratio` is validated to lie in (0, 1].
    fn draw(&self, ratio: f64) -> bool {
        match self {
            ProbeSource::ThreadLocal => rand::thread_rng().gen_bool(ratio),
            ProbeSource::Seeded(rng) => rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .gen_bool(ratio),
        }
    }
}

/// Point-in-time view of a shedder, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct ShedSnapshot {
    pub route: String,
    pub samples: usize,
    pub p99_ms: f64,
    pub breach_latency_ms: u64,
    pub admitted: u64,
    pub probes: u64,
    pub shed: u64,
}

/// Shared latency state and policy of one protected route.
pub struct LoadShedder {
    route: String,
    queue: LatencyQueue,
    min_sample_size: usize,
    breach_latency: Duration,
    retry_after: Duration,
    resize_period: Duration,
    probe_ratio: f64,
    probes: ProbeSource,
    created: Instant,
    /// Nanoseconds after `created` of the last trim.
    last_resize: AtomicU64,
    admitted: AtomicU64,
    probed: AtomicU64,
    shed: AtomicU64,
}

impl LoadShedder {
    pub fn new(route: impl Into<String>, config: &LoadShedConfig) -> Result<Self, ValidationError> {
        if let Some(error) = load_shed_errors(config).into_iter().next() {
            return Err(error);
        }

        let probes = match config.seed {
            Some(seed) => ProbeSource::Seeded(Mutex::new(StdRng::seed_from_u64(seed))),
            None => ProbeSource::ThreadLocal,
        };

        Ok(Self {
            route: route.into(),
            queue: LatencyQueue::new(config.max_latency_items),
            min_sample_size: config.min_sample_size,
            breach_latency: config.breach_latency(),
            retry_after: config.retry_after(),
            resize_period: config.resize_period(),
            probe_ratio: config.probe_ratio,
            probes,
            created: Instant::now(),
            last_resize: AtomicU64::new(0),
            admitted: AtomicU64::new(0),
            probed: AtomicU64::new(0),
            shed: AtomicU64::new(0),
        })
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn p99(&self) -> Duration {
        self.queue.p99(self.min_sample_size)
    }

    /// Decide whether the next request may reach the handler.
    pub fn decide(&self) -> Decision {
        let p99 = self.p99();
        metrics::record_p99(&self.route, p99);

        if p99 <= self.breach_latency {
            self.admitted.fetch_add(1, Ordering::Relaxed);
            return Decision::Admit;
        }

        if self.probes.draw(self.probe_ratio) {
            self.probed.fetch_add(1, Ordering::Relaxed);
            Decision::Probe { p99 }
        } else {
            self.shed.fetch_add(1, Ordering::Relaxed);
            Decision::Shed { p99 }
        }
    }

    /// Record a completed request's latency.
    pub fn record(&self, latency: Duration) {
        self.record_at(latency, Instant::now());
    }

    fn record_at(&self, latency: Duration, now: Instant) {
        self.queue.add(latency);
        metrics::record_handler_duration(&self.route, latency);

        let now_nanos = now.saturating_duration_since(self.created).as_nanos() as u64;
        let last = self.last_resize.load(Ordering::Relaxed);
        if now_nanos.saturating_sub(last) <= self.resize_period.as_nanos() as u64 {
            return;
        }
        // Only one completion per period wins the right to trim.
        if self
            .last_resize
            .compare_exchange(last, now_nanos, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            let dropped = self.queue.resize();
            if dropped > 0 {
                tracing::info!(route = %self.route, dropped, "Trimmed latency window");
            }
            metrics::record_sample_count(&self.route, self.queue.len());
        }
    }

    pub fn snapshot(&self) -> ShedSnapshot {
        ShedSnapshot {
            route: self.route.clone(),
            samples: self.queue.len(),
            p99_ms: self.p99().as_secs_f64() * 1000.0,
            breach_latency_ms: self.breach_latency.as_millis() as u64,
            admitted: self.admitted.load(Ordering::Relaxed),
            probes: self.probed.load(Ordering::Relaxed),
            shed: self.shed.load(Ordering::Relaxed),
        }
    }
}

/// Middleware function for latency-based load shedding.
pub async fn load_shed_middleware(
    State(shedder): State<Arc<LoadShedder>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match shedder.decide() {
        Decision::Shed { p99 } => {
            tracing::warn!(
                route = %shedder.route,
                p99_ms = p99.as_millis() as u64,
                breach_ms = shedder.breach_latency.as_millis() as u64,
                "Shedding load"
            );
            metrics::record_decision(metrics::LOAD_SHED, "rejected");
            let diagnostic = format!(
                "server is overloaded: p99 latency {}ms exceeds breach latency {}ms",
                p99.as_millis(),
                shedder.breach_latency.as_millis()
            );
            return rejection(
                StatusCode::SERVICE_UNAVAILABLE,
                shedder.retry_after,
                &diagnostic,
                "server overloaded, retry later",
            );
        }
        Decision::Probe { p99 } => {
            tracing::debug!(route = %shedder.route, p99_ms = p99.as_millis() as u64, "Admitting probe");
            metrics::record_decision(metrics::LOAD_SHED, "probe");
        }
        Decision::Admit => metrics::record_decision(metrics::LOAD_SHED, "admitted"),
    }

    let _timer = HandlerTimer::start(shedder);
    next.run(request).await
}

/// Records the handler's elapsed time when dropped.
///
/// Runs on completion and also when an outer timeout or a client disconnect
/// cancels the handler, so overly slow invocations still count.
struct HandlerTimer {
    shedder: Arc<LoadShedder>,
    start: Instant,
}

impl HandlerTimer {
    fn start(shedder: Arc<LoadShedder>) -> Self {
        Self {
            shedder,
            start: Instant::now(),
        }
    }
}

impl Drop for HandlerTimer {
    fn drop(&mut self) {
        self.shedder.record(self.start.elapsed());
    }
}
