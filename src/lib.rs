//! Adaptive admission control for axum services.
//!
//! Two independent middlewares decide, per request, whether work may proceed:
//! a per-client token-bucket rate limiter and a per-route p99 load shedder.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::GuardConfig;
pub use http::{GuardServer, GuardStack};
pub use lifecycle::Shutdown;
pub use resilience::LoadShedder;
pub use security::RateLimiter;
