//! Server-side admission (load shedding).
//!
//! # Data Flow
//! ```text
//! Request to a protected route:
//!     → load_shed.rs (p99 of the route's window vs. breach latency)
//!     → 503 + Retry-After, or run the handler
//!     → handler latency appended to latency.rs window, trimmed periodically
//! ```
//!
//! # Design Decisions
//! - The latency window is the one contended lock per route; it is bounded
//!   (max_latency_items) so sorting it for p99 stays cheap
//! - A small probe fraction is admitted while overloaded so recovery is seen

pub mod latency;
pub mod load_shed;

pub use latency::{percentile, LatencyQueue};
pub use load_shed::{load_shed_middleware, Decision, LoadShedder, ShedSnapshot};
