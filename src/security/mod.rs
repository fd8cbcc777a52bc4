//! Per-client admission (rate limiting).
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_key.rs (derive partition key, e.g. peer IP)
//!     → rate_limit.rs (registry resize, then charge the client's bucket)
//!         → registry.rs (key → bucket, bounded by a high-water mark)
//!         → token_bucket.rs (debt accounting, slack-bounded credit)
//!     → 429 + Retry-After, or pass to the next layer
//! ```
//!
//! # Design Decisions
//! - Registry lock held only for lookup/insert/reset, never while charging
//! - Each bucket has its own lock; different clients proceed in parallel
//! - State is process-local

pub mod client_key;
pub mod rate_limit;
pub mod registry;
pub mod token_bucket;

pub use client_key::{ClientKey, HeaderKey, PeerAddr};
pub use rate_limit::{rate_limit_middleware, RateLimiter};
pub use token_bucket::{Admission, BucketParams, TokenBucket};
