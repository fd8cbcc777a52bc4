//! HTTP surface of the admission stack.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, ConnectInfo, graceful shutdown)
//!     → response.rs error_header_middleware (outermost: log + strip diagnostics)
//!     → security::rate_limit (per client)
//!     → [route dispatch]
//!     → resilience::load_shed (per route)
//!     → handler
//! ```

pub mod response;
pub mod server;

pub use response::{error_header_middleware, rejection, X_MIDDLEWARE_ERROR};
pub use server::{AdmissionSnapshot, GuardServer, GuardStack, ServerError};
