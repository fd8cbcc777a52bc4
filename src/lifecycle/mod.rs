//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! SIGINT / SIGTERM
//!     → shutdown_signal() resolves
//!     → Shutdown::trigger()
//!     → every server awaiting Shutdown::wait() drains and exits
//! ```

pub mod shutdown;

pub use shutdown::{shutdown_signal, Shutdown};
