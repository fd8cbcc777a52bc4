//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → each section handed to the component that owns it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the defaults live in `schema.rs` as
//!   constants, never as mutable globals
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, ClientKeyConfig, GuardConfig, ListenerConfig, LoadShedConfig, LogFormat,
    ObservabilityConfig, RateLimitConfig, ThrottlePolicy, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
