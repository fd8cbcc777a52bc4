//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates > 0, ratios within [0, 1])
//! - Check that addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, and again when a
//!   component is constructed, so bad values never reach the request path

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::{ClientKeyConfig, GuardConfig, LoadShedConfig, RateLimitConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("rate_limit.send_rate must be a finite number above zero (got {0})")]
    InvalidSendRate(f64),

    #[error("rate_limit.max_clients must be at least 1")]
    ZeroMaxClients,

    #[error("rate_limit.slack must be at least 1")]
    ZeroSlack,

    #[error("rate_limit.client_key header name is not a valid header: {0:?}")]
    InvalidClientKeyHeader(String),

    #[error("load_shed.sampling_period_secs must be at least 1")]
    ZeroSamplingPeriod,

    #[error("load_shed.min_sample_size must be at least 1")]
    ZeroMinSampleSize,

    #[error("load_shed.max_latency_items must be at least 2 (got {0})")]
    TooFewLatencyItems(usize),

    #[error("load_shed.probe_ratio must be within (0, 1] (got {0})")]
    InvalidProbeRatio(f64),

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },
}

/// Validate a whole configuration, collecting every problem.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    errors.extend(rate_limit_errors(&config.rate_limit));
    errors.extend(load_shed_errors(&config.load_shed));

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Problems with the rate limiter section alone.
pub fn rate_limit_errors(config: &RateLimitConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if !config.send_rate.is_finite() || config.send_rate <= 0.0 {
        errors.push(ValidationError::InvalidSendRate(config.send_rate));
    }
    if config.max_clients == 0 {
        errors.push(ValidationError::ZeroMaxClients);
    }
    if config.slack == 0 {
        errors.push(ValidationError::ZeroSlack);
    }
    if let ClientKeyConfig::Header { name } = &config.client_key {
        if HeaderName::try_from(name.as_str()).is_err() {
            errors.push(ValidationError::InvalidClientKeyHeader(name.clone()));
        }
    }
    errors
}

/// Problems with the load shedder section alone.
pub fn load_shed_errors(config: &LoadShedConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if config.sampling_period_secs == 0 {
        errors.push(ValidationError::ZeroSamplingPeriod);
    }
    if config.min_sample_size == 0 {
        errors.push(ValidationError::ZeroMinSampleSize);
    }
    if config.max_latency_items < 2 {
        errors.push(ValidationError::TooFewLatencyItems(config.max_latency_items));
    }
    // Shed requests are not sampled, so probes are the only way back to healthy.
    if !(config.probe_ratio > 0.0 && config.probe_ratio <= 1.0) {
        errors.push(ValidationError::InvalidProbeRatio(config.probe_ratio));
    }
    errors
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
