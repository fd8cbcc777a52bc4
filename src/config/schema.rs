//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-client send rate (requests per second).
pub const DEFAULT_SEND_RATE: f64 = 100.0;
/// Default number of client buckets kept before the registry is reset.
pub const DEFAULT_MAX_CLIENTS: usize = 10_000;
/// Default burst tolerance, in requests.
pub const DEFAULT_SLACK: u32 = 10;
/// Default sampling period (12 minutes).
pub const DEFAULT_SAMPLING_PERIOD_SECS: u64 = 12 * 60;
/// Default minimum number of samples before a route can be judged.
pub const DEFAULT_MIN_SAMPLE_SIZE: usize = 50;
/// Default p99 threshold.
pub const DEFAULT_BREACH_LATENCY_MS: u64 = 700;
/// Default bound on the latency window.
pub const DEFAULT_MAX_LATENCY_ITEMS: usize = 1000;
/// Default fraction of requests admitted as probes while overloaded.
pub const DEFAULT_PROBE_RATIO: f64 = 0.01;

/// Root configuration for the admission gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Latency-based load shedding.
    pub load_shed: LoadShedConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// What the rate limiter does with a client that is over budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThrottlePolicy {
    /// Answer 429 immediately; the rejected call does not consume budget.
    #[default]
    Reject,
    /// Hold the request on an async timer until its debt is paid, then admit.
    Delay,
}

/// How the partition key of a request is derived.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientKeyConfig {
    /// IP address of the TCP peer.
    #[default]
    Peer,
    /// First value of a header set by a trusted proxy (e.g. X-Forwarded-For).
    Header { name: String },
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained requests per second allowed per client key.
    pub send_rate: f64,

    /// Registry high-water mark; exceeding it forgets every client.
    pub max_clients: usize,

    /// Burst tolerance, in requests.
    pub slack: u32,

    /// Reject or delay over-budget requests.
    pub policy: ThrottlePolicy,

    /// Client identity strategy.
    pub client_key: ClientKeyConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            send_rate: DEFAULT_SEND_RATE,
            max_clients: DEFAULT_MAX_CLIENTS,
            slack: DEFAULT_SLACK,
            policy: ThrottlePolicy::Reject,
            client_key: ClientKeyConfig::Peer,
        }
    }
}

/// Load shedding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadShedConfig {
    /// Enable load shedding.
    pub enabled: bool,

    /// Window the latency samples are meant to cover, in seconds.
    pub sampling_period_secs: u64,

    /// Below this many samples a route is always considered healthy.
    pub min_sample_size: usize,

    /// p99 latency above which requests are shed, in milliseconds.
    pub breach_latency_ms: u64,

    /// Upper bound on retained samples before the window is halved.
    pub max_latency_items: usize,

    /// Fraction of requests still admitted while overloaded.
    pub probe_ratio: f64,

    /// Seed for the probe draw. Unset means a thread-local RNG.
    pub seed: Option<u64>,
}

impl Default for LoadShedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling_period_secs: DEFAULT_SAMPLING_PERIOD_SECS,
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            breach_latency_ms: DEFAULT_BREACH_LATENCY_MS,
            max_latency_items: DEFAULT_MAX_LATENCY_ITEMS,
            probe_ratio: DEFAULT_PROBE_RATIO,
            seed: None,
        }
    }
}

impl LoadShedConfig {
    pub fn sampling_period(&self) -> Duration {
        Duration::from_secs(self.sampling_period_secs)
    }

    pub fn breach_latency(&self) -> Duration {
        Duration::from_millis(self.breach_latency_ms)
    }

    /// Advisory Retry-After sent with a 503: sampling period plus five minutes.
    pub fn retry_after(&self) -> Duration {
        self.sampling_period() + Duration::from_secs(5 * 60)
    }

    /// How often the latency window is trimmed: sampling period plus three minutes.
    pub fn resize_period(&self) -> Duration {
        self.sampling_period() + Duration::from_secs(3 * 60)
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_periods() {
        let config = LoadShedConfig::default();
        assert_eq!(config.sampling_period(), Duration::from_secs(720));
        assert_eq!(config.retry_after(), Duration::from_secs(17 * 60));
        assert_eq!(config.resize_period(), Duration::from_secs(15 * 60));
        assert!(config.resize_period() > config.sampling_period());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: GuardConfig = toml::from_str(
            r#"
            [rate_limit]
            send_rate = 5.0
            policy = "delay"
            client_key = { header = { name = "x-forwarded-for" } }

            [load_shed]
            breach_latency_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.send_rate, 5.0);
        assert_eq!(config.rate_limit.policy, ThrottlePolicy::Delay);
        assert_eq!(
            config.rate_limit.client_key,
            ClientKeyConfig::Header { name: "x-forwarded-for".into() }
        );
        assert_eq!(config.rate_limit.max_clients, DEFAULT_MAX_CLIENTS);
        assert_eq!(config.load_shed.breach_latency(), Duration::from_millis(250));
        assert_eq!(config.load_shed.min_sample_size, DEFAULT_MIN_SAMPLE_SIZE);
        assert!(config.load_shed.seed.is_none());
    }
}
