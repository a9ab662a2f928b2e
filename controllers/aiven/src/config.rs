//! Controller configuration loaded from environment variables.
//!
//! Every value has a default; unparsable numbers fall back to the default
//! with a warning rather than aborting startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Default Aiven API endpoint
pub const DEFAULT_AIVEN_API_URL: &str = "https://api.aiven.io";

/// Runtime configuration for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Aiven API base URL
    pub aiven_api_url: String,
    /// Pre-shared token, preferred over `authSecretRef`
    pub default_token: Option<String>,
    /// Restrict watches to one namespace
    pub watch_namespace: Option<String>,
    /// Steady-state requeue interval
    pub poll_interval: Duration,
    /// Soft/transient requeue interval
    pub requeue_timeout: Duration,
    /// Concurrent reconciles per kind
    pub max_concurrent_reconciles: u16,
    /// Work-queue debounce
    pub debounce: Duration,
    /// Bounded optimistic-concurrency retries
    pub conflict_retry_attempts: u32,
    /// First hard-error requeue
    pub error_backoff_base: Duration,
    /// Hard-error requeue cap
    pub error_backoff_max: Duration,
    /// Aiven HTTP request timeout
    pub request_timeout: Duration,
    /// Reporting component on Kubernetes events
    pub controller_name: String,
    /// Port for /metrics, /healthz and /readyz
    pub metrics_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            aiven_api_url: DEFAULT_AIVEN_API_URL.to_string(),
            default_token: None,
            watch_namespace: None,
            poll_interval: Duration::from_secs(60),
            requeue_timeout: Duration::from_secs(10),
            max_concurrent_reconciles: 3,
            debounce: Duration::from_secs(1),
            conflict_retry_attempts: 5,
            error_backoff_base: Duration::from_secs(5),
            error_backoff_max: Duration::from_secs(900),
            request_timeout: Duration::from_secs(30),
            controller_name: "aiven-controller".to_string(),
            metrics_port: 5000,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(parse_or_default(key, non_empty(key), default.as_secs()))
        };

        Self {
            aiven_api_url: non_empty("AIVEN_API_URL").unwrap_or(defaults.aiven_api_url),
            default_token: non_empty("DEFAULT_AIVEN_TOKEN"),
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            poll_interval: secs("POLL_INTERVAL_SECS", defaults.poll_interval),
            requeue_timeout: secs("REQUEUE_TIMEOUT_SECS", defaults.requeue_timeout),
            max_concurrent_reconciles: parse_or_default(
                "MAX_CONCURRENT_RECONCILES",
                non_empty("MAX_CONCURRENT_RECONCILES"),
                defaults.max_concurrent_reconciles,
            ),
            debounce: secs("DEBOUNCE_SECS", defaults.debounce),
            conflict_retry_attempts: parse_or_default(
                "CONFLICT_RETRY_ATTEMPTS",
                non_empty("CONFLICT_RETRY_ATTEMPTS"),
                defaults.conflict_retry_attempts,
            )
            .max(1),
            error_backoff_base: secs("ERROR_BACKOFF_BASE_SECS", defaults.error_backoff_base),
            error_backoff_max: secs("ERROR_BACKOFF_MAX_SECS", defaults.error_backoff_max),
            request_timeout: secs("REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            controller_name: non_empty("CONTROLLER_NAME").unwrap_or(defaults.controller_name),
            metrics_port: parse_or_default("METRICS_PORT", non_empty("METRICS_PORT"), defaults.metrics_port),
        }
    }
}

fn parse_or_default<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match raw {
        None => default,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value {:?} for {}, using default {}", value, key, default);
            default
        }),
    }
}
