//! # Controller Configuration
//!
//! Operator-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_MAX_SECS, DEFAULT_CONFLICT_REQUEUE_SECS,
    DEFAULT_KEYCLOAK_HTTP_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
    DEFAULT_METRICS_PORT, DEFAULT_SUCCESS_RECONCILE_TIMEOUT_SECS, DEFAULT_TOKEN_EXPIRY_SKEW_SECS,
};
use crate::controller::backoff::FailureTracker;
use std::time::Duration;

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How long to wait before reconciling a healthy resource again (seconds)
    /// Zero means the resource is only reconciled again when it changes
    pub success_reconcile_timeout_secs: u64,
    /// First delay of the failure backoff (seconds)
    pub backoff_base_secs: u64,
    /// Ceiling of the failure backoff (seconds)
    pub backoff_max_secs: u64,
    /// Requeue delay after an optimistic write conflict (seconds)
    pub conflict_requeue_secs: u64,
    /// Timeout of a single request to Keycloak (seconds)
    pub keycloak_http_timeout_secs: u64,
    /// Cached tokens expiring within this window are refreshed (seconds)
    pub token_expiry_skew_secs: i64,
    /// Port of the metrics and probes server
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Maximum concurrent reconciliations per resource kind
    pub max_concurrent_reconciliations: u16,
    /// Namespace to watch, all namespaces when unset
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            success_reconcile_timeout_secs: DEFAULT_SUCCESS_RECONCILE_TIMEOUT_SECS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            conflict_requeue_secs: DEFAULT_CONFLICT_REQUEUE_SECS,
            keycloak_http_timeout_secs: DEFAULT_KEYCLOAK_HTTP_TIMEOUT_SECS,
            token_expiry_skew_secs: DEFAULT_TOKEN_EXPIRY_SKEW_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            success_reconcile_timeout_secs: env_var_or_default(
                "SUCCESS_RECONCILE_TIMEOUT_SECS",
                DEFAULT_SUCCESS_RECONCILE_TIMEOUT_SECS,
            ),
            backoff_base_secs: env_var_or_default("BACKOFF_BASE_SECS", DEFAULT_BACKOFF_BASE_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            conflict_requeue_secs: env_var_or_default(
                "CONFLICT_REQUEUE_SECS",
                DEFAULT_CONFLICT_REQUEUE_SECS,
            ),
            keycloak_http_timeout_secs: env_var_or_default(
                "KEYCLOAK_HTTP_TIMEOUT_SECS",
                DEFAULT_KEYCLOAK_HTTP_TIMEOUT_SECS,
            ),
            token_expiry_skew_secs: env_var_or_default(
                "TOKEN_EXPIRY_SKEW_SECS",
                DEFAULT_TOKEN_EXPIRY_SKEW_SECS,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            watch_namespace: std::env::var("WATCH_NAMESPACE")
                .ok()
                .filter(|ns| !ns.trim().is_empty()),
        }
    }

    /// Requeue delay after a successful reconciliation, `None` when disabled
    pub fn success_reconcile_timeout(&self) -> Option<Duration> {
        (self.success_reconcile_timeout_secs > 0)
            .then(|| Duration::from_secs(self.success_reconcile_timeout_secs))
    }

    /// Requeue delay after an optimistic write conflict
    pub fn conflict_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.conflict_requeue_secs)
    }

    /// Failure backoff between `backoff_base_secs` and `backoff_max_secs`
    pub fn failure_tracker(&self) -> FailureTracker {
        FailureTracker::new(
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.backoff_max_secs),
        )
    }

    /// Timeout of a single Keycloak request
    pub fn keycloak_http_timeout(&self) -> Duration {
        Duration::from_secs(self.keycloak_http_timeout_secs)
    }

    /// Whether logs should be emitted as JSON
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
