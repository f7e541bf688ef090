//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `keycloak_operator_reconciliations_total` - Reconciliations by resource kind
//! - `keycloak_operator_reconciliation_errors_total` - Failed reconciliations by resource kind
//! - `keycloak_operator_reconciliation_duration_seconds` - Duration of reconciliations
//! - `keycloak_operator_requeues_total` - Requeues by reason
//! - `keycloak_operator_token_cache_total` - Token cache lookups by result (hit, miss)
//! - `keycloak_operator_token_cache_write_failures_total` - Failed token cache writes
//! - `keycloak_operator_authentication_failures_total` - Failed token handshakes
//! - `keycloak_operator_remote_deletions_total` - Remote objects deleted by terminators

use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keycloak_operator_reconciliations_total",
            "Total number of reconciliations by resource kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keycloak_operator_reconciliation_errors_total",
            "Total number of failed reconciliations by resource kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "keycloak_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keycloak_operator_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static TOKEN_CACHE_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keycloak_operator_token_cache_total",
            "Token cache lookups by result",
        ),
        &["result"],
    )
    .expect("Failed to create TOKEN_CACHE_TOTAL metric - this should never happen")
});

static TOKEN_CACHE_WRITE_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "keycloak_operator_token_cache_write_failures_total",
        "Total number of failed token cache writes",
    )
    .expect("Failed to create TOKEN_CACHE_WRITE_FAILURES_TOTAL metric - this should never happen")
});

static AUTHENTICATION_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "keycloak_operator_authentication_failures_total",
        "Total number of failed Keycloak token handshakes",
    )
    .expect("Failed to create AUTHENTICATION_FAILURES_TOTAL metric - this should never happen")
});

static AUTHENTICATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "keycloak_operator_authentication_duration_seconds",
            "Duration of Keycloak token handshakes in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create AUTHENTICATION_DURATION metric - this should never happen")
});

static REMOTE_DELETIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keycloak_operator_remote_deletions_total",
            "Total number of remote objects deleted by terminators",
        ),
        &["kind"],
    )
    .expect("Failed to create REMOTE_DELETIONS_TOTAL metric - this should never happen")
});

/// Register all metrics with the registry
///
/// # Errors
///
/// Returns an error if a metric is registered twice.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TOKEN_CACHE_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TOKEN_CACHE_WRITE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AUTHENTICATION_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AUTHENTICATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REMOTE_DELETIONS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_token_cache_hits() {
    TOKEN_CACHE_TOTAL.with_label_values(&["hit"]).inc();
}

pub fn increment_token_cache_misses() {
    TOKEN_CACHE_TOTAL.with_label_values(&["miss"]).inc();
}

pub fn increment_token_cache_write_failures() {
    TOKEN_CACHE_WRITE_FAILURES_TOTAL.inc();
}

pub fn increment_authentication_failures() {
    AUTHENTICATION_FAILURES_TOTAL.inc();
}

pub fn observe_authentication_duration(duration: f64) {
    AUTHENTICATION_DURATION.observe(duration);
}

pub fn increment_remote_deletions(kind: &str) {
    REMOTE_DELETIONS_TOTAL.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_labelled() {
        increment_token_cache_hits();
        increment_token_cache_misses();
        increment_token_cache_misses();

        assert!(TOKEN_CACHE_TOTAL.with_label_values(&["hit"]).get() >= 1);
        assert!(TOKEN_CACHE_TOTAL.with_label_values(&["miss"]).get() >= 2);
    }
}
