//! # Error Policy
//!
//! Requeue decisions for reconciliations that returned an error, and
//! classification of watch stream errors.
//!
//! Domain failures never reach this module: the engine records them in the
//! resource status and returns the backoff delay itself. What is left are
//! write conflicts (requeued quickly, the counter is untouched) and failed
//! status writes (requeued with the backoff of the next failure).

use crate::controller::backoff::FailureCountable;
use crate::controller::engine::{Context, ReconcileError};
use crate::controller::strategy::RealmChild;
use crate::crd::Keycloak;
use crate::observability::metrics;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Delay before retrying after `error`
pub fn requeue_delay<S>(error: &ReconcileError, failure_count: i64, ctx: &Context<S>) -> Duration {
    if error.is_conflict() {
        ctx.config.conflict_requeue_duration()
    } else {
        ctx.tracker.delay_for(failure_count.saturating_add(1))
    }
}

/// Error policy of the realm child controllers
pub fn handle_child_error<K: RealmChild, S>(
    obj: Arc<K>,
    error: &ReconcileError,
    ctx: Arc<Context<S>>,
) -> Action {
    requeue(
        &K::kind(&()),
        &obj.name_any(),
        &obj.namespace().unwrap_or_default(),
        error,
        obj.failure_count(),
        &ctx,
    )
}

/// Error policy of the Keycloak connectivity controller
pub fn handle_keycloak_error<S>(
    obj: Arc<Keycloak>,
    error: &ReconcileError,
    ctx: Arc<Context<S>>,
) -> Action {
    requeue(
        "Keycloak",
        &obj.name_any(),
        &obj.namespace().unwrap_or_default(),
        error,
        0,
        &ctx,
    )
}

fn requeue<S>(
    kind: &str,
    name: &str,
    namespace: &str,
    error: &ReconcileError,
    failure_count: i64,
    ctx: &Context<S>,
) -> Action {
    let error_span = tracing::error_span!(
        "controller.watch.reconciliation_error",
        resource.kind = kind,
        resource.name = name,
        resource.namespace = namespace,
    );
    let _error_guard = error_span.enter();

    let delay = requeue_delay(error, failure_count, ctx);
    if error.is_conflict() {
        warn!(error = %error, retry_in_secs = delay.as_secs(), "Write conflict, retrying with a fresh read");
        metrics::increment_requeues_total("conflict");
    } else {
        error!(error = %error, retry_in_secs = delay.as_secs(), "Reconciliation error");
        metrics::increment_reconciliation_errors(kind);
        metrics::increment_requeues_total("error-backoff");
    }

    Action::requeue(delay)
}

/// Kind of watch stream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    Unauthorized,
    Expired,
    Throttled,
    NotFound,
    Other,
}

/// Classify a watch stream error from its message
pub fn classify_watch_error(message: &str) -> WatchErrorKind {
    // 404 first, a plain text 404 body surfaces as a serde error mentioning WatchFailed
    let not_found = message.contains("ObjectNotFound")
        || message.contains("404")
        || message.contains("not found");

    if not_found {
        WatchErrorKind::NotFound
    } else if message.contains("401") || message.contains("Unauthorized") {
        WatchErrorKind::Unauthorized
    } else if message.contains("410")
        || message.contains("too old resource version")
        || message.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if message.contains("429") || message.contains("TooManyRequests") {
        WatchErrorKind::Throttled
    } else {
        WatchErrorKind::Other
    }
}

/// Log a watch stream error, the watcher restarts with its own backoff
pub fn handle_watch_stream_error(kind: &str, message: &str) {
    let error_span = tracing::warn_span!("controller.watch.error", resource.kind = kind);
    let _error_guard = error_span.enter();

    match classify_watch_error(message) {
        WatchErrorKind::Unauthorized => error!(
            error = message,
            "Watch authentication failed (401), check the operator's RBAC bindings"
        ),
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will restart");
        }
        WatchErrorKind::Throttled => {
            warn!(error = message, "API server throttling the watch (429)");
        }
        WatchErrorKind::NotFound => warn!(
            error = message,
            "Watched resource not found (404), the CRD may not be installed"
        ),
        WatchErrorKind::Other => error!(error = message, "Controller stream error"),
    }
}
