//! # Keycloak Connectivity
//!
//! Maintains `Keycloak.status.connected`, the flag the client provisioner
//! requires before handing out clients.
//!
//! Every reconciliation performs a fresh token handshake with the referenced
//! credentials, which also refreshes the token cache and notices rotated or
//! revoked credentials.

use crate::controller::engine::{Context, ReconcileError};
use crate::controller::store::{update_status, ObjectStore};
use crate::crd::{Keycloak, KeycloakStatus};
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Instrument};

const KIND: &str = "Keycloak";

/// Check connectivity of one Keycloak instance
pub async fn reconcile<S>(keycloak: Arc<Keycloak>, ctx: Arc<Context<S>>) -> Result<Action, ReconcileError>
where
    S: ObjectStore + 'static,
{
    let started = Instant::now();
    let span = tracing::info_span!(
        "reconcile",
        resource.kind = KIND,
        resource.name = %keycloak.name_any(),
        resource.namespace = %keycloak.namespace().unwrap_or_default(),
    );

    let result = check_connection(keycloak.as_ref().clone(), &ctx)
        .instrument(span)
        .await;

    metrics::increment_reconciliations(KIND);
    metrics::observe_reconciliation_duration(KIND, started.elapsed().as_secs_f64());
    result
}

async fn check_connection<S: ObjectStore>(
    mut keycloak: Keycloak,
    ctx: &Context<S>,
) -> Result<Action, ReconcileError> {
    let connected = match ctx.provider.connect(&keycloak).await {
        Ok(()) => {
            info!(url = %keycloak.spec.url, "Keycloak is reachable");
            true
        }
        Err(e) => {
            metrics::increment_reconciliation_errors(KIND);
            warn!(url = %keycloak.spec.url, error = %e, "Keycloak connection check failed");
            false
        }
    };

    if keycloak.is_connected() != connected || keycloak.status.is_none() {
        keycloak.status = Some(KeycloakStatus { connected });
        update_status(ctx.store.as_ref(), &mut keycloak)
            .await
            .map_err(ReconcileError::status_update)?;
    }

    if connected {
        Ok(ctx
            .config
            .success_reconcile_timeout()
            .map_or_else(Action::await_change, Action::requeue))
    } else {
        Ok(Action::requeue(ctx.tracker.delay_for(1)))
    }
}
