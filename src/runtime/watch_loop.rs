//! # Watch Loop
//!
//! Runs one `kube_runtime::Controller` per resource kind. The realm child
//! controllers share the reconciliation engine, the `Keycloak` controller
//! maintains the connectivity flag they depend on.

use crate::controller::engine::{self, Context};
use crate::controller::keycloak;
use crate::controller::server::ServerState;
use crate::controller::store::{KubeStore, StoreObject};
use crate::controller::strategy::RealmChild;
use crate::crd::{
    Keycloak, KeycloakAuthFlow, KeycloakClientScope, KeycloakRealmComponent, KeycloakRealmGroup,
};
use crate::runtime::error_policy::{
    handle_child_error, handle_keycloak_error, handle_watch_stream_error,
};
use crate::runtime::initialization::InitializationResult;
use futures::{Stream, StreamExt};
use kube::api::Api;
use kube::{Client, Resource};
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, Instrument};

type ControllerResult<K> = Result<
    (ObjectRef<K>, Action),
    controller::Error<engine::ReconcileError, watcher::Error>,
>;

/// Run every controller until a shutdown signal is received
pub async fn run_watch_loop(init: InitializationResult) -> Result<(), anyhow::Error> {
    let InitializationResult {
        client,
        context,
        server_state,
    } = init;

    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");

        shutdown_server_state.is_ready.store(false, Ordering::Relaxed);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    match context.config.watch_namespace.as_deref() {
        Some(namespace) => info!(namespace, "Watching a single namespace"),
        None => info!("Watching all namespaces"),
    }

    let keycloaks = drain(
        "Keycloak",
        keycloak_controller(&client, &context).run(
            keycloak::reconcile::<KubeStore>,
            handle_keycloak_error::<KubeStore>,
            Arc::clone(&context),
        ),
    );
    let client_scopes = drain(
        "KeycloakClientScope",
        run_child_controller::<KeycloakClientScope>(&client, &context),
    );
    let realm_groups = drain(
        "KeycloakRealmGroup",
        run_child_controller::<KeycloakRealmGroup>(&client, &context),
    );
    let auth_flows = drain(
        "KeycloakAuthFlow",
        run_child_controller::<KeycloakAuthFlow>(&client, &context),
    );
    let realm_components = drain(
        "KeycloakRealmComponent",
        run_child_controller::<KeycloakRealmComponent>(&client, &context),
    );

    mark_ready(&server_state);
    let watch_span = tracing::info_span!("controller.watch", operation = "watch_loop");
    async {
        tokio::join!(
            keycloaks,
            client_scopes,
            realm_groups,
            auth_flows,
            realm_components
        )
    }
    .instrument(watch_span)
    .await;

    info!("Controllers stopped gracefully");
    Ok(())
}

fn mark_ready(server_state: &ServerState) {
    server_state.is_ready.store(true, Ordering::Relaxed);
    info!("Controllers started, marked server as ready");
}

fn api_for<K: StoreObject>(client: &Client, context: &Context<KubeStore>) -> Api<K> {
    match context.config.watch_namespace.as_deref() {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

fn controller_config(context: &Context<KubeStore>) -> controller::Config {
    controller::Config::default().concurrency(context.config.max_concurrent_reconciliations)
}

fn keycloak_controller(client: &Client, context: &Arc<Context<KubeStore>>) -> Controller<Keycloak> {
    Controller::new(
        api_for::<Keycloak>(client, context),
        watcher::Config::default().any_semantic(),
    )
    .with_config(controller_config(context))
    .shutdown_on_signal()
}

/// Controller of one realm child kind, driven by the shared engine
fn run_child_controller<K: RealmChild>(
    client: &Client,
    context: &Arc<Context<KubeStore>>,
) -> impl Stream<Item = ControllerResult<K>> {
    Controller::new(
        api_for::<K>(client, context),
        watcher::Config::default().any_semantic(),
    )
    .with_config(controller_config(context))
    .shutdown_on_signal()
    .run(
        engine::reconcile::<K, KubeStore>,
        handle_child_error::<K, KubeStore>,
        Arc::clone(context),
    )
}

/// Consume a controller stream, logging its outcome
async fn drain<K: Resource<DynamicType = ()>>(
    kind: &'static str,
    stream: impl Stream<Item = ControllerResult<K>>,
) {
    stream
        .for_each(|result| {
            match result {
                Ok((obj, action)) => {
                    debug!(resource.kind = kind, resource.name = %obj.name, ?action, "Reconciled");
                }
                Err(controller::Error::ReconcilerFailed(error, obj)) => {
                    // already logged by the error policy
                    debug!(
                        resource.kind = kind,
                        resource.name = %obj.name,
                        error = %error,
                        "Reconciliation failed"
                    );
                }
                Err(error) => handle_watch_stream_error(kind, &format!("{error:?}")),
            }
            futures::future::ready(())
        })
        .await;
    info!(resource.kind = kind, "Controller stream ended");
}
