//! # Reconciliation Engine
//!
//! One reconciliation routine for every realm child kind, parameterized by
//! its `RealmChild` strategy:
//!
//! 1. resolve the owning realm
//! 2. provision a Keycloak client for the realm's Keycloak instance
//! 3. run the finalizer protocol (adds the finalizer, or deletes the remote
//!    object and releases the resource when it is being deleted)
//! 4. sync the remote object
//!
//! Failures are written to `status.value` and counted in `status.failureCount`,
//! the returned `Action` carries the backoff delay. Write conflicts are returned
//! as errors without touching the counter, the error policy requeues them.

use crate::config::ControllerConfig;
use crate::controller::backoff::{FailureCountable, FailureTracker};
use crate::controller::ownership::{realm_owner, realm_owner_name, OwnershipError};
use crate::controller::provisioner::{ClientProvider, ProvisionError};
use crate::controller::store::{update_status, ObjectStore, StoreError};
use crate::controller::strategy::RealmChild;
use crate::controller::terminator::{try_to_delete, KeycloakTerminator, TerminationError};
use crate::crd::RealmChildResource;
use crate::keycloak::KeycloakError;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, Instrument};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("unable to get realm owner ref: {0}")]
    Ownership(#[source] OwnershipError),

    #[error("unable to create keycloak client: {0}")]
    Provision(#[source] ProvisionError),

    #[error("unable to sync {kind}: {source}")]
    RemoteOperation {
        kind: &'static str,
        #[source]
        source: KeycloakError,
    },

    #[error(transparent)]
    Conflict(StoreError),

    #[error("unable to tryToDelete {kind}: {source}")]
    Termination {
        kind: &'static str,
        #[source]
        source: TerminationError,
    },

    #[error("unable to update status: {0}")]
    StatusUpdate(#[source] StoreError),
}

impl ReconcileError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    fn termination(kind: &'static str, source: TerminationError) -> Self {
        match source {
            TerminationError::Store(e) if e.is_conflict() => Self::Conflict(e),
            source => Self::Termination { kind, source },
        }
    }

    pub(crate) fn status_update(source: StoreError) -> Self {
        if source.is_conflict() {
            Self::Conflict(source)
        } else {
            Self::StatusUpdate(source)
        }
    }
}

/// Shared state of the realm child controllers
pub struct Context<S> {
    pub store: Arc<S>,
    pub provider: Arc<dyn ClientProvider>,
    pub tracker: FailureTracker,
    pub config: ControllerConfig,
}

impl<S> std::fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("tracker", &self.tracker)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore> Context<S> {
    pub fn new(store: Arc<S>, provider: Arc<dyn ClientProvider>, config: ControllerConfig) -> Self {
        Self {
            store,
            provider,
            tracker: config.failure_tracker(),
            config,
        }
    }
}

enum Outcome {
    Synced(Option<String>),
    Released,
}

/// Reconcile one realm child
pub async fn reconcile<K, S>(obj: Arc<K>, ctx: Arc<Context<S>>) -> Result<Action, ReconcileError>
where
    K: RealmChild,
    S: ObjectStore + 'static,
{
    let started = Instant::now();
    let kind = K::kind(&()).into_owned();
    let span = tracing::info_span!(
        "reconcile",
        resource.kind = %kind,
        resource.name = %obj.name_any(),
        resource.namespace = %obj.namespace().unwrap_or_default(),
    );

    let result = reconcile_child(obj.as_ref().clone(), &ctx)
        .instrument(span)
        .await;

    metrics::increment_reconciliations(&kind);
    metrics::observe_reconciliation_duration(&kind, started.elapsed().as_secs_f64());
    result
}

async fn reconcile_child<K, S>(mut obj: K, ctx: &Context<S>) -> Result<Action, ReconcileError>
where
    K: RealmChild,
    S: ObjectStore,
{
    let now = Utc::now();
    if let Some(wait) = scheduled_wait(&obj, now) {
        debug!(wait_secs = wait.as_secs(), "Next reconciliation not due yet");
        return Ok(Action::requeue(wait));
    }

    info!("Reconciling {}", K::LABEL);
    let previous = obj.child_status().cloned();

    let requeue = match try_reconcile(&mut obj, ctx).await {
        Ok(Outcome::Released) => {
            info!("Remote {} deleted, resource released", K::LABEL);
            return Ok(Action::await_change());
        }
        Ok(Outcome::Synced(id)) => {
            if let Some(id) = id {
                obj.child_status_mut().id = Some(id);
            }
            ctx.tracker.record_success(&mut obj);
            ctx.config.success_reconcile_timeout()
        }
        Err(e) if e.is_conflict() => return Err(e),
        Err(e) => {
            metrics::increment_reconciliation_errors(&K::kind(&()));
            let delay = ctx.tracker.record_failure(&mut obj, &e);
            error!(
                error = %e,
                failure_count = obj.failure_count(),
                retry_in_secs = delay.as_secs(),
                "An error has occurred while handling {}",
                K::LABEL
            );
            Some(delay)
        }
    };

    let generation = obj.meta().generation;
    let owner = realm_owner_name(&obj).map(str::to_string);
    let status = obj.child_status_mut();
    status.observed_generation = generation;
    status.observed_owner = owner;
    status.next_reconcile_time = requeue
        .and_then(|delay| chrono::Duration::from_std(delay).ok())
        .map(|delay| (now + delay).to_rfc3339());

    let changed = previous
        .as_ref()
        .is_none_or(|previous| status.differs_from(previous));
    if changed {
        update_status(ctx.store.as_ref(), &mut obj)
            .await
            .map_err(ReconcileError::status_update)?;
    } else {
        debug!("Status unchanged, skipping update");
    }

    Ok(requeue.map_or_else(Action::await_change, Action::requeue))
}

async fn try_reconcile<K, S>(obj: &mut K, ctx: &Context<S>) -> Result<Outcome, ReconcileError>
where
    K: RealmChild,
    S: ObjectStore,
{
    let realm = realm_owner(ctx.store.as_ref(), &*obj)
        .await
        .map_err(ReconcileError::Ownership)?;
    let realm_name = realm.spec.realm_name.as_str();

    let client = ctx
        .provider
        .client_for_realm(&realm)
        .await
        .map_err(ReconcileError::Provision)?;

    let terminator = KeycloakTerminator::new(Arc::clone(&client), obj.remote_object(realm_name));
    let released = try_to_delete(ctx.store.as_ref(), obj, &terminator, K::FINALIZER)
        .await
        .map_err(|e| ReconcileError::termination(K::LABEL, e))?;
    if released {
        return Ok(Outcome::Released);
    }

    let id = obj
        .sync(client.as_ref(), realm_name)
        .await
        .map_err(|source| ReconcileError::RemoteOperation {
            kind: K::LABEL,
            source,
        })?;

    Ok(Outcome::Synced(id))
}

/// Time left until the persisted next reconciliation, if neither the spec nor
/// the resolved realm owner changed since
///
/// Status writes trigger watch events, this keeps them from bypassing the backoff.
/// Owner references live in metadata and do not bump the generation, so the
/// owner is compared separately.
fn scheduled_wait<K: RealmChild>(obj: &K, now: DateTime<Utc>) -> Option<Duration> {
    if obj.meta().deletion_timestamp.is_some() {
        return None;
    }

    let status = obj.child_status()?;
    if status.observed_generation != obj.meta().generation
        || status.observed_owner.as_deref() != realm_owner_name(obj)
    {
        return None;
    }

    let next = DateTime::parse_from_rfc3339(status.next_reconcile_time.as_deref()?).ok()?;
    (next.with_timezone(&Utc) - now)
        .to_std()
        .ok()
        .filter(|wait| !wait.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CLIENT_SCOPE_FINALIZER;
    use crate::controller::provisioner::Provisioner;
    use crate::crd::{KeycloakChildStatus, KeycloakClientScope, KeycloakClientScopeSpec};
    use crate::keycloak::{AdapterFactory, ClientScope};
    use crate::testing::{self, MemoryStore, MockFactory, NAMESPACE};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};

    struct Fixture {
        store: Arc<MemoryStore>,
        factory: Arc<MockFactory>,
        ctx: Arc<Context<MemoryStore>>,
    }

    fn fixture() -> Fixture {
        fixture_with(ControllerConfig::default())
    }

    fn fixture_with(config: ControllerConfig) -> Fixture {
        let store = Arc::new(testing::seeded_store());
        let factory = Arc::new(MockFactory::default());
        let provider = Provisioner::new(
            Arc::clone(&store),
            Arc::clone(&factory) as Arc<dyn AdapterFactory>,
            30,
        );
        let ctx = Arc::new(Context::new(
            Arc::clone(&store),
            Arc::new(provider),
            config,
        ));
        Fixture {
            store,
            factory,
            ctx,
        }
    }

    fn scope(realm: Option<&str>) -> KeycloakClientScope {
        let mut scope = KeycloakClientScope::new(
            "scope1",
            KeycloakClientScopeSpec {
                name: "scope1".to_string(),
                realm: realm.map(str::to_string),
                ..KeycloakClientScopeSpec::default()
            },
        );
        scope.metadata.namespace = Some(NAMESPACE.to_string());
        scope.metadata.generation = Some(1);
        scope
    }

    fn stored_scope(store: &MemoryStore) -> KeycloakClientScope {
        store.stored(NAMESPACE, "scope1").unwrap()
    }

    fn status(scope: &KeycloakClientScope) -> KeycloakChildStatus {
        scope.status.clone().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_missing_scope_is_created_and_id_recorded() {
        let f = fixture();
        f.factory.client.next_scope_id("scope12");
        let obj = f.store.insert(&scope(Some("realm")));

        let action = reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(3600)));
        let stored = stored_scope(&f.store);
        assert_eq!(status(&stored).value, "OK");
        assert_eq!(status(&stored).id.as_deref(), Some("scope12"));
        assert_eq!(status(&stored).failure_count, 0);
        assert_eq!(status(&stored).observed_generation, Some(1));
        assert_eq!(stored.finalizers(), [CLIENT_SCOPE_FINALIZER.to_string()]);
        assert_eq!(
            f.factory.client.calls(),
            vec![
                "get_client_scope ns.test scope1",
                "create_client_scope ns.test scope1"
            ]
        );
    }

    #[tokio::test]
    async fn test_handshake_failure_is_recorded_without_remote_calls() {
        let f = fixture();
        f.factory.fail_authentication("fatal");
        let obj = f.store.insert(&scope(Some("realm")));

        let action = reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(10)));
        let status = status(&stored_scope(&f.store));
        // step prefix first, then the handshake stage, then the factory's own message
        assert!(status.value.starts_with("unable to create keycloak client: "));
        assert!(status.value.contains("could not get token"));
        assert!(status.value.ends_with("fatal"));
        assert_eq!(status.failure_count, 1);
        assert!(status.next_reconcile_time.is_some());
        assert!(f.factory.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_owner_is_recorded() {
        let f = fixture();
        let obj = f.store.insert(&scope(None));

        reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();

        let status = status(&stored_scope(&f.store));
        assert!(status.value.starts_with("unable to get realm owner ref"));
        assert_eq!(status.failure_count, 1);
        assert_eq!(f.factory.authentications(), 0);
    }

    #[tokio::test]
    async fn test_added_owner_reference_bypasses_backoff() {
        let f = fixture();
        let obj = f.store.insert(&scope(None));
        reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();
        assert_eq!(status(&stored_scope(&f.store)).failure_count, 1);

        let mut obj = stored_scope(&f.store);
        obj.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "v1.edp.epam.com/v1".to_string(),
            kind: "KeycloakRealm".to_string(),
            name: "realm".to_string(),
            uid: "uid-realm".to_string(),
            ..OwnerReference::default()
        }]);
        let obj = f.store.insert(&obj);
        assert_eq!(obj.metadata.generation, Some(1));

        let action = reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(3600)));
        let status = status(&stored_scope(&f.store));
        assert_eq!(status.value, "OK");
        assert_eq!(status.failure_count, 0);
        assert_eq!(status.observed_owner.as_deref(), Some("realm"));
        assert_eq!(f.factory.authentications(), 1);
    }

    #[tokio::test]
    async fn test_success_without_periodic_resync_clears_schedule() {
        let f = fixture_with(ControllerConfig {
            success_reconcile_timeout_secs: 0,
            ..ControllerConfig::default()
        });
        f.factory.client.fail("get_client_scope", 500, "down");
        let obj = f.store.insert(&scope(Some("realm")));
        reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();
        assert!(status(&stored_scope(&f.store)).next_reconcile_time.is_some());

        f.factory.client.fail("get_client_scope", 404, "");
        let mut obj = stored_scope(&f.store);
        obj.metadata.generation = Some(2);
        let obj = f.store.insert(&obj);
        let action = reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();

        assert_eq!(action, Action::await_change());
        let status = status(&stored_scope(&f.store));
        assert_eq!(status.value, "OK");
        assert_eq!(status.next_reconcile_time, None);
        assert_eq!(status.observed_generation, Some(2));
    }

    #[tokio::test]
    async fn test_disconnected_keycloak_is_retried_with_backoff() {
        let f = fixture();
        f.store.insert(&testing::keycloak(false));
        let obj = f.store.insert(&scope(Some("realm")));

        let action = reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(10)));
        assert_eq!(
            status(&stored_scope(&f.store)).value,
            "unable to create keycloak client: keycloak main is not connected"
        );
    }

    #[tokio::test]
    async fn test_own_status_write_does_not_bypass_backoff() {
        let f = fixture();
        f.factory.fail_authentication("fatal");
        let obj = f.store.insert(&scope(Some("realm")));
        reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();

        let calls_before = f.store.calls().len();
        let action = reconcile(Arc::new(stored_scope(&f.store)), Arc::clone(&f.ctx))
            .await
            .unwrap();

        assert_ne!(action, Action::await_change());
        assert_eq!(f.store.calls().len(), calls_before);
        assert_eq!(f.factory.authentications(), 1);
        assert_eq!(status(&stored_scope(&f.store)).failure_count, 1);
    }

    #[tokio::test]
    async fn test_failures_grow_backoff_until_success_resets_it() {
        let f = fixture();
        f.factory.client.fail("get_client_scope", 500, "down");
        f.store.insert(&scope(Some("realm")));

        let mut delays = Vec::new();
        for generation in 2..=5 {
            let mut obj = stored_scope(&f.store);
            obj.metadata.generation = Some(generation);
            let obj = f.store.insert(&obj);
            delays.push(reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap());
        }

        assert_eq!(
            delays,
            [10, 10, 20, 30].map(|secs| Action::requeue(Duration::from_secs(secs)))
        );
        let failed = stored_scope(&f.store);
        assert_eq!(status(&failed).failure_count, 4);
        assert_eq!(
            status(&failed).value,
            "unable to sync client scope: unexpected response status 500: down"
        );

        f.factory.client.fail("get_client_scope", 404, "");
        let mut obj = failed;
        obj.metadata.generation = Some(6);
        let obj = f.store.insert(&obj);
        reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();

        let recovered = status(&stored_scope(&f.store));
        assert_eq!(recovered.value, "OK");
        assert_eq!(recovered.failure_count, 0);
    }

    #[tokio::test]
    async fn test_deleted_scope_is_removed_remotely_and_released() {
        let f = fixture();
        f.factory.client.insert_client_scope(ClientScope {
            id: Some("scope12".to_string()),
            name: "scope1".to_string(),
            ..ClientScope::default()
        });
        let mut obj = scope(Some("realm"));
        obj.metadata.finalizers = Some(vec![CLIENT_SCOPE_FINALIZER.to_string()]);
        obj.metadata.deletion_timestamp = Some(Time(Utc::now()));
        obj.status = Some(KeycloakChildStatus {
            value: "OK".to_string(),
            id: Some("scope12".to_string()),
            ..KeycloakChildStatus::default()
        });
        let obj = f.store.insert(&obj);

        let action = reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert!(f.store.stored::<KeycloakClientScope>(NAMESPACE, "scope1").is_none());
        assert!(f.factory.client.client_scope("scope1").is_none());
        assert_eq!(
            f.factory.client.calls(),
            vec!["delete_client_scope ns.test scope12"]
        );
    }

    #[tokio::test]
    async fn test_failed_remote_deletion_keeps_resource() {
        let f = fixture();
        f.factory.client.fail("delete_client_scope", 500, "boom");
        let mut obj = scope(Some("realm"));
        obj.metadata.finalizers = Some(vec![CLIENT_SCOPE_FINALIZER.to_string()]);
        obj.metadata.deletion_timestamp = Some(Time(Utc::now()));
        obj.status = Some(KeycloakChildStatus {
            id: Some("scope12".to_string()),
            ..KeycloakChildStatus::default()
        });
        let obj = f.store.insert(&obj);

        reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();

        let stored = stored_scope(&f.store);
        assert_eq!(stored.finalizers(), [CLIENT_SCOPE_FINALIZER.to_string()]);
        assert_eq!(
            status(&stored).value,
            "unable to tryToDelete client scope: error during keycloak resource deletion: \
             unable to delete client_scope: unexpected response status 500: boom"
        );
        assert_eq!(status(&stored).failure_count, 1);
    }

    #[tokio::test]
    async fn test_conflict_is_returned_without_counting_a_failure() {
        let f = fixture();
        let obj = f.store.insert(&scope(Some("realm")));
        f.store.conflict_on_next_write();

        let err = reconcile(Arc::new(obj), Arc::clone(&f.ctx))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        let stored = stored_scope(&f.store);
        assert!(stored.status.is_none());
        assert!(f.factory.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_status_is_not_written() {
        let f = fixture();
        f.factory.client.insert_client_scope(ClientScope {
            id: Some("scope12".to_string()),
            name: "scope1".to_string(),
            ..ClientScope::default()
        });
        let mut obj = scope(Some("realm"));
        obj.metadata.finalizers = Some(vec![CLIENT_SCOPE_FINALIZER.to_string()]);
        obj.status = Some(KeycloakChildStatus {
            value: "OK".to_string(),
            id: Some("scope12".to_string()),
            observed_generation: Some(1),
            observed_owner: Some("realm".to_string()),
            ..KeycloakChildStatus::default()
        });
        let obj = f.store.insert(&obj);

        reconcile(Arc::new(obj), Arc::clone(&f.ctx)).await.unwrap();

        assert!(!f
            .store
            .calls()
            .iter()
            .any(|call| call.starts_with("patch_status")));
    }

    #[test]
    fn test_schedule_gate() {
        let now = Utc::now();
        let mut obj = scope(Some("realm"));
        assert_eq!(scheduled_wait(&obj, now), None);

        obj.status = Some(KeycloakChildStatus {
            observed_generation: Some(1),
            next_reconcile_time: Some((now + chrono::Duration::seconds(30)).to_rfc3339()),
            observed_owner: Some("realm".to_string()),
            ..KeycloakChildStatus::default()
        });
        assert_eq!(scheduled_wait(&obj, now), Some(Duration::from_secs(30)));

        obj.spec.realm = Some("other".to_string());
        assert_eq!(scheduled_wait(&obj, now), None);
        obj.spec.realm = Some("realm".to_string());

        obj.metadata.generation = Some(2);
        assert_eq!(scheduled_wait(&obj, now), None);

        obj.metadata.generation = Some(1);
        obj.metadata.deletion_timestamp = Some(Time(now));
        assert_eq!(scheduled_wait(&obj, now), None);
    }
}
