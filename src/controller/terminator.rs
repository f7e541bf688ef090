//! # Deletion Terminator
//!
//! Finalizer protocol shared by every realm child:
//!
//! - while the resource is alive, its finalizer is added once
//! - once it is marked for deletion, the remote object is deleted first and
//!   the finalizer is removed only after that succeeded
//!
//! A failed remote deletion keeps the finalizer, so the resource stays until a
//! later attempt succeeds.

use crate::controller::store::{ObjectStore, StoreError, StoreObject};
use crate::keycloak::{KeycloakApi, KeycloakError};
use crate::observability::metrics;
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, Instrument, Span};

#[derive(Debug, Error)]
pub enum TerminationError {
    #[error("error during keycloak resource deletion: {0}")]
    Remote(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Deletes the remote counterpart of a resource
#[async_trait]
pub trait Terminator: Send + Sync {
    /// Delete the remote object, an already absent object counts as deleted
    async fn delete_remote_resource(&self) -> anyhow::Result<()>;

    /// Span the deletion is logged in
    fn span(&self) -> &Span;
}

/// Run the finalizer protocol for `obj`
///
/// Returns `true` when the resource is being deleted, in which case the caller
/// must skip the normal sync. `obj` is refreshed with the written metadata.
pub async fn try_to_delete<S, K>(
    store: &S,
    obj: &mut K,
    terminator: &dyn Terminator,
    finalizer: &str,
) -> Result<bool, TerminationError>
where
    S: ObjectStore,
    K: StoreObject,
{
    let has_finalizer = obj.finalizers().iter().any(|f| f == finalizer);

    if obj.meta().deletion_timestamp.is_none() {
        if !has_finalizer {
            let mut finalizers = obj.finalizers().to_vec();
            finalizers.push(finalizer.to_string());
            *obj = store.patch_finalizers(obj, finalizers).await?;
        }
        return Ok(false);
    }

    if !has_finalizer {
        return Ok(true);
    }

    terminator
        .delete_remote_resource()
        .instrument(terminator.span().clone())
        .await
        .map_err(|e| {
            terminator
                .span()
                .in_scope(|| error!(error = %e, "Unable to delete remote resource"));
            TerminationError::Remote(e)
        })?;

    let remaining: Vec<String> = obj
        .finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();
    store.patch_finalizers(obj, remaining).await?;

    Ok(true)
}

/// Remote object removed by a `KeycloakTerminator`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteObject {
    /// Addressed by id, looked up by name when no id was recorded
    ClientScope {
        realm: String,
        name: String,
        id: Option<String>,
    },
    Group { realm: String, name: String },
    AuthFlow { realm: String, alias: String },
    Component { realm: String, name: String },
}

impl RemoteObject {
    fn kind(&self) -> &'static str {
        match self {
            Self::ClientScope { .. } => "client_scope",
            Self::Group { .. } => "group",
            Self::AuthFlow { .. } => "auth_flow",
            Self::Component { .. } => "component",
        }
    }
}

/// `Terminator` deleting a realm object through the Keycloak admin API
pub struct KeycloakTerminator {
    client: Arc<dyn KeycloakApi>,
    object: RemoteObject,
    span: Span,
}

impl std::fmt::Debug for KeycloakTerminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakTerminator")
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}

impl KeycloakTerminator {
    pub fn new(client: Arc<dyn KeycloakApi>, object: RemoteObject) -> Self {
        let span = match &object {
            RemoteObject::ClientScope { realm, name, .. } => {
                tracing::info_span!("terminator", kind = "client_scope", realm = %realm, name = %name)
            }
            RemoteObject::Group { realm, name } => {
                tracing::info_span!("terminator", kind = "group", realm = %realm, name = %name)
            }
            RemoteObject::AuthFlow { realm, alias } => {
                tracing::info_span!("terminator", kind = "auth_flow", realm = %realm, alias = %alias)
            }
            RemoteObject::Component { realm, name } => {
                tracing::info_span!("terminator", kind = "component", realm = %realm, name = %name)
            }
        };
        Self {
            client,
            object,
            span,
        }
    }

    pub fn object(&self) -> &RemoteObject {
        &self.object
    }

    async fn delete(&self) -> Result<(), KeycloakError> {
        match &self.object {
            RemoteObject::ClientScope { realm, name, id } => {
                let id = match id {
                    Some(id) => id.clone(),
                    None => self
                        .client
                        .get_client_scope(realm, name)
                        .await?
                        .id
                        .ok_or_else(|| KeycloakError::not_found(format!("client scope {name}")))?,
                };
                self.client.delete_client_scope(realm, &id).await
            }
            RemoteObject::Group { realm, name } => self.client.delete_group(realm, name).await,
            RemoteObject::AuthFlow { realm, alias } => {
                self.client.delete_auth_flow(realm, alias).await
            }
            RemoteObject::Component { realm, name } => {
                self.client.delete_component(realm, name).await
            }
        }
    }
}

#[async_trait]
impl Terminator for KeycloakTerminator {
    async fn delete_remote_resource(&self) -> anyhow::Result<()> {
        info!("Start deleting {}", self.object.kind());

        match self.delete().await {
            Ok(()) => {
                metrics::increment_remote_deletions(self.object.kind());
                info!("Done deleting {}", self.object.kind());
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!("{} already absent, skipping deletion", self.object.kind());
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!(
                "unable to delete {}: {e}",
                self.object.kind()
            )),
        }
    }

    fn span(&self) -> &Span {
        &self.span
    }
}
