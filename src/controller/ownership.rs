//! # Ownership Resolution
//!
//! Finds the parent object of a child: the first owner reference whose kind
//! matches the expected parent kind, or else the name from the child's spec.
//! The parent is read fresh from the store on every call, nothing is cached.

use crate::controller::store::{ObjectStore, StoreError, StoreObject};
use crate::crd::{Keycloak, KeycloakRealm, RealmChildResource};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error(
        "{parent_kind} owner is not specified neither in ownerReference nor in spec for {child_kind} {name}"
    )]
    NotSpecified {
        parent_kind: String,
        child_kind: String,
        name: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Name of the parent of kind `parent_kind`, from owner references first, then `fallback`
///
/// Only the first owner reference of the expected kind is considered.
pub fn owner_name<'a>(
    meta: &'a ObjectMeta,
    parent_kind: &str,
    fallback: Option<&'a str>,
) -> Option<&'a str> {
    let from_reference = meta
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|reference| reference.kind == parent_kind)
        .map(|reference| reference.name.as_str());

    from_reference.or_else(|| fallback.filter(|name| !name.is_empty()))
}

/// Resolve and fetch the parent `P` of the child described by `child_meta`
///
/// Fails with `OwnershipError::NotSpecified` without touching the store when
/// no name is found. Store errors (including not-found) are returned as is,
/// parents are never created.
pub async fn resolve_owner<P, S>(
    store: &S,
    child_kind: &str,
    child_meta: &ObjectMeta,
    fallback: Option<&str>,
) -> Result<P, OwnershipError>
where
    P: StoreObject,
    S: ObjectStore,
{
    let parent_kind = P::kind(&());
    let child_name = child_meta.name.as_deref().unwrap_or_default();

    let Some(parent_name) = owner_name(child_meta, &parent_kind, fallback) else {
        return Err(OwnershipError::NotSpecified {
            parent_kind: parent_kind.to_lowercase(),
            child_kind: child_kind.to_lowercase(),
            name: child_name.to_string(),
        });
    };

    let namespace = child_meta.namespace.as_deref().unwrap_or_default();
    debug!(
        parent.kind = %parent_kind,
        parent.name = parent_name,
        child.name = child_name,
        "Resolving owner"
    );

    Ok(store.get::<P>(namespace, parent_name).await?)
}

/// Name of the realm a child currently points at, without reading the store
pub fn realm_owner_name<K: StoreObject + RealmChildResource>(child: &K) -> Option<&str> {
    owner_name(child.meta(), &KeycloakRealm::kind(&()), child.realm_ref())
}

/// Realm owning a realm child
pub async fn realm_owner<K, S>(store: &S, child: &K) -> Result<KeycloakRealm, OwnershipError>
where
    K: StoreObject + RealmChildResource,
    S: ObjectStore,
{
    resolve_owner(store, &K::kind(&()), child.meta(), child.realm_ref()).await
}

/// Keycloak instance owning a realm
pub async fn keycloak_owner<S>(store: &S, realm: &KeycloakRealm) -> Result<Keycloak, OwnershipError>
where
    S: ObjectStore,
{
    resolve_owner(
        store,
        &KeycloakRealm::kind(&()),
        &realm.metadata,
        realm.keycloak_owner_ref(),
    )
    .await
}
