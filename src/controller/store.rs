//! # Object Store
//!
//! Namespaced read/write access to Kubernetes objects with optimistic
//! concurrency, plus the status synchronizer built on top of it.
//!
//! Every write carries the object's `metadata.resourceVersion`. If the stored
//! object changed since it was read the write fails with `StoreError::Conflict`
//! and the caller is expected to retry with a fresh read.

use crate::constants::FIELD_MANAGER;
use async_trait::async_trait;
use kube::api::{Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

/// Any namespaced Kubernetes object the store can handle
pub trait StoreObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("{kind} {name} was modified concurrently")]
    Conflict { kind: String, name: String },

    #[error(transparent)]
    Kube(kube::Error),

    #[error("unable to serialize object: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Parent/child store used by the reconciliation core
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<K, StoreError>;

    /// Create `obj`, failing with `AlreadyExists` if the name is taken
    async fn create<K: StoreObject>(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;

    /// Replace the whole object, guarded by its resource version
    async fn replace<K: StoreObject>(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;

    /// Overwrite the finalizer list, guarded by the resource version
    async fn patch_finalizers<K: StoreObject>(
        &self,
        obj: &K,
        finalizers: Vec<String>,
    ) -> Result<K, StoreError>;

    /// Write the status subresource, guarded by the resource version
    async fn patch_status<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;
}

/// `ObjectStore` backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn kind_of<K: StoreObject>() -> String {
    K::kind(&()).into_owned()
}

fn map_kube_error<K: StoreObject>(error: kube::Error, name: &str) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind: kind_of::<K>(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            kind: kind_of::<K>(),
            name: name.to_string(),
        },
        other => StoreError::Kube(other),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| map_kube_error::<K>(e, name))
    }

    async fn create<K: StoreObject>(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        match self.api::<K>(namespace).create(&PostParams::default(), obj).await {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                Err(StoreError::AlreadyExists {
                    kind: kind_of::<K>(),
                    name,
                })
            }
            Err(e) => Err(map_kube_error::<K>(e, &name)),
        }
    }

    async fn replace<K: StoreObject>(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        self.api::<K>(namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_error::<K>(e, &name))
    }

    async fn patch_finalizers<K: StoreObject>(
        &self,
        obj: &K,
        finalizers: Vec<String>,
    ) -> Result<K, StoreError> {
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": obj.resource_version(),
            }
        });

        debug!(kind = %kind_of::<K>(), %namespace, %name, "Patching finalizers");
        self.api::<K>(&namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_error::<K>(e, &name))
    }

    async fn patch_status<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let status = serde_json::to_value(obj)?
            .get("status")
            .cloned()
            .unwrap_or_default();
        let patch = json!({
            "metadata": { "resourceVersion": obj.resource_version() },
            "status": status,
        });

        debug!(kind = %kind_of::<K>(), %namespace, %name, "Patching status");
        self.api::<K>(&namespace)
            .patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_error::<K>(e, &name))
    }
}

/// Persist `obj.status` and adopt the resource version of the written object
///
/// Failures are returned to the caller, never swallowed.
pub async fn update_status<S, K>(store: &S, obj: &mut K) -> Result<(), StoreError>
where
    S: ObjectStore,
    K: StoreObject,
{
    let updated = store.patch_status(obj).await?;
    obj.meta_mut().resource_version = updated.meta().resource_version.clone();
    Ok(())
}
