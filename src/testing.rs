//! In-memory doubles for the store and the Keycloak adapter.

use crate::controller::store::{ObjectStore, StoreError, StoreObject};
use crate::crd::{
    AdminType, Keycloak, KeycloakRealm, KeycloakRealmSpec, KeycloakSpec, KeycloakStatus,
};
use crate::keycloak::{
    AccessToken, AdapterFactory, AuthFlow, ClientScope, Component, Credentials, Group,
    KeycloakApi, KeycloakError,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Key = (String, String, String);

#[derive(Default)]
struct MemoryState {
    objects: HashMap<Key, Value>,
    version: u64,
    calls: Vec<String>,
    get_failures: HashMap<(String, String), String>,
    write_failures: HashMap<(String, String), String>,
    conflict_next_write: bool,
}

/// `ObjectStore` keeping objects as JSON, with resource version checks
///
/// Objects that are marked for deletion disappear once their last finalizer
/// is removed, like on a real API server.
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn kind_of<K: StoreObject>() -> String {
    K::kind(&()).into_owned()
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    /// Store `obj` unconditionally under a fresh resource version
    pub fn insert<K: StoreObject>(&self, obj: &K) -> K {
        let mut state = self.lock();
        state.version += 1;
        let mut value = serde_json::to_value(obj).unwrap();
        value["metadata"]["resourceVersion"] = json!(state.version.to_string());

        let key = (kind_of::<K>(), obj.namespace().unwrap_or_default(), obj.name_any());
        state.objects.insert(key, value.clone());
        serde_json::from_value(value).unwrap()
    }

    pub fn stored<K: StoreObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        self.lock()
            .objects
            .get(&key)
            .cloned()
            .map(|value| serde_json::from_value(value).unwrap())
    }

    /// Every store call so far, as `"<op> <kind> <namespace>/<name>"`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn fail_get<K: StoreObject>(&self, name: &str, message: &str) {
        self.lock()
            .get_failures
            .insert((kind_of::<K>(), name.to_string()), message.to_string());
    }

    /// Make creates and updates of the named object fail
    pub fn fail_write<K: StoreObject>(&self, name: &str, message: &str) {
        self.lock()
            .write_failures
            .insert((kind_of::<K>(), name.to_string()), message.to_string());
    }

    /// The next guarded write fails as if another writer got there first
    pub fn conflict_on_next_write(&self) {
        self.lock().conflict_next_write = true;
    }

    fn get_sync<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let mut state = self.lock();
        state.calls.push(format!("get {kind} {namespace}/{name}"));

        if let Some(message) = state.get_failures.get(&(kind.clone(), name.to_string())) {
            return Err(StoreError::Backend(message.clone()));
        }

        let value = state
            .objects
            .get(&(kind.clone(), namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                name: name.to_string(),
            })?;
        Ok(serde_json::from_value(value)?)
    }

    fn create_sync<K: StoreObject>(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let name = obj.name_any();
        let mut state = self.lock();
        state.calls.push(format!("create {kind} {namespace}/{name}"));

        if let Some(message) = state.write_failures.get(&(kind.clone(), name.clone())) {
            return Err(StoreError::Backend(message.clone()));
        }

        let key = (kind.clone(), namespace.to_string(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists { kind, name });
        }

        state.version += 1;
        let mut value = serde_json::to_value(obj)?;
        value["metadata"]["namespace"] = json!(namespace);
        value["metadata"]["resourceVersion"] = json!(state.version.to_string());
        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    fn update_sync<K: StoreObject>(
        &self,
        op: &str,
        obj: &K,
        mutate: impl FnOnce(&mut Value, Value),
    ) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        let incoming = serde_json::to_value(obj)?;

        let mut state = self.lock();
        state.calls.push(format!("{op} {kind} {namespace}/{name}"));

        if let Some(message) = state.write_failures.get(&(kind.clone(), name.clone())) {
            return Err(StoreError::Backend(message.clone()));
        }

        let key = (kind.clone(), namespace, name.clone());
        let Some(stored) = state.objects.get(&key).cloned() else {
            return Err(StoreError::NotFound { kind, name });
        };

        let stale = stored["metadata"]["resourceVersion"] != incoming["metadata"]["resourceVersion"];
        if stale || state.conflict_next_write {
            state.conflict_next_write = false;
            return Err(StoreError::Conflict { kind, name });
        }

        let mut updated = stored;
        mutate(&mut updated, incoming);
        state.version += 1;
        updated["metadata"]["resourceVersion"] = json!(state.version.to_string());

        let released = updated["metadata"]["deletionTimestamp"].is_string()
            && updated["metadata"]["finalizers"]
                .as_array()
                .is_none_or(|finalizers| finalizers.is_empty());
        if released {
            state.objects.remove(&key);
        } else {
            state.objects.insert(key, updated.clone());
        }

        Ok(serde_json::from_value(updated)?)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.get_sync(namespace, name)
    }

    async fn create<K: StoreObject>(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        self.create_sync(namespace, obj)
    }

    async fn replace<K: StoreObject>(&self, _namespace: &str, obj: &K) -> Result<K, StoreError> {
        self.update_sync("replace", obj, |stored, incoming| *stored = incoming)
    }

    async fn patch_finalizers<K: StoreObject>(
        &self,
        obj: &K,
        finalizers: Vec<String>,
    ) -> Result<K, StoreError> {
        self.update_sync("patch_finalizers", obj, move |stored, _| {
            stored["metadata"]["finalizers"] = json!(finalizers);
        })
    }

    async fn patch_status<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        self.update_sync("patch_status", obj, |stored, incoming| {
            merge_patch(stored, &json!({ "status": incoming["status"] }));
        })
    }
}

/// JSON merge patch (RFC 7386), as the API server applies it
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Value::Object(target_fields) = target {
        for (key, value) in fields {
            if value.is_null() {
                target_fields.remove(key);
            } else {
                merge_patch(target_fields.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[derive(Default)]
struct KeycloakState {
    calls: Vec<String>,
    failures: HashMap<String, (u16, String)>,
    client_scopes: HashMap<String, ClientScope>,
    groups: HashMap<String, Group>,
    auth_flows: HashMap<String, AuthFlow>,
    components: HashMap<String, Component>,
    next_scope_id: Option<String>,
    next_id: u64,
}

/// Recording `KeycloakApi` keeping objects per name
#[derive(Default)]
pub(crate) struct MockKeycloak {
    state: Mutex<KeycloakState>,
}

impl MockKeycloak {
    fn lock(&self) -> MutexGuard<'_, KeycloakState> {
        self.state.lock().unwrap()
    }

    /// Calls so far, as `"<op> <realm> <name or id>"`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Make `op` fail with `status`, 404 producing a not-found error
    pub fn fail(&self, op: &str, status: u16, message: &str) {
        self.lock()
            .failures
            .insert(op.to_string(), (status, message.to_string()));
    }

    /// Id returned by the next client scope creation
    pub fn next_scope_id(&self, id: &str) {
        self.lock().next_scope_id = Some(id.to_string());
    }

    pub fn insert_client_scope(&self, scope: ClientScope) {
        self.lock().client_scopes.insert(scope.name.clone(), scope);
    }

    pub fn client_scope(&self, name: &str) -> Option<ClientScope> {
        self.lock().client_scopes.get(name).cloned()
    }

    pub fn group(&self, name: &str) -> Option<Group> {
        self.lock().groups.get(name).cloned()
    }

    pub fn auth_flow(&self, alias: &str) -> Option<AuthFlow> {
        self.lock().auth_flows.get(alias).cloned()
    }

    pub fn component(&self, name: &str) -> Option<Component> {
        self.lock().components.get(name).cloned()
    }

    pub fn insert_component(&self, component: Component) {
        self.lock()
            .components
            .insert(component.name.clone(), component);
    }

    fn record(
        &self,
        op: &str,
        realm: &str,
        target: &str,
    ) -> Result<MutexGuard<'_, KeycloakState>, KeycloakError> {
        let mut state = self.lock();
        state.calls.push(format!("{op} {realm} {target}"));
        let failure = state.failures.get(op).cloned();
        match failure {
            Some((404, _)) => Err(KeycloakError::not_found(target)),
            Some((status, message)) => Err(KeycloakError::Status { status, message }),
            None => Ok(state),
        }
    }

    fn generated_id(state: &mut KeycloakState) -> String {
        state.next_id += 1;
        format!("id-{}", state.next_id)
    }
}

#[async_trait]
impl KeycloakApi for MockKeycloak {
    async fn get_client_scope(&self, realm: &str, name: &str) -> Result<ClientScope, KeycloakError> {
        let state = self.record("get_client_scope", realm, name)?;
        state
            .client_scopes
            .get(name)
            .cloned()
            .ok_or_else(|| KeycloakError::not_found(format!("client scope {name}")))
    }

    async fn create_client_scope(
        &self,
        realm: &str,
        scope: &ClientScope,
    ) -> Result<String, KeycloakError> {
        let mut state = self.record("create_client_scope", realm, &scope.name)?;
        let next = state.next_scope_id.take();
        let id = match next {
            Some(id) => id,
            None => Self::generated_id(&mut state),
        };
        let mut stored = scope.clone();
        stored.id = Some(id.clone());
        state.client_scopes.insert(scope.name.clone(), stored);
        Ok(id)
    }

    async fn update_client_scope(
        &self,
        realm: &str,
        id: &str,
        scope: &ClientScope,
    ) -> Result<(), KeycloakError> {
        let mut state = self.record("update_client_scope", realm, id)?;
        let mut stored = scope.clone();
        stored.id = Some(id.to_string());
        state.client_scopes.insert(scope.name.clone(), stored);
        Ok(())
    }

    async fn delete_client_scope(&self, realm: &str, id: &str) -> Result<(), KeycloakError> {
        let mut state = self.record("delete_client_scope", realm, id)?;
        let before = state.client_scopes.len();
        state
            .client_scopes
            .retain(|_, scope| scope.id.as_deref() != Some(id));
        if state.client_scopes.len() == before {
            return Err(KeycloakError::not_found(format!("client scope {id}")));
        }
        Ok(())
    }

    async fn sync_realm_group(&self, realm: &str, group: &Group) -> Result<String, KeycloakError> {
        let mut state = self.record("sync_realm_group", realm, &group.name)?;
        let existing = state.groups.get(&group.name).and_then(|g| g.id.clone());
        let id = match existing {
            Some(id) => id,
            None => Self::generated_id(&mut state),
        };
        let mut stored = group.clone();
        stored.id = Some(id.clone());
        state.groups.insert(group.name.clone(), stored);
        Ok(id)
    }

    async fn delete_group(&self, realm: &str, name: &str) -> Result<(), KeycloakError> {
        let mut state = self.record("delete_group", realm, name)?;
        state
            .groups
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| KeycloakError::not_found(format!("group {name}")))
    }

    async fn sync_auth_flow(&self, realm: &str, flow: &AuthFlow) -> Result<(), KeycloakError> {
        let mut state = self.record("sync_auth_flow", realm, &flow.alias)?;
        state.auth_flows.insert(flow.alias.clone(), flow.clone());
        Ok(())
    }

    async fn delete_auth_flow(&self, realm: &str, alias: &str) -> Result<(), KeycloakError> {
        let mut state = self.record("delete_auth_flow", realm, alias)?;
        state
            .auth_flows
            .remove(alias)
            .map(|_| ())
            .ok_or_else(|| KeycloakError::not_found(format!("auth flow {alias}")))
    }

    async fn get_component(&self, realm: &str, name: &str) -> Result<Component, KeycloakError> {
        let state = self.record("get_component", realm, name)?;
        state
            .components
            .get(name)
            .cloned()
            .ok_or_else(|| KeycloakError::not_found(format!("component {name}")))
    }

    async fn create_component(
        &self,
        realm: &str,
        component: &Component,
    ) -> Result<(), KeycloakError> {
        let mut state = self.record("create_component", realm, &component.name)?;
        let mut stored = component.clone();
        stored.id = Some(Self::generated_id(&mut state));
        state.components.insert(component.name.clone(), stored);
        Ok(())
    }

    async fn update_component(
        &self,
        realm: &str,
        component: &Component,
    ) -> Result<(), KeycloakError> {
        let mut state = self.record("update_component", realm, &component.name)?;
        state
            .components
            .insert(component.name.clone(), component.clone());
        Ok(())
    }

    async fn delete_component(&self, realm: &str, name: &str) -> Result<(), KeycloakError> {
        let mut state = self.record("delete_component", realm, name)?;
        state
            .components
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| KeycloakError::not_found(format!("component {name}")))
    }
}

/// `AdapterFactory` handing out one shared `MockKeycloak`
pub(crate) struct MockFactory {
    pub client: Arc<MockKeycloak>,
    auth_error: Mutex<Option<String>>,
    authentications: AtomicUsize,
    logins: Mutex<Vec<(String, String)>>,
    built: Mutex<Vec<(String, String)>>,
}

impl Default for MockFactory {
    fn default() -> Self {
        Self {
            client: Arc::new(MockKeycloak::default()),
            auth_error: Mutex::new(None),
            authentications: AtomicUsize::new(0),
            logins: Mutex::new(Vec::new()),
            built: Mutex::new(Vec::new()),
        }
    }
}

impl MockFactory {
    /// Make every handshake fail with a rejected request carrying `message`
    pub fn fail_authentication(&self, message: &str) {
        *self.auth_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn authentications(&self) -> usize {
        self.authentications.load(Ordering::SeqCst)
    }

    /// `(base_url, username)` of every handshake
    pub fn logins(&self) -> Vec<(String, String)> {
        self.logins.lock().unwrap().clone()
    }

    /// `(base_url, token)` of every built client
    pub fn built(&self) -> Vec<(String, String)> {
        self.built.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdapterFactory for MockFactory {
    async fn authenticate(
        &self,
        base_url: &str,
        credentials: &Credentials,
    ) -> Result<AccessToken, KeycloakError> {
        let attempt = self.authentications.fetch_add(1, Ordering::SeqCst) + 1;
        self.logins
            .lock()
            .unwrap()
            .push((base_url.to_string(), credentials.username().to_string()));

        if let Some(message) = self.auth_error.lock().unwrap().clone() {
            return Err(KeycloakError::Rejected {
                status: 401,
                message,
            });
        }

        Ok(AccessToken::new(
            format!("token-{attempt}"),
            Utc::now() + Duration::hours(1),
        ))
    }

    fn build(&self, base_url: &str, token: AccessToken) -> Arc<dyn KeycloakApi> {
        self.built
            .lock()
            .unwrap()
            .push((base_url.to_string(), token.secret().to_string()));
        Arc::clone(&self.client) as Arc<dyn KeycloakApi>
    }
}

pub(crate) const NAMESPACE: &str = "ns";

/// Keycloak `main` at `https://keycloak.example.com`, credentials in secret `keycloak-admin`
pub(crate) fn keycloak(connected: bool) -> Keycloak {
    let mut keycloak = Keycloak::new(
        "main",
        KeycloakSpec {
            url: "https://keycloak.example.com".to_string(),
            secret: "keycloak-admin".to_string(),
            admin_type: AdminType::User,
        },
    );
    keycloak.metadata.namespace = Some(NAMESPACE.to_string());
    keycloak.metadata.uid = Some("uid-main".to_string());
    keycloak.status = Some(KeycloakStatus { connected });
    keycloak
}

pub(crate) fn credential_secret(username: &str, password: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some("keycloak-admin".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([
            ("username".to_string(), ByteString(username.as_bytes().to_vec())),
            ("password".to_string(), ByteString(password.as_bytes().to_vec())),
        ])),
        ..Secret::default()
    }
}

/// Realm resource `name` mapping to the Keycloak realm `realm_name`, owned by `main`
pub(crate) fn realm(name: &str, realm_name: &str) -> KeycloakRealm {
    let mut realm = KeycloakRealm::new(
        name,
        KeycloakRealmSpec {
            realm_name: realm_name.to_string(),
            keycloak_owner: Some("main".to_string()),
        },
    );
    realm.metadata.namespace = Some(NAMESPACE.to_string());
    realm
}

/// Store holding a connected Keycloak `main`, its credentials and realm `realm` (`ns.test`)
pub(crate) fn seeded_store() -> MemoryStore {
    let store = MemoryStore::default();
    store.insert(&keycloak(true));
    store.insert(&credential_secret("admin", "s3cr3t"));
    store.insert(&realm("realm", "ns.test"));
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_patch_removes_null_fields_and_keeps_absent_ones() {
        let mut stored = json!({
            "metadata": { "name": "scope1" },
            "status": { "value": "boom", "failureCount": 2, "nextReconcileTime": "soon" }
        });

        merge_patch(
            &mut stored,
            &json!({ "status": { "value": "OK", "failureCount": 0, "nextReconcileTime": null } }),
        );

        assert_eq!(
            stored,
            json!({
                "metadata": { "name": "scope1" },
                "status": { "value": "OK", "failureCount": 0 }
            })
        );
    }
}
