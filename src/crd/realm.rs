//! # KeycloakRealm
//!
//! A realm on a Keycloak server. Realms are parents of every other resource
//! kind and are themselves owned by a `Keycloak`.

use serde::{Deserialize, Serialize};

/// KeycloakRealm Custom Resource Definition
///
/// The owning `Keycloak` comes from an owner reference of kind `Keycloak`,
/// or from `spec.keycloakOwner` when no such reference exists.
#[derive(
    kube::CustomResource, Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema,
)]
#[kube(
    kind = "KeycloakRealm",
    group = "v1.edp.epam.com",
    version = "v1",
    namespaced,
    printcolumn = r#"{"name":"Realm", "type":"string", "jsonPath":".spec.realmName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmSpec {
    /// Name of the realm on the Keycloak server
    pub realm_name: String,
    /// Name of the owning `Keycloak` resource (same namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keycloak_owner: Option<String>,
}

impl KeycloakRealm {
    /// Keycloak owner name from the spec, if set
    pub fn keycloak_owner_ref(&self) -> Option<&str> {
        self.spec
            .keycloak_owner
            .as_deref()
            .filter(|owner| !owner.is_empty())
    }
}
