//! # Keycloak
//!
//! Connection scope of a Keycloak server: address, admin credentials and the
//! connectivity flag maintained by the connection reconciler.

use serde::{Deserialize, Serialize};

/// Keycloak Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: v1.edp.epam.com/v1
/// kind: Keycloak
/// metadata:
///   name: main
///   namespace: security
/// spec:
///   url: https://keycloak.example.com
///   secret: keycloak-admin
///   adminType: serviceAccount
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema,
)]
#[kube(
    kind = "Keycloak",
    group = "v1.edp.epam.com",
    version = "v1",
    namespaced,
    status = "KeycloakStatus",
    printcolumn = r#"{"name":"Connected", "type":"boolean", "jsonPath":".status.connected"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakSpec {
    /// Root address of the Keycloak server
    pub url: String,
    /// Name of the secret (same namespace) holding `username` and `password`
    pub secret: String,
    /// How the admin credentials authenticate
    #[serde(default)]
    pub admin_type: AdminType,
}

/// Kind of admin account referenced by `KeycloakSpec::secret`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AdminType {
    /// Human admin, authenticated with the password grant of `admin-cli`
    #[default]
    User,
    /// Confidential client, authenticated with the client credentials grant
    ServiceAccount,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakStatus {
    /// Set once the operator authenticated successfully against `spec.url`
    #[serde(default)]
    pub connected: bool,
}

impl Keycloak {
    /// Whether the instance has been marked connectable
    pub fn is_connected(&self) -> bool {
        self.status.as_ref().is_some_and(|status| status.connected)
    }
}
