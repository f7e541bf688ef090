//! # KeycloakClientScope
//!
//! A client scope inside a realm, addressed remotely by the id stored in status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    kube::CustomResource, Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema,
)]
#[kube(
    kind = "KeycloakClientScope",
    group = "v1.edp.epam.com",
    version = "v1",
    namespaced,
    status = "crate::crd::KeycloakChildStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.value"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakClientScopeSpec {
    /// Name of the client scope on the Keycloak server
    pub name: String,
    /// Fallback realm resource name when no owner reference is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Whether the scope is a realm default scope
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub protocol_mappers: Vec<ProtocolMapper>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMapper {
    pub name: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub protocol_mapper: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

fn default_protocol() -> String {
    "openid-connect".to_string()
}
