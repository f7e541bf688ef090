//! # KeycloakRealmGroup
//!
//! A top-level group inside a realm.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    kube::CustomResource, Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema,
)]
#[kube(
    kind = "KeycloakRealmGroup",
    group = "v1.edp.epam.com",
    version = "v1",
    namespaced,
    status = "crate::crd::KeycloakChildStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.value"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmGroupSpec {
    /// Group name, unique among the realm's top-level groups
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub realm_roles: Vec<String>,
}
