//! # KeycloakRealmComponent
//!
//! A realm component (user storage provider, key provider, ...), addressed
//! remotely by name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    kube::CustomResource, Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema,
)]
#[kube(
    kind = "KeycloakRealmComponent",
    group = "v1.edp.epam.com",
    version = "v1",
    namespaced,
    status = "crate::crd::KeycloakChildStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.value"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmComponentSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    pub provider_id: String,
    pub provider_type: String,
    #[serde(default)]
    pub config: BTreeMap<String, Vec<String>>,
}
