//! # KeycloakAuthFlow
//!
//! An authentication flow inside a realm, addressed remotely by alias.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    kube::CustomResource, Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema,
)]
#[kube(
    kind = "KeycloakAuthFlow",
    group = "v1.edp.epam.com",
    version = "v1",
    namespaced,
    status = "crate::crd::KeycloakChildStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.value"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakAuthFlowSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    pub alias: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub top_level: bool,
    #[serde(default)]
    pub built_in: bool,
    #[serde(default)]
    pub authentication_executions: Vec<AuthenticationExecution>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationExecution {
    pub authenticator: String,
    /// REQUIRED, ALTERNATIVE, DISABLED or CONDITIONAL
    #[serde(default)]
    pub requirement: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub authenticator_flow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_config: Option<AuthenticatorConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorConfig {
    pub alias: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

fn default_provider_id() -> String {
    "basic-flow".to_string()
}
