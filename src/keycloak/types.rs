//! # Keycloak Representations
//!
//! JSON bodies of the Keycloak admin REST API used by the adapter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub protocol_mappers: Vec<ProtocolMapper>,
    /// Realm default scope flag, not part of the representation
    #[serde(skip)]
    pub default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMapper {
    pub name: String,
    pub protocol: String,
    pub protocol_mapper: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Applied through the role mapping endpoint
    #[serde(default, skip_serializing)]
    pub realm_roles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthFlow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub alias: String,
    #[serde(default)]
    pub description: String,
    pub provider_id: String,
    #[serde(default)]
    pub top_level: bool,
    #[serde(default)]
    pub built_in: bool,
    /// Created one by one after the flow itself
    #[serde(default, skip_serializing)]
    pub authentication_executions: Vec<AuthenticationExecution>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationExecution {
    pub authenticator: String,
    pub requirement: String,
    pub priority: i32,
    pub authenticator_flow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_config: Option<AuthenticatorConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatorConfig {
    pub alias: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub provider_id: String,
    pub provider_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, Vec<String>>,
}

/// Response of the OpenID Connect token endpoint
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: i64,
}

/// Entry of `GET /authentication/flows/{alias}/executions`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FlowExecution {
    pub id: String,
    #[serde(default)]
    pub level: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RealmRef {
    pub id: String,
}
