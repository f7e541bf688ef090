//! # Realm Child Strategies
//!
//! What differs between the realm child kinds: the finalizer, the mapping from
//! spec to Keycloak representation, the remote sync call and the remote object
//! to delete. Everything else lives in the engine.

use crate::constants::{
    AUTH_FLOW_FINALIZER, CLIENT_SCOPE_FINALIZER, REALM_COMPONENT_FINALIZER, REALM_GROUP_FINALIZER,
};
use crate::controller::store::StoreObject;
use crate::controller::terminator::RemoteObject;
use crate::crd::{
    KeycloakAuthFlow, KeycloakAuthFlowSpec, KeycloakClientScope, KeycloakClientScopeSpec,
    KeycloakRealmComponent, KeycloakRealmComponentSpec, KeycloakRealmGroup,
    KeycloakRealmGroupSpec, RealmChildResource,
};
use crate::keycloak::{
    AuthFlow, AuthenticationExecution, AuthenticatorConfig, ClientScope, Component, Group,
    KeycloakApi, KeycloakError, ProtocolMapper,
};
use async_trait::async_trait;

/// A realm child kind handled by the reconciliation engine
#[async_trait]
pub trait RealmChild: StoreObject + RealmChildResource {
    /// Finalizer guarding the remote object
    const FINALIZER: &'static str;

    /// Kind as used in error messages, e.g. "auth flow"
    const LABEL: &'static str;

    /// Create or update the remote object in `realm`
    ///
    /// Returns the remote id for kinds that are addressed by id.
    async fn sync(
        &self,
        client: &dyn KeycloakApi,
        realm: &str,
    ) -> Result<Option<String>, KeycloakError>;

    /// Remote object to delete once the resource goes away
    fn remote_object(&self, realm: &str) -> RemoteObject;
}

#[async_trait]
impl RealmChild for KeycloakClientScope {
    const FINALIZER: &'static str = CLIENT_SCOPE_FINALIZER;
    const LABEL: &'static str = "client scope";

    async fn sync(
        &self,
        client: &dyn KeycloakApi,
        realm: &str,
    ) -> Result<Option<String>, KeycloakError> {
        let desired = ClientScope::from(&self.spec);

        let id = match client.get_client_scope(realm, &self.spec.name).await {
            Ok(existing) => {
                let id = existing.id.ok_or_else(|| {
                    KeycloakError::Decode(format!("client scope {} has no id", self.spec.name))
                })?;
                client.update_client_scope(realm, &id, &desired).await?;
                id
            }
            Err(e) if e.is_not_found() => client.create_client_scope(realm, &desired).await?,
            Err(e) => return Err(e),
        };

        Ok(Some(id))
    }

    fn remote_object(&self, realm: &str) -> RemoteObject {
        RemoteObject::ClientScope {
            realm: realm.to_string(),
            name: self.spec.name.clone(),
            id: self
                .status
                .as_ref()
                .and_then(|status| status.id.clone())
                .filter(|id| !id.is_empty()),
        }
    }
}

#[async_trait]
impl RealmChild for KeycloakRealmGroup {
    const FINALIZER: &'static str = REALM_GROUP_FINALIZER;
    const LABEL: &'static str = "realm group";

    async fn sync(
        &self,
        client: &dyn KeycloakApi,
        realm: &str,
    ) -> Result<Option<String>, KeycloakError> {
        let id = client
            .sync_realm_group(realm, &Group::from(&self.spec))
            .await?;
        Ok(Some(id))
    }

    fn remote_object(&self, realm: &str) -> RemoteObject {
        RemoteObject::Group {
            realm: realm.to_string(),
            name: self.spec.name.clone(),
        }
    }
}

#[async_trait]
impl RealmChild for KeycloakAuthFlow {
    const FINALIZER: &'static str = AUTH_FLOW_FINALIZER;
    const LABEL: &'static str = "auth flow";

    async fn sync(
        &self,
        client: &dyn KeycloakApi,
        realm: &str,
    ) -> Result<Option<String>, KeycloakError> {
        client
            .sync_auth_flow(realm, &AuthFlow::from(&self.spec))
            .await?;
        Ok(None)
    }

    fn remote_object(&self, realm: &str) -> RemoteObject {
        RemoteObject::AuthFlow {
            realm: realm.to_string(),
            alias: self.spec.alias.clone(),
        }
    }
}

#[async_trait]
impl RealmChild for KeycloakRealmComponent {
    const FINALIZER: &'static str = REALM_COMPONENT_FINALIZER;
    const LABEL: &'static str = "realm component";

    async fn sync(
        &self,
        client: &dyn KeycloakApi,
        realm: &str,
    ) -> Result<Option<String>, KeycloakError> {
        let mut desired = Component::from(&self.spec);

        match client.get_component(realm, &self.spec.name).await {
            Ok(existing) => {
                desired.id = existing.id;
                desired.parent_id = existing.parent_id;
                client.update_component(realm, &desired).await?;
            }
            Err(e) if e.is_not_found() => client.create_component(realm, &desired).await?,
            Err(e) => return Err(e),
        }

        Ok(None)
    }

    fn remote_object(&self, realm: &str) -> RemoteObject {
        RemoteObject::Component {
            realm: realm.to_string(),
            name: self.spec.name.clone(),
        }
    }
}

impl From<&KeycloakClientScopeSpec> for ClientScope {
    fn from(spec: &KeycloakClientScopeSpec) -> Self {
        Self {
            id: None,
            name: spec.name.clone(),
            description: spec.description.clone(),
            protocol: spec.protocol.clone(),
            attributes: spec.attributes.clone(),
            protocol_mappers: spec
                .protocol_mappers
                .iter()
                .map(|mapper| ProtocolMapper {
                    name: mapper.name.clone(),
                    protocol: mapper.protocol.clone(),
                    protocol_mapper: mapper.protocol_mapper.clone(),
                    config: mapper.config.clone(),
                })
                .collect(),
            default: spec.default,
        }
    }
}

impl From<&KeycloakRealmGroupSpec> for Group {
    fn from(spec: &KeycloakRealmGroupSpec) -> Self {
        Self {
            id: None,
            name: spec.name.clone(),
            path: spec.path.clone(),
            attributes: spec.attributes.clone(),
            realm_roles: spec.realm_roles.clone(),
        }
    }
}

impl From<&KeycloakAuthFlowSpec> for AuthFlow {
    fn from(spec: &KeycloakAuthFlowSpec) -> Self {
        Self {
            id: None,
            alias: spec.alias.clone(),
            description: spec.description.clone(),
            provider_id: spec.provider_id.clone(),
            top_level: spec.top_level,
            built_in: spec.built_in,
            authentication_executions: spec
                .authentication_executions
                .iter()
                .map(|execution| AuthenticationExecution {
                    authenticator: execution.authenticator.clone(),
                    requirement: execution.requirement.clone(),
                    priority: execution.priority,
                    authenticator_flow: execution.authenticator_flow,
                    authenticator_config: execution.authenticator_config.as_ref().map(|config| {
                        AuthenticatorConfig {
                            alias: config.alias.clone(),
                            config: config.config.clone(),
                        }
                    }),
                })
                .collect(),
        }
    }
}

impl From<&KeycloakRealmComponentSpec> for Component {
    fn from(spec: &KeycloakRealmComponentSpec) -> Self {
        Self {
            id: None,
            name: spec.name.clone(),
            provider_id: spec.provider_id.clone(),
            provider_type: spec.provider_type.clone(),
            parent_id: None,
            config: spec.config.clone(),
        }
    }
}
