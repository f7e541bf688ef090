//! # Keycloak Adapter
//!
//! Authenticated access to the Keycloak admin REST API.
//!
//! - `KeycloakApi` - CRUD operations on realm objects, scoped to one authenticated session
//! - `AdapterFactory` - authentication entry point and construction of `KeycloakApi` handles
//! - `HttpAdapterFactory` - reqwest implementation of both

mod auth;
mod error;
mod http;
mod types;

pub use auth::{AccessToken, Credentials};
pub use error::KeycloakError;
pub use http::{HttpAdapterFactory, HttpKeycloakClient};
pub use types::{
    AuthFlow, AuthenticationExecution, AuthenticatorConfig, ClientScope, Component, Group,
    ProtocolMapper,
};

use async_trait::async_trait;
use std::sync::Arc;

/// Operations on the objects of one realm
///
/// Lookups return `KeycloakError::NotFound` when the object does not exist,
/// deletes of absent objects do the same.
#[async_trait]
pub trait KeycloakApi: Send + Sync {
    /// Find a client scope by name
    async fn get_client_scope(&self, realm: &str, name: &str) -> Result<ClientScope, KeycloakError>;

    /// Create a client scope, returning the id assigned by the server
    async fn create_client_scope(
        &self,
        realm: &str,
        scope: &ClientScope,
    ) -> Result<String, KeycloakError>;

    async fn update_client_scope(
        &self,
        realm: &str,
        id: &str,
        scope: &ClientScope,
    ) -> Result<(), KeycloakError>;

    async fn delete_client_scope(&self, realm: &str, id: &str) -> Result<(), KeycloakError>;

    /// Create or update a top-level group, returning its id
    async fn sync_realm_group(&self, realm: &str, group: &Group) -> Result<String, KeycloakError>;

    async fn delete_group(&self, realm: &str, name: &str) -> Result<(), KeycloakError>;

    /// Create or replace an authentication flow and its executions
    async fn sync_auth_flow(&self, realm: &str, flow: &AuthFlow) -> Result<(), KeycloakError>;

    async fn delete_auth_flow(&self, realm: &str, alias: &str) -> Result<(), KeycloakError>;

    /// Find a component by name
    async fn get_component(&self, realm: &str, name: &str) -> Result<Component, KeycloakError>;

    async fn create_component(&self, realm: &str, component: &Component)
        -> Result<(), KeycloakError>;

    /// Update a component, `component.id` must be set
    async fn update_component(&self, realm: &str, component: &Component)
        -> Result<(), KeycloakError>;

    async fn delete_component(&self, realm: &str, name: &str) -> Result<(), KeycloakError>;
}

/// Authentication entry point and handle construction
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    /// Run the token handshake against `base_url`
    async fn authenticate(
        &self,
        base_url: &str,
        credentials: &Credentials,
    ) -> Result<AccessToken, KeycloakError>;

    /// Wrap an access token into a client for `base_url`
    fn build(&self, base_url: &str, token: AccessToken) -> Arc<dyn KeycloakApi>;
}
