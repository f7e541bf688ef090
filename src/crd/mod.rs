//! # Custom Resource Definitions
//!
//! CRD types managed by the operator.
//!
//! ## Module Structure
//!
//! - `keycloak.rs` - `Keycloak`, the connection scope (parent of realms)
//! - `realm.rs` - `KeycloakRealm`, parent of every realm child
//! - `client_scope.rs`, `realm_group.rs`, `auth_flow.rs`, `realm_component.rs` - realm children
//! - `status.rs` - status shared by every realm child

mod auth_flow;
mod client_scope;
mod keycloak;
mod realm;
mod realm_component;
mod realm_group;
mod status;

pub use auth_flow::{
    AuthenticationExecution, AuthenticatorConfig, KeycloakAuthFlow, KeycloakAuthFlowSpec,
};
pub use client_scope::{KeycloakClientScope, KeycloakClientScopeSpec, ProtocolMapper};
pub use keycloak::{AdminType, Keycloak, KeycloakSpec, KeycloakStatus};
pub use realm::{KeycloakRealm, KeycloakRealmSpec};
pub use realm_component::{KeycloakRealmComponent, KeycloakRealmComponentSpec};
pub use realm_group::{KeycloakRealmGroup, KeycloakRealmGroupSpec};
pub use status::KeycloakChildStatus;

/// A resource that lives inside exactly one `KeycloakRealm`
///
/// The realm is found through the owner references first, `realm_ref` is the
/// fallback taken from the spec.
pub trait RealmChildResource {
    /// Realm name from the spec (`spec.realm`), if set
    fn realm_ref(&self) -> Option<&str>;

    fn child_status(&self) -> Option<&KeycloakChildStatus>;

    /// Status block, created empty on first access
    fn child_status_mut(&mut self) -> &mut KeycloakChildStatus;
}

macro_rules! realm_child {
    ($kind:ty) => {
        impl RealmChildResource for $kind {
            fn realm_ref(&self) -> Option<&str> {
                self.spec.realm.as_deref().filter(|realm| !realm.is_empty())
            }

            fn child_status(&self) -> Option<&KeycloakChildStatus> {
                self.status.as_ref()
            }

            fn child_status_mut(&mut self) -> &mut KeycloakChildStatus {
                self.status.get_or_insert_with(KeycloakChildStatus::default)
            }
        }
    };
}

realm_child!(KeycloakClientScope);
realm_child!(KeycloakRealmGroup);
realm_child!(KeycloakAuthFlow);
realm_child!(KeycloakRealmComponent);
