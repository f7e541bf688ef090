//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions of every resource managed by the
//! operator as a multi-document YAML stream.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/keycloak-operator.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use keycloak_operator::crd::{
    Keycloak, KeycloakAuthFlow, KeycloakClientScope, KeycloakRealm, KeycloakRealmComponent,
    KeycloakRealmGroup,
};
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        Keycloak::crd(),
        KeycloakRealm::crd(),
        KeycloakClientScope::crd(),
        KeycloakRealmGroup::crd(),
        KeycloakAuthFlow::crd(),
        KeycloakRealmComponent::crd(),
    ];

    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }

    Ok(())
}
