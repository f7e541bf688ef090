//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use keycloak_operator::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (Keycloak, KeycloakRealm, KeycloakClientScope, etc.)
//! - The Keycloak client traits (KeycloakApi, AdapterFactory)
//! - Reconciliation types (Context, ReconcileError, ClientProvider, etc.)
//! - Config types (ControllerConfig)

// CRD types - most commonly used
pub use crate::crd::*;

// Keycloak admin API
pub use crate::keycloak::{AdapterFactory, KeycloakApi, KeycloakError};

// Reconciliation core
pub use crate::controller::backoff::{FailureCountable, FailureTracker};
pub use crate::controller::engine::{reconcile, Context, ReconcileError};
pub use crate::controller::ownership::OwnershipError;
pub use crate::controller::provisioner::{ClientProvider, ProvisionError, Provisioner};
pub use crate::controller::store::{KubeStore, ObjectStore, StoreError, StoreObject};
pub use crate::controller::strategy::RealmChild;
pub use crate::controller::terminator::{try_to_delete, Terminator, TerminationError};

// Config types
pub use crate::config::ControllerConfig;
