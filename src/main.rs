//! # Keycloak Operator
//!
//! A Kubernetes operator that reconciles Keycloak realm resources against a
//! Keycloak server.
//!
//! ## Overview
//!
//! - **Keycloak** resources describe a server and the secret holding its admin credentials
//! - **KeycloakRealm** resources own the realm children below
//! - **KeycloakClientScope**, **KeycloakRealmGroup**, **KeycloakAuthFlow** and
//!   **KeycloakRealmComponent** are synchronised to the realm and deleted from it
//!   when the resource is deleted
//!
//! ## Features
//!
//! - **Token cache**: admin tokens are stored in a `kc-token-<name>` secret owned by the `Keycloak` resource
//! - **Finalizers**: remote objects are removed before their resource is released
//! - **Failure backoff**: consecutive failures are counted in the status and retried with a Fibonacci delay
//! - **Prometheus metrics**: exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use anyhow::Result;
use keycloak_operator::runtime::initialization::initialize;
use keycloak_operator::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init).await
}
