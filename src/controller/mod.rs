//! # Controller
//!
//! Core controller modules for the Keycloak Operator.
//!
//! - `store`: Kubernetes object store abstraction (create, replace, finalizers, status)
//! - `ownership`: resolves the realm and Keycloak instance owning a resource
//! - `provisioner`: hands out authenticated Keycloak clients, caching admin tokens
//! - `terminator`: finalizer protocol guarding remote deletion
//! - `backoff`: failure counter and Fibonacci retry delays
//! - `strategy`: per-kind synchronisation of realm children
//! - `engine`: shared reconciliation of realm children
//! - `keycloak`: connectivity reconciliation of `Keycloak` resources
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod engine;
pub mod keycloak;
pub mod ownership;
pub mod provisioner;
pub mod server;
pub mod store;
pub mod strategy;
pub mod terminator;
