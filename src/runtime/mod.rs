//! # Runtime
//!
//! Process bootstrap and the controller watch loops.
//!
//! - `initialization`: rustls, logging, metrics, HTTP server and Kubernetes client setup
//! - `watch_loop`: one `kube_runtime::Controller` per resource kind
//! - `error_policy`: requeue decisions for failed reconciliations and watch errors

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
