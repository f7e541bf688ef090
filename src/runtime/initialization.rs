//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::ControllerConfig;
use crate::controller::engine::Context;
use crate::controller::provisioner::Provisioner;
use crate::controller::server::{start_server, ServerState};
use crate::controller::store::KubeStore;
use crate::keycloak::{AdapterFactory, HttpAdapterFactory};
use crate::observability;
use anyhow::{Context as _, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};

/// Initialization result containing all necessary components for the controllers
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Context shared by every reconciler
    pub context: Arc<Context<KubeStore>>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field(
                "server_ready",
                &self
                    .server_state
                    .is_ready
                    .load(std::sync::atomic::Ordering::Relaxed),
            )
            .field("watch_namespace", &self.context.config.watch_namespace)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciliation context setup
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before any TLS connection is opened
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let config = ControllerConfig::from_env();
    observability::logging::init_logging(&config)?;

    info!("Starting Keycloak Operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let server_state_for_server = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_for_server).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let store = Arc::new(KubeStore::new(client.clone()));
    let factory = HttpAdapterFactory::new(config.keycloak_http_timeout())
        .context("Failed to create Keycloak HTTP client")?;
    let provisioner = Provisioner::new(
        Arc::clone(&store),
        Arc::new(factory) as Arc<dyn AdapterFactory>,
        config.token_expiry_skew_secs,
    );
    let context = Arc::new(Context::new(store, Arc::new(provisioner), config));

    info!("Controller initialized, starting watch loops...");

    Ok(InitializationResult {
        client,
        context,
        server_state,
    })
}
