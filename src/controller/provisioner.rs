//! # Client Provisioning
//!
//! Builds an authenticated Keycloak client for a realm or a Keycloak instance.
//!
//! 1. The Keycloak instance must be marked connected.
//! 2. Admin credentials are read from the secret named by `spec.secret`.
//! 3. A still valid token cached in secret `kc-token-<keycloak name>` is reused,
//!    otherwise a token handshake runs and the new token is written back to the
//!    cache. Cache writes are best effort: a failure is logged and ignored.
//!
//! Concurrent provisioning for the same instance may race on the cache secret,
//! the last writer wins. Credentials and tokens are never logged.

use crate::constants::{
    CREDENTIALS_PASSWORD_KEY, CREDENTIALS_USERNAME_KEY, TOKEN_SECRET_KEY, TOKEN_SECRET_PREFIX,
};
use crate::controller::ownership::{keycloak_owner, OwnershipError};
use crate::controller::store::{ObjectStore, StoreError};
use crate::crd::{Keycloak, KeycloakRealm};
use crate::keycloak::{AccessToken, AdapterFactory, Credentials, KeycloakApi, KeycloakError};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Owner(#[from] OwnershipError),

    #[error("keycloak {name} is not connected")]
    ParentNotConnected { name: String },

    #[error("unable to read credentials from secret {secret}: {reason}")]
    CredentialLookup { secret: String, reason: String },

    #[error("could not get token: {0}")]
    Authentication(#[source] KeycloakError),
}

impl ProvisionError {
    /// Network level failures, as opposed to rejected credentials or missing objects
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Authentication(e) if e.is_transient())
    }
}

/// Hands out authenticated Keycloak clients
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Client for the Keycloak instance owning `realm`
    async fn client_for_realm(
        &self,
        realm: &KeycloakRealm,
    ) -> Result<Arc<dyn KeycloakApi>, ProvisionError>;

    async fn client_for_keycloak(
        &self,
        keycloak: &Keycloak,
    ) -> Result<Arc<dyn KeycloakApi>, ProvisionError>;

    /// Fresh handshake with the credentials of `keycloak`, ignoring its status and the cache
    async fn connect(&self, keycloak: &Keycloak) -> Result<(), ProvisionError>;
}

/// Name of the secret caching the access token of Keycloak `keycloak_name`
pub fn token_secret_name(keycloak_name: &str) -> String {
    format!("{TOKEN_SECRET_PREFIX}-{keycloak_name}")
}

/// `ClientProvider` reading credentials and cached tokens from the store
pub struct Provisioner<S> {
    store: Arc<S>,
    factory: Arc<dyn AdapterFactory>,
    token_expiry_skew_secs: i64,
}

impl<S> std::fmt::Debug for Provisioner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("token_expiry_skew_secs", &self.token_expiry_skew_secs)
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore> Provisioner<S> {
    pub fn new(store: Arc<S>, factory: Arc<dyn AdapterFactory>, token_expiry_skew_secs: i64) -> Self {
        Self {
            store,
            factory,
            token_expiry_skew_secs,
        }
    }

    /// Admin credentials of `keycloak`
    pub async fn credentials(&self, keycloak: &Keycloak) -> Result<Credentials, ProvisionError> {
        let secret_name = keycloak.spec.secret.as_str();
        let lookup_error = |reason: String| ProvisionError::CredentialLookup {
            secret: secret_name.to_string(),
            reason,
        };

        if secret_name.is_empty() {
            return Err(lookup_error("no secret referenced".to_string()));
        }

        let namespace = keycloak.namespace().unwrap_or_default();
        let secret: Secret = self
            .store
            .get(&namespace, secret_name)
            .await
            .map_err(|e| lookup_error(e.to_string()))?;

        let data = secret.data.unwrap_or_default();
        let field = |key: &str| {
            data.get(key)
                .map(|value| String::from_utf8_lossy(&value.0).into_owned())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| lookup_error(format!("key {key} is missing")))
        };

        Ok(Credentials::new(
            field(CREDENTIALS_USERNAME_KEY)?,
            field(CREDENTIALS_PASSWORD_KEY)?,
            keycloak.spec.admin_type,
        ))
    }

    /// Access token for `keycloak`, from the cache when still valid
    pub async fn token(&self, keycloak: &Keycloak) -> Result<AccessToken, ProvisionError> {
        let credentials = self.credentials(keycloak).await?;

        if let Some(token) = self.cached_token(keycloak).await {
            metrics::increment_token_cache_hits();
            debug!(keycloak = %keycloak.name_any(), "Using cached access token");
            return Ok(token);
        }

        metrics::increment_token_cache_misses();
        self.authenticate(keycloak, &credentials).await
    }

    /// Run a fresh token handshake for `keycloak` and refresh the cache
    pub async fn login(&self, keycloak: &Keycloak) -> Result<AccessToken, ProvisionError> {
        let credentials = self.credentials(keycloak).await?;
        self.authenticate(keycloak, &credentials).await
    }

    async fn authenticate(
        &self,
        keycloak: &Keycloak,
        credentials: &Credentials,
    ) -> Result<AccessToken, ProvisionError> {
        info!(keycloak = %keycloak.name_any(), url = %keycloak.spec.url, "Authenticating against Keycloak");

        let started = Instant::now();
        let result = self
            .factory
            .authenticate(&keycloak.spec.url, credentials)
            .await;
        metrics::observe_authentication_duration(started.elapsed().as_secs_f64());

        let token = result.map_err(|e| {
            metrics::increment_authentication_failures();
            ProvisionError::Authentication(e)
        })?;

        self.persist_token(keycloak, &token).await;
        Ok(token)
    }

    async fn cached_token(&self, keycloak: &Keycloak) -> Option<AccessToken> {
        let namespace = keycloak.namespace().unwrap_or_default();
        let name = token_secret_name(&keycloak.name_any());

        let secret: Secret = match self.store.get(&namespace, &name).await {
            Ok(secret) => secret,
            Err(e) if e.is_not_found() => return None,
            Err(e) => {
                warn!(secret = %name, error = %e, "Unable to read token cache");
                return None;
            }
        };

        let raw = secret.data.as_ref()?.get(TOKEN_SECRET_KEY)?;
        match serde_json::from_slice::<AccessToken>(&raw.0) {
            Ok(token) if token.is_valid_at(Utc::now(), self.token_expiry_skew_secs) => Some(token),
            Ok(_) => {
                debug!(secret = %name, "Cached access token expired");
                None
            }
            Err(e) => {
                warn!(secret = %name, error = %e, "Ignoring malformed token cache");
                None
            }
        }
    }

    async fn persist_token(&self, keycloak: &Keycloak, token: &AccessToken) {
        if let Err(e) = self.write_token(keycloak, token).await {
            metrics::increment_token_cache_write_failures();
            warn!(
                secret = %token_secret_name(&keycloak.name_any()),
                error = %e,
                "Unable to persist access token, continuing without cache"
            );
        }
    }

    async fn write_token(&self, keycloak: &Keycloak, token: &AccessToken) -> Result<(), StoreError> {
        let namespace = keycloak.namespace().unwrap_or_default();
        let name = token_secret_name(&keycloak.name_any());

        let mut secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.clone()),
                owner_references: keycloak.controller_owner_ref(&()).map(|owner| vec![owner]),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                TOKEN_SECRET_KEY.to_string(),
                ByteString(serde_json::to_vec(token)?),
            )])),
            type_: Some("Opaque".to_string()),
            ..Secret::default()
        };

        match self.store.create(&namespace, &secret).await {
            Ok(_) => Ok(()),
            Err(StoreError::AlreadyExists { .. }) => {
                let existing: Secret = self.store.get(&namespace, &name).await?;
                secret.metadata.resource_version = existing.metadata.resource_version;
                self.store.replace(&namespace, &secret).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<S: ObjectStore + 'static> ClientProvider for Provisioner<S> {
    async fn client_for_realm(
        &self,
        realm: &KeycloakRealm,
    ) -> Result<Arc<dyn KeycloakApi>, ProvisionError> {
        let keycloak = keycloak_owner(self.store.as_ref(), realm).await?;
        self.client_for_keycloak(&keycloak).await
    }

    async fn client_for_keycloak(
        &self,
        keycloak: &Keycloak,
    ) -> Result<Arc<dyn KeycloakApi>, ProvisionError> {
        if !keycloak.is_connected() {
            return Err(ProvisionError::ParentNotConnected {
                name: keycloak.name_any(),
            });
        }

        let token = self.token(keycloak).await?;
        Ok(self.factory.build(&keycloak.spec.url, token))
    }

    async fn connect(&self, keycloak: &Keycloak) -> Result<(), ProvisionError> {
        self.login(keycloak).await.map(|_| ())
    }
}
