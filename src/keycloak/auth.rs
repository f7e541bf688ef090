//! # Credentials and Tokens
//!
//! Secret material read from Kubernetes or returned by the token endpoint.
//! Both types redact themselves in `Debug` output and wipe their memory on drop.

use crate::crd::AdminType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Admin credentials of a Keycloak instance
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    username: String,
    password: String,
    #[zeroize(skip)]
    admin_type: AdminType,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>, admin_type: AdminType) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            admin_type,
        }
    }

    /// User name, or client id for service account admins
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password, or client secret for service account admins
    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn admin_type(&self) -> AdminType {
        self.admin_type
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("admin_type", &self.admin_type)
            .finish()
    }
}

/// Bearer token issued by the Keycloak token endpoint
///
/// Serialized as `{"access_token": "...", "expires_at": <unix seconds>}` in
/// the token cache secret.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct AccessToken {
    access_token: String,
    /// Expiry as unix timestamp (seconds)
    expires_at: i64,
}

impl AccessToken {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: expires_at.timestamp(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Whether the token is still usable at `now`, keeping `skew_secs` of margin
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew_secs: i64) -> bool {
        !self.access_token.is_empty() && now.timestamp().saturating_add(skew_secs) < self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
