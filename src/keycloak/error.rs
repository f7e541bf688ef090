//! # Keycloak Errors

use thiserror::Error;

/// Errors returned by a Keycloak adapter
#[derive(Debug, Error)]
pub enum KeycloakError {
    /// The addressed object does not exist on the server
    #[error("{entity} not found")]
    NotFound { entity: String },

    /// The server refused the request (bad credentials, forbidden, invalid payload)
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Any other unexpected response status
    #[error("unexpected response status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unable to decode response: {0}")]
    Decode(String),
}

impl KeycloakError {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Failures that may succeed on retry without any change on our side
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::NotFound { .. } | Self::Rejected { .. } | Self::Decode(_) => false,
        }
    }
}
