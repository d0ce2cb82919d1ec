//! Authorization error taxonomy.

use mailway_core::CredentialError;
use thiserror::Error;

/// Errors raised while obtaining a credential from the control service.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The control service could not be reached.
    #[error("could not send request: {0}")]
    Network(#[from] reqwest::Error),

    /// The control service answered with something other than the envelope.
    #[error("could not parse response: {0}")]
    Protocol(String),

    /// Local state could not be saved.
    #[error("could not persist instance state: {0}")]
    Persistence(#[from] mailway_core::Error),

    /// The returned credential was rejected.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The instance has not been approved yet.
    #[error("instance not yet approved by the control service")]
    Pending,
}

impl AuthError {
    /// Whether waiting for the next natural tick may clear the error.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Protocol(_) | Self::Pending)
    }
}
