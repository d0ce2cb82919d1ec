//! Credential acquisition.
//!
//! The [`Authorizer`] is the only writer of the credential store. It is used
//! once by the setup handshake and then periodically by the renewal watcher.

use std::sync::Arc;

use mailway_core::{
    ConfigStore, Credential, CredentialError, CredentialStore, CredentialVerifier, InstanceMode,
};
use tracing::{debug, info};

use crate::control::ControlApi;
use crate::error::AuthError;

/// Exchanges the instance identity for a signed credential.
pub struct Authorizer<C> {
    client: C,
    config: Arc<ConfigStore>,
    verifier: CredentialVerifier,
    store: CredentialStore,
}

impl<C: ControlApi> Authorizer<C> {
    pub const fn new(
        client: C,
        config: Arc<ConfigStore>,
        verifier: CredentialVerifier,
        store: CredentialStore,
    ) -> Self {
        Self {
            client,
            config,
            verifier,
            store,
        }
    }

    pub const fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub const fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Ask the control service for the credential of `server_id`.
    ///
    /// An empty string is a valid "not yet approved" answer. A non-empty
    /// credential is persisted before it is returned, without validation.
    pub async fn authorize(&self, server_id: &str) -> Result<String, AuthError> {
        let raw = self.client.fetch_credential(server_id).await?;
        if raw.is_empty() {
            debug!(server_id = %server_id, "Instance not approved yet");
            return Ok(raw);
        }

        self.config.write_server_jwt(&raw)?;
        Ok(raw)
    }

    /// Verify the signature of `raw` and validate its temporal claims.
    pub fn parse_and_validate(&self, raw: &str) -> Result<Credential, CredentialError> {
        self.verifier.parse_and_validate(raw)
    }

    /// Request, validate and install a new credential.
    pub async fn acquire(&self) -> Result<Arc<Credential>, AuthError> {
        let server_id = self.config.snapshot().server_id;
        let raw = self.authorize(&server_id).await?;
        if raw.is_empty() {
            return Err(AuthError::Pending);
        }

        let credential = self.parse_and_validate(&raw)?;
        self.adopt(credential)
    }

    /// Persist the identity carried by a validated credential and make it
    /// the current one.
    pub fn adopt(&self, credential: Credential) -> Result<Arc<Credential>, AuthError> {
        self.config.write_instance_config(
            InstanceMode::Connected,
            credential.hostname(),
            credential.email(),
        )?;

        info!(
            hostname = %credential.hostname(),
            email = %credential.email(),
            expires_in_secs = credential
                .remaining_lifetime(std::time::SystemTime::now())
                .as_secs(),
            "Installed new instance credential"
        );

        let credential = Arc::new(credential);
        self.store.replace(Arc::clone(&credential));
        Ok(credential)
    }
}
