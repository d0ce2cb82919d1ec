//! Setup-time authorization handshake.
//!
//! The operator opens the approval URL in a browser while the handshake polls
//! the control service. Once the instance is approved the returned credential
//! is validated and adopted; any unusable answer aborts the run.
//!
//! ```text
//! Pending -> Polling -> Authorized
//!               |
//!               +-----> Aborted
//! ```

use std::net::IpAddr;
use std::time::Duration;

use mailway_core::{Claims, CredentialError};
pub use reqwest::Url;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::authorizer::Authorizer;
use crate::control::ControlApi;
use crate::error::AuthError;

/// Default delay between two authorization polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    Pending,
    Polling,
    Authorized,
    Aborted,
}

impl SetupState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Authorized | Self::Aborted)
    }
}

/// Outcome of a successful handshake.
#[derive(Debug, Clone)]
pub struct HandshakeReport {
    /// Number of authorization requests made, including the successful one.
    pub polls: u32,
    pub claims: Claims,
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("setup cancelled after {polls} authorization polls")]
    Cancelled { polls: u32 },

    #[error("control service returned an unusable credential (poll {polls}): {source}")]
    Rejected {
        polls: u32,
        #[source]
        source: CredentialError,
    },

    #[error("could not persist instance identity (poll {polls}): {source}")]
    Persistence {
        polls: u32,
        #[source]
        source: AuthError,
    },
}

impl HandshakeError {
    pub const fn polls(&self) -> u32 {
        match self {
            Self::Cancelled { polls }
            | Self::Rejected { polls, .. }
            | Self::Persistence { polls, .. } => *polls,
        }
    }
}

/// URL the operator opens to approve this instance.
pub fn approval_url(dashboard: &Url, server_id: &str, ip: IpAddr, dkim_b64: &str) -> Url {
    let mut url = dashboard.clone();
    url.set_path("helo");
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("server_id", server_id)
        .append_pair("ip", &ip.to_string())
        .append_pair("dkim", dkim_b64);
    url
}

/// One run of the polling state machine.
pub struct Handshake<'a, C> {
    authorizer: &'a Authorizer<C>,
    poll_interval: Duration,
    state: SetupState,
}

impl<'a, C: ControlApi> Handshake<'a, C> {
    pub const fn new(authorizer: &'a Authorizer<C>, poll_interval: Duration) -> Self {
        Self {
            authorizer,
            poll_interval,
            state: SetupState::Pending,
        }
    }

    pub const fn state(&self) -> SetupState {
        self.state
    }

    /// Poll until the instance is approved, an unusable credential comes
    /// back, or `cancel` fires.
    ///
    /// Network and protocol errors are logged and retried at the next poll.
    pub async fn run(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<HandshakeReport, HandshakeError> {
        let server_id = self.authorizer.config().snapshot().server_id;
        self.state = SetupState::Polling;
        info!(
            server_id = %server_id,
            interval_ms = self.poll_interval.as_millis(),
            "Waiting for instance approval"
        );

        let mut timer = tokio::time::interval(self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await;

        let mut polls = 0;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(self.abort(HandshakeError::Cancelled { polls }));
                }
                _ = timer.tick() => {}
            }
            polls += 1;

            let raw = match self.authorizer.authorize(&server_id).await {
                Ok(raw) => raw,
                Err(e) if e.is_transient() => {
                    warn!(error = %e, poll = polls, "Authorization poll failed, retrying");
                    continue;
                }
                Err(source) => {
                    return Err(self.abort(HandshakeError::Persistence { polls, source }));
                }
            };

            if raw.is_empty() {
                debug!(poll = polls, "Instance not approved yet");
                continue;
            }

            let credential = match self.authorizer.parse_and_validate(&raw) {
                Ok(credential) => credential,
                Err(source) => {
                    return Err(self.abort(HandshakeError::Rejected { polls, source }));
                }
            };

            let credential = match self.authorizer.adopt(credential) {
                Ok(credential) => credential,
                Err(source) => {
                    return Err(self.abort(HandshakeError::Persistence { polls, source }));
                }
            };

            self.state = SetupState::Authorized;
            info!(
                hostname = %credential.hostname(),
                polls,
                "Instance authorized"
            );
            return Ok(HandshakeReport {
                polls,
                claims: credential.claims().clone(),
            });
        }
    }

    fn abort(&mut self, err: HandshakeError) -> HandshakeError {
        warn!(error = %err, "Setup handshake aborted");
        self.state = SetupState::Aborted;
        err
    }
}
