//! Credential renewal watcher.
//!
//! Checks the stored credential every hour and requests a new one when it no
//! longer validates or expires within the renewal threshold. The hourly
//! cadence is the only throttle on failed renewals.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::authorizer::Authorizer;
use crate::control::ControlApi;
use crate::error::AuthError;

/// Interval between credential checks (1 hour).
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Remaining lifetime below which the credential is renewed (24 hours).
pub const RENEWAL_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of one renewal check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// The instance was never authorized.
    NoCredential,
    /// The credential is valid and not near expiry.
    Fresh { remaining: Duration },
    /// A new credential was obtained and installed.
    Renewed { hostname: String },
    /// Renewal was needed but failed; retried at the next check.
    Failed(String),
}

pub struct RenewalWatcher<C> {
    authorizer: Arc<Authorizer<C>>,
    interval: Duration,
    threshold: Duration,
}

impl<C: ControlApi> RenewalWatcher<C> {
    pub const fn new(authorizer: Arc<Authorizer<C>>) -> Self {
        Self {
            authorizer,
            interval: CHECK_INTERVAL,
            threshold: RENEWAL_THRESHOLD,
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Check the stored credential and renew it if needed.
    ///
    /// Only a persistence failure is returned as an error: the new
    /// credential may then be on disk but not in memory, or the reverse.
    pub async fn check(&self, now: SystemTime) -> Result<RenewalOutcome, AuthError> {
        let config = self.authorizer.config().snapshot();
        let Some(raw) = config.credential() else {
            return Ok(RenewalOutcome::NoCredential);
        };

        match self.authorizer.parse_and_validate(raw) {
            Ok(credential) => {
                let remaining = credential.remaining_lifetime(now);
                let store = self.authorizer.store();
                if store.current().is_none_or(|current| current.raw() != raw) {
                    store.replace(Arc::new(credential));
                }

                if remaining >= self.threshold {
                    return Ok(RenewalOutcome::Fresh { remaining });
                }
                info!(
                    remaining_secs = remaining.as_secs(),
                    "Credential expires soon, requesting a new one"
                );
            }
            Err(e) => {
                warn!(error = %e, "Stored credential is no longer valid, requesting a new one");
            }
        }

        match self.authorizer.acquire().await {
            Ok(credential) => Ok(RenewalOutcome::Renewed {
                hostname: credential.hostname().to_string(),
            }),
            Err(e @ AuthError::Persistence(_)) => Err(e),
            Err(e) => Ok(RenewalOutcome::Failed(e.to_string())),
        }
    }

    /// Check every interval until `cancel` fires or the new credential
    /// cannot be saved. The first check happens one interval after start.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), AuthError> {
        info!(
            interval_secs = self.interval.as_secs(),
            "Credential renewal watcher started"
        );

        let mut timer = tokio::time::interval(self.interval);
        timer.tick().await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Credential renewal watcher shutting down");
                    return Ok(());
                }
                _ = timer.tick() => {
                    match self.check(SystemTime::now()).await? {
                        RenewalOutcome::NoCredential => {
                            warn!("No credential stored; skipping renewal check");
                        }
                        RenewalOutcome::Fresh { remaining } => {
                            info!(remaining_secs = remaining.as_secs(), "Credential check: OK");
                        }
                        RenewalOutcome::Renewed { hostname } => {
                            info!(hostname = %hostname, "Credential renewed");
                        }
                        RenewalOutcome::Failed(e) => {
                            error!(error = %e, "Credential renewal failed");
                        }
                    }
                }
            }
        }
    }
}
