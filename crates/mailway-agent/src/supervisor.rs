//! Long-running supervisor.
//!
//! Runs the credential renewal watcher and the mailout retrier as independent
//! tasks under one cancellation token. Neither loop is restarted: the first
//! one to fail stops the other and its error is returned.

use mailway_core::InstanceConfig;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::control::ControlApi;
use crate::error::AuthError;
use crate::renewal::RenewalWatcher;
use crate::spool::{QueueScanner, Resubmit, SpoolError};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to supervise mailout retrier: {0}")]
    Retrier(#[from] SpoolError),

    #[error("failed to supervise credential renewal: {0}")]
    Renewal(#[from] AuthError),

    #[error("supervised task aborted: {0}")]
    Join(#[from] JoinError),
}

pub struct Supervisor<R, C> {
    scanner: QueueScanner<R>,
    renewal: Option<RenewalWatcher<C>>,
}

impl<R: Resubmit, C: ControlApi> Supervisor<R, C> {
    pub const fn new(scanner: QueueScanner<R>, renewal: Option<RenewalWatcher<C>>) -> Self {
        Self { scanner, renewal }
    }

    /// Supervisor for `config`; local instances have nothing to renew.
    pub fn for_instance(
        config: &InstanceConfig,
        scanner: QueueScanner<R>,
        renewal: RenewalWatcher<C>,
    ) -> Self {
        Self::new(scanner, (!config.is_local()).then_some(renewal))
    }

    pub const fn has_renewal(&self) -> bool {
        self.renewal.is_some()
    }

    /// Run both loops until `cancel` fires or one of them fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SupervisorError> {
        let token = cancel.child_token();
        let mut tasks: JoinSet<Result<(), SupervisorError>> = JoinSet::new();

        if let Some(renewal) = self.renewal {
            let token = token.clone();
            tasks.spawn(async move { renewal.run(token).await.map_err(SupervisorError::from) });
        } else {
            info!("Local instance; credential renewal disabled");
        }

        let scanner = self.scanner;
        let scanner_token = token.clone();
        tasks.spawn(async move { scanner.run(scanner_token).await.map_err(SupervisorError::from) });

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined.map_err(SupervisorError::from).and_then(|r| r) {
                error!(error = %e, "Supervised task failed, shutting down");
                token.cancel();
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        if result.is_ok() {
            info!("Supervisor stopped");
        }
        result
    }
}
