//! Periodic scan of the spool directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::{self, RETRY_INTERVAL};
use super::recovery::{Resubmit, deliver};
use super::{QueuedMessage, SpoolError};

/// What a scan decided for one spool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Younger than one retry interval.
    TooFresh,
    /// Past the end of the backoff table; left in place.
    Exhausted { attempts: usize },
    /// Routed through a path resubmission does not support; left in place.
    UnsupportedRoute,
    /// Not due yet.
    Waiting { attempts: usize, remaining: Duration },
    /// Accepted by the relay and removed.
    Resubmitted { attempts: usize },
    /// Resubmission failed; the file was removed.
    ResubmitFailed { reason: String },
    /// The entry could not be inspected.
    Unreadable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub path: PathBuf,
    pub decision: Decision,
}

/// Retries failed outbound mail found in the spool directory.
pub struct QueueScanner<R> {
    spool_dir: PathBuf,
    interval: Duration,
    resubmitter: R,
}

impl<R: Resubmit> QueueScanner<R> {
    pub fn new(spool_dir: impl Into<PathBuf>, resubmitter: R) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            interval: RETRY_INTERVAL,
            resubmitter,
        }
    }

    /// Override the retry interval, which is also the scan cadence.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    pub const fn resubmitter(&self) -> &R {
        &self.resubmitter
    }

    /// Evaluate every file in the spool directory once.
    ///
    /// Per-file failures are reported as [`Decision::Unreadable`]; only a
    /// failure to list the directory is returned as an error.
    pub async fn scan(&self, now: SystemTime) -> Result<Vec<ScanReport>, SpoolError> {
        let paths = self.list().await?;
        let mut reports = Vec::with_capacity(paths.len());

        for path in paths {
            let decision = match self.evaluate(&path, now).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable spool entry");
                    Decision::Unreadable {
                        reason: e.to_string(),
                    }
                }
            };
            reports.push(ScanReport { path, decision });
        }

        Ok(reports)
    }

    /// Scan every interval until `cancel` fires or the spool directory
    /// becomes unreadable.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SpoolError> {
        info!(
            spool_dir = %self.spool_dir.display(),
            interval_secs = self.interval.as_secs(),
            "Mailout retrier running"
        );

        let mut timer = tokio::time::interval(self.interval);
        timer.tick().await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Mailout retrier shutting down");
                    return Ok(());
                }
                _ = timer.tick() => {
                    let reports = self.scan(SystemTime::now()).await?;
                    debug!(entries = reports.len(), "Spool scan complete");
                }
            }
        }
    }

    async fn list(&self) -> Result<Vec<PathBuf>, SpoolError> {
        let queue_io = |source| SpoolError::QueueIo {
            path: self.spool_dir.clone(),
            source,
        };

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.spool_dir)
            .await
            .map_err(queue_io)?;
        while let Some(entry) = entries.next_entry().await.map_err(queue_io)? {
            if entry.file_type().await.map_err(queue_io)?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn evaluate(&self, path: &Path, now: SystemTime) -> Result<Decision, SpoolError> {
        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|meta| meta.modified())
            .map_err(|source| SpoolError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age < self.interval {
            return Ok(Decision::TooFresh);
        }

        let message = QueuedMessage::read(path).await?;
        let attempts = message.attempts();
        let next = match backoff::next_retry(message.modified(), attempts, self.interval) {
            Ok(next) => next,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Could not retry");
                return Ok(Decision::Exhausted { attempts });
            }
        };

        if message.is_unsupported_route() {
            warn!(
                path = %path.display(),
                via = ?message.via(),
                "Retry not yet supported for this route"
            );
            return Ok(Decision::UnsupportedRoute);
        }

        if next > now {
            let remaining = next.duration_since(now).unwrap_or(Duration::ZERO);
            info!(
                path = %path.display(),
                attempts,
                next_retry_secs = remaining.as_secs(),
                "Message waiting for next retry"
            );
            return Ok(Decision::Waiting {
                attempts,
                remaining,
            });
        }

        // Without an envelope nothing reaches the relay, so the file stays.
        let envelope = message.envelope()?;

        info!(path = %path.display(), attempts, "Retrying message now");
        match deliver(&self.resubmitter, &message, &envelope).await {
            Ok(()) => Ok(Decision::Resubmitted { attempts }),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to recover message");
                // The relay queues a fresh copy when the new attempt fails.
                if let Err(remove) = tokio::fs::remove_file(path).await {
                    error!(path = %path.display(), error = %remove, "Could not delete message");
                }
                Ok(Decision::ResubmitFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}
