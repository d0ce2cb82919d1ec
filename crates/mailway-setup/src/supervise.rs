//! `mailway supervisor`: the long-running background process.

use std::sync::Arc;

use anyhow::{Context, Result};
use mailway_agent::{QueueScanner, RenewalWatcher, SmtpResubmitter, Supervisor};
use mailway_core::ConfigStore;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::setup::authorizer;

/// Run the renewal watcher and the queue scanner until a shutdown signal.
///
/// Returns an error when one of the loops fails, so the unit exits non-zero
/// and systemd restarts it.
pub async fn run(config: &Arc<ConfigStore>) -> Result<()> {
    let instance = config.snapshot();
    let scanner = QueueScanner::new(
        instance.spool_dir.clone(),
        SmtpResubmitter::new(instance.port_forwarding),
    );
    let renewal = RenewalWatcher::new(Arc::new(authorizer(config)?));
    let supervisor = Supervisor::for_instance(&instance, scanner, renewal);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?instance.instance_mode,
        spool_dir = %instance.spool_dir.display(),
        renewal = supervisor.has_renewal(),
        "Starting mailway supervisor"
    );

    let cancel = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C shutdown signal"),
            _ = sigterm.recv() => info!("Received SIGTERM shutdown signal"),
        }
        on_signal.cancel();
    });

    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])
        .context("failed to notify systemd")?;

    supervisor
        .run(cancel)
        .await
        .context("supervised task failed")?;
    info!("Supervisor stopped");
    Ok(())
}
