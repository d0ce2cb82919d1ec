//! Resubmission of queued mail to the local relay.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use lettre::address::Envelope;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::info;

use super::{QueuedMessage, SpoolError};

/// Timeout for one SMTP exchange with the local relay.
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

const RELAY_HOST: &str = "127.0.0.1";

/// Hands a raw message back to the mail pipeline.
pub trait Resubmit: Send + Sync + 'static {
    fn resubmit(
        &self,
        envelope: &Envelope,
        data: &[u8],
    ) -> impl Future<Output = Result<(), SpoolError>> + Send;
}

/// Plain SMTP submission to the forwarding relay on the loopback interface.
#[derive(Clone)]
pub struct SmtpResubmitter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpResubmitter {
    pub fn new(port: u16) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(RELAY_HOST)
            .port(port)
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        Self { transport }
    }
}

impl Resubmit for SmtpResubmitter {
    async fn resubmit(&self, envelope: &Envelope, data: &[u8]) -> Result<(), SpoolError> {
        self.transport
            .send_raw(envelope, data)
            .await
            .map_err(|e| SpoolError::Resubmit(Box::new(e)))?;
        Ok(())
    }
}

/// Resubmit `message` and remove its file once the relay accepted it.
///
/// A new spool file is created by the relay if the next attempt fails too.
pub async fn recover_message<R: Resubmit>(
    resubmitter: &R,
    message: &QueuedMessage,
) -> Result<(), SpoolError> {
    let envelope = message.envelope()?;
    deliver(resubmitter, message, &envelope).await
}

/// Send `message` with an already extracted envelope, then delete its file.
pub(crate) async fn deliver<R: Resubmit>(
    resubmitter: &R,
    message: &QueuedMessage,
    envelope: &Envelope,
) -> Result<(), SpoolError> {
    resubmitter.resubmit(envelope, message.data()).await?;

    tokio::fs::remove_file(message.path())
        .await
        .map_err(|source| SpoolError::Remove {
            path: message.path().to_path_buf(),
            source,
        })?;

    info!(path = %message.path().display(), "Mail sent");
    Ok(())
}

/// Read the message at `path` and resubmit it.
pub async fn recover_file<R: Resubmit>(resubmitter: &R, path: &Path) -> Result<(), SpoolError> {
    let message = QueuedMessage::read(path).await?;
    recover_message(resubmitter, &message).await
}
