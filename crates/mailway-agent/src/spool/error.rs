use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while inspecting or redelivering queued mail.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// The spool directory itself could not be listed.
    #[error("failed to read spool directory {path}: {source}")]
    QueueIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read message: {0}")]
    Parse(#[from] mailparse::MailParseError),

    #[error("message has no {0} header")]
    MissingHeader(&'static str),

    #[error("invalid envelope address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("invalid envelope: {0}")]
    Envelope(#[from] lettre::error::Error),

    /// The attempt count is past the end of the backoff table.
    #[error("too many retries ({attempts}), ignoring")]
    ExhaustedRetries { attempts: usize },

    #[error("could not send email: {0}")]
    Resubmit(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("could not delete {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
