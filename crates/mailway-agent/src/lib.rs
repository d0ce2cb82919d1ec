//! Mailway Agent Library
//!
//! Control-plane logic of a Mailway instance:
//! - Control service client and the authorization handshake run during setup
//! - Credential acquisition, validation and renewal
//! - Redelivery of failed outbound mail from the spool directory
//! - The supervisor that keeps the background loops running

pub mod authorizer;
pub mod control;
pub mod error;
pub mod handshake;
pub mod renewal;
pub mod spool;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_support;

pub use authorizer::Authorizer;
pub use control::{ControlApi, ControlClient};
pub use error::AuthError;
pub use handshake::{Handshake, HandshakeError, HandshakeReport, SetupState, Url, approval_url};
pub use renewal::{RenewalOutcome, RenewalWatcher};
pub use spool::{QueueScanner, Resubmit, SmtpResubmitter, SpoolError};
pub use supervisor::{Supervisor, SupervisorError};
