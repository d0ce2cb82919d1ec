//! Redelivery of failed outbound mail.
//!
//! The relay drops a copy of every message it failed to deliver into the
//! spool directory. [`QueueScanner`] walks that directory on a fixed cadence
//! and hands due messages back to the relay following the schedule in
//! [`backoff`].

pub mod backoff;
mod error;
pub mod message;
pub mod recovery;
pub mod scanner;

pub use error::SpoolError;
pub use lettre::address::Envelope;
pub use message::QueuedMessage;
pub use recovery::{Resubmit, SmtpResubmitter, recover_file, recover_message};
pub use scanner::{Decision, QueueScanner, ScanReport};
