//! Mailway command-line tool: instance provisioning, service management and
//! the long-running supervisor.

pub mod certs;
pub mod cmd;
pub mod dkim;
pub mod escalate;
pub mod frontline;
pub mod os;
pub mod preflight;
pub mod prompt;
pub mod services;
pub mod setup;
pub mod supervise;
