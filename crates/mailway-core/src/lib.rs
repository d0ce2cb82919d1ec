//! Mailway Core Library
//!
//! Shared functionality for Mailway components:
//! - Durable instance configuration and its resolution hierarchy
//! - Credential (signed instance token) verification and the credential store
//! - Common error types
//! - Tracing initialisation

pub mod config;
pub mod credential;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tracing_init;

pub use config::{ConfigStore, InstanceConfig, InstanceMode};
pub use credential::{Claims, Credential, CredentialError, CredentialStore, CredentialVerifier};
pub use error::{Error, Result};
