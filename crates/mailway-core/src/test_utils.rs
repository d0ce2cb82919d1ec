//! Credential fixtures shared by the workspace test suites.
//!
//! The key pair under `testdata/` exists only for tests; the control service
//! signs production credentials with its own key.

#![allow(clippy::expect_used)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};

use crate::credential::{Claims, CredentialVerifier, InstanceClaims};

/// Private half of the test key pair (PKCS#1 PEM).
pub const TEST_PRIVATE_KEY_PEM: &str = include_str!("testdata/test-key.pem");
/// Public half of the test key pair (SPKI PEM).
pub const TEST_PUBLIC_KEY_PEM: &str = include_str!("testdata/test-key.pub");
/// An unrelated public key; credentials signed by the test key fail against it.
pub const OTHER_PUBLIC_KEY_PEM: &str = include_str!("testdata/other-key.pub");

pub fn now_secs() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Claims issued now and expiring after `lifetime`.
pub fn claims_expiring_in(lifetime: Duration, hostname: &str, email: &str) -> Claims {
    let now = now_secs();
    Claims {
        iat: now,
        exp: now + i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX),
        nbf: None,
        data: InstanceClaims {
            hostname: hostname.to_string(),
            email: email.to_string(),
        },
    }
}

/// Sign `claims` with the test private key.
pub fn sign_credential(claims: &Claims) -> String {
    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY_PEM.as_bytes())
        .expect("test private key should parse");
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &key)
        .expect("signing with the test key should succeed")
}

/// Verifier trusting the test public key.
pub fn test_verifier() -> CredentialVerifier {
    CredentialVerifier::from_pem(TEST_PUBLIC_KEY_PEM.as_bytes())
        .expect("test public key should parse")
}
