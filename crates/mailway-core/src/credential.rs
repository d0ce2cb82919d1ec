//! Signed instance credentials.
//!
//! The control service issues an RS256-signed JWT whose payload carries the
//! standard temporal claims plus the instance identity (`hostname`, `email`).
//! [`CredentialVerifier`] checks the signature against the control service's
//! public key and validates the temporal claims; only the resulting
//! [`Credential`] values can enter the [`CredentialStore`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

/// Instance identity carried in the credential payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceClaims {
    pub hostname: String,
    pub email: String,
}

/// JWT claims embedded in instance credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issued at (unix timestamp).
    #[serde(default)]
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
    /// Not before (unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    pub data: InstanceClaims,
}

/// Why a credential was rejected.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The public key used for verification could not be read.
    #[error("could not read key file {path}: {source}")]
    Key {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The public key is not a usable RSA key.
    #[error("invalid public key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    /// Signature, algorithm or token structure rejected.
    #[error("key failed to verify: {0}")]
    Signature(#[source] jsonwebtoken::errors::Error),

    /// Signature is fine but the claims are not acceptable right now.
    #[error("credential claims not valid: {0}")]
    Claim(#[source] jsonwebtoken::errors::Error),
}

impl CredentialError {
    pub const fn is_claim_error(&self) -> bool {
        matches!(self, Self::Claim(_))
    }
}

impl From<jsonwebtoken::errors::Error> for CredentialError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::Json(_) => Self::Claim(err),
            _ => Self::Signature(err),
        }
    }
}

/// A verified credential. Immutable once issued; renewal produces a new one.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    raw: String,
    claims: Claims,
}

impl Credential {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub const fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn hostname(&self) -> &str {
        &self.claims.data.hostname
    }

    pub fn email(&self) -> &str {
        &self.claims.data.email
    }

    pub fn expires_at(&self) -> SystemTime {
        u64::try_from(self.claims.exp)
            .map_or(UNIX_EPOCH, |secs| UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Time left before expiry; zero once expired.
    pub fn remaining_lifetime(&self, now: SystemTime) -> Duration {
        self.expires_at()
            .duration_since(now)
            .unwrap_or(Duration::ZERO)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("raw", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

#[derive(Clone)]
enum KeySource {
    /// Re-read on every verification so a replaced key file takes effect.
    File(PathBuf),
    Loaded(DecodingKey),
}

/// Verifies credentials against the control service public key.
#[derive(Clone)]
pub struct CredentialVerifier {
    key: KeySource,
    validation: Validation,
}

impl CredentialVerifier {
    /// Verifier reading the public key from `path` at each verification.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            key: KeySource::File(path.into()),
            validation: default_validation(),
        }
    }

    /// Verifier for an in-memory PEM public key.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CredentialError> {
        let key = DecodingKey::from_rsa_pem(pem).map_err(CredentialError::InvalidKey)?;
        Ok(Self {
            key: KeySource::Loaded(key),
            validation: default_validation(),
        })
    }

    /// Verify the signature of `raw` and validate its temporal claims.
    pub fn parse_and_validate(&self, raw: &str) -> Result<Credential, CredentialError> {
        let loaded;
        let key = match &self.key {
            KeySource::File(path) => {
                loaded = read_public_key(path)?;
                &loaded
            }
            KeySource::Loaded(key) => key,
        };
        let data = jsonwebtoken::decode::<Claims>(raw, key, &self.validation)?;
        Ok(Credential {
            raw: raw.to_string(),
            claims: data.claims,
        })
    }
}

fn default_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_nbf = true;
    validation.leeway = 0;
    validation
}

fn read_public_key(path: &Path) -> Result<DecodingKey, CredentialError> {
    let pem = std::fs::read(path).map_err(|source| CredentialError::Key {
        path: path.to_path_buf(),
        source,
    })?;
    DecodingKey::from_rsa_pem(&pem).map_err(CredentialError::InvalidKey)
}

/// Holder of the current verified credential.
///
/// Cloning yields another handle to the same slot. Replacing the credential
/// is a single atomic swap; readers always observe a whole credential.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    slot: Arc<watch::Sender<Option<Arc<Credential>>>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    pub fn current(&self) -> Option<Arc<Credential>> {
        self.slot.borrow().clone()
    }

    /// Swap in a freshly verified credential, returning the previous one.
    pub fn replace(&self, credential: Arc<Credential>) -> Option<Arc<Credential>> {
        self.slot.send_replace(Some(credential))
    }

    pub fn clear(&self) {
        self.slot.send_replace(None);
    }

    /// Observe credential replacements.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Credential>>> {
        self.slot.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::{
        OTHER_PUBLIC_KEY_PEM, TEST_PUBLIC_KEY_PEM, claims_expiring_in, now_secs,
        sign_credential, test_verifier,
    };

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn valid_credential_round_trips_claims() {
        let claims = claims_expiring_in(48 * HOUR, "mx.example.com", "ops@example.com");
        let raw = sign_credential(&claims);

        let credential = test_verifier().parse_and_validate(&raw).unwrap();
        assert_eq!(credential.hostname(), "mx.example.com");
        assert_eq!(credential.email(), "ops@example.com");
        assert_eq!(credential.raw(), raw);
        assert_eq!(credential.claims(), &claims);
    }

    #[test]
    fn wrong_key_is_a_signature_error() {
        let raw = sign_credential(&claims_expiring_in(HOUR, "a", "b"));
        let verifier = CredentialVerifier::from_pem(OTHER_PUBLIC_KEY_PEM.as_bytes()).unwrap();

        let err = verifier.parse_and_validate(&raw).unwrap_err();
        assert!(matches!(err, CredentialError::Signature(_)), "got {err:?}");
    }

    #[test]
    fn garbage_is_a_signature_error() {
        let err = test_verifier().parse_and_validate("not-a-token").unwrap_err();
        assert!(matches!(err, CredentialError::Signature(_)), "got {err:?}");
    }

    #[test]
    fn expired_credential_is_a_claim_error() {
        let mut claims = claims_expiring_in(HOUR, "a", "b");
        claims.exp = now_secs() - 3600;
        let raw = sign_credential(&claims);

        let err = test_verifier().parse_and_validate(&raw).unwrap_err();
        assert!(err.is_claim_error(), "got {err:?}");
    }

    #[test]
    fn not_yet_valid_credential_is_a_claim_error() {
        let mut claims = claims_expiring_in(48 * HOUR, "a", "b");
        claims.nbf = Some(now_secs() + 3600);
        let raw = sign_credential(&claims);

        let err = test_verifier().parse_and_validate(&raw).unwrap_err();
        assert!(err.is_claim_error(), "got {err:?}");
    }

    #[test]
    fn file_verifier_reads_key_on_each_call() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key.pub");
        let verifier = CredentialVerifier::from_file(&key_path);
        let raw = sign_credential(&claims_expiring_in(HOUR, "a", "b"));

        let err = verifier.parse_and_validate(&raw).unwrap_err();
        assert!(matches!(err, CredentialError::Key { .. }), "got {err:?}");

        std::fs::write(&key_path, TEST_PUBLIC_KEY_PEM).unwrap();
        assert!(verifier.parse_and_validate(&raw).is_ok());
    }

    #[test]
    fn invalid_pem_is_rejected() {
        let err = CredentialVerifier::from_pem(b"nonsense").err().unwrap();
        assert!(matches!(err, CredentialError::InvalidKey(_)), "got {err:?}");
    }

    #[test]
    fn remaining_lifetime_saturates_at_zero() {
        let raw = sign_credential(&claims_expiring_in(2 * HOUR, "a", "b"));
        let credential = test_verifier().parse_and_validate(&raw).unwrap();

        let now = SystemTime::now();
        let remaining = credential.remaining_lifetime(now);
        assert!(remaining > HOUR && remaining <= 2 * HOUR);
        assert_eq!(credential.remaining_lifetime(now + 3 * HOUR), Duration::ZERO);
    }

    #[test]
    fn debug_output_redacts_raw_token() {
        let raw = sign_credential(&claims_expiring_in(HOUR, "a", "b"));
        let credential = test_verifier().parse_and_validate(&raw).unwrap();
        let debug = format!("{credential:?}");
        assert!(!debug.contains(&raw));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn store_replace_swaps_whole_credential() {
        let store = CredentialStore::new();
        assert!(store.current().is_none());

        let first = test_verifier()
            .parse_and_validate(&sign_credential(&claims_expiring_in(HOUR, "one", "a")))
            .unwrap();
        let second = test_verifier()
            .parse_and_validate(&sign_credential(&claims_expiring_in(HOUR, "two", "b")))
            .unwrap();

        let mut rx = store.subscribe();
        assert!(store.replace(Arc::new(first)).is_none());
        let previous = store.replace(Arc::new(second)).unwrap();
        assert_eq!(previous.hostname(), "one");
        assert_eq!(store.current().unwrap().hostname(), "two");
        assert!(rx.has_changed().unwrap());

        store.clone().clear();
        assert!(store.current().is_none());
    }
}
