//! DKIM signing key provisioning.
//!
//! The key pair is generated once with `openssl`; later runs reuse it so the
//! published DNS record stays valid.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mailway_core::ConfigStore;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};

use crate::cmd::run_cmd;

/// Public half of the DKIM key, read by the signing service.
pub const DKIM_PUBLIC_KEY_PATH: &str = "/etc/ssl/certs/mailway-dkim.pem";

const DKIM_KEY_BITS: &str = "2048";

/// Ensure a DKIM key pair exists and return the base64 public key for DNS.
pub fn ensure_dkim(config: &ConfigStore) -> Result<String> {
    ensure_dkim_at(config, Path::new(DKIM_PUBLIC_KEY_PATH))
}

fn ensure_dkim_at(config: &ConfigStore, public_path: &Path) -> Result<String> {
    let private_path = config.snapshot().out_dkim_path;

    if public_path.exists() || private_path.exists() {
        tracing::warn!(
            "{} or {} already exist; skipping DKIM key generation",
            public_path.display(),
            private_path.display()
        );
    } else {
        generate_key_pair(&private_path, public_path)?;
        config
            .write_dkim(&private_path)
            .context("could not write DKIM config")?;
    }

    let pem_bytes = fs::read(public_path)
        .with_context(|| format!("could not read public key file {}", public_path.display()))?;
    Ok(STANDARD.encode(dns_record_key(&pem_bytes)?))
}

fn generate_key_pair(private_path: &Path, public_path: &Path) -> Result<()> {
    for path in [private_path, public_path] {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let private = private_path.to_string_lossy();
    let public = public_path.to_string_lossy();
    run_cmd(
        "generating DKIM private key",
        "openssl",
        &["genrsa", "-out", &private, DKIM_KEY_BITS],
    )?;
    restrict_key_permissions(private_path)?;
    run_cmd(
        "extracting DKIM public key",
        "openssl",
        &["rsa", "-in", &private, "-pubout", "-out", &public],
    )
}

/// Restrict file permissions to owner-only read/write (0600).
fn restrict_key_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

/// DER `SubjectPublicKeyInfo` as published in the DKIM `p=` tag.
///
/// Accepts SPKI (`PUBLIC KEY`) and PKCS#1 (`RSA PUBLIC KEY`) PEM, including
/// PKCS#1 content mislabelled as `PUBLIC KEY` by earlier installers.
pub fn dns_record_key(pem_bytes: &[u8]) -> Result<Vec<u8>> {
    let block = pem::parse(pem_bytes).context("public key is not in PEM format")?;
    let der = block.contents();
    let key = match block.tag() {
        "PUBLIC KEY" => RsaPublicKey::from_public_key_der(der)
            .or_else(|_| RsaPublicKey::from_pkcs1_der(der))
            .context("invalid RSA public key")?,
        "RSA PUBLIC KEY" => {
            RsaPublicKey::from_pkcs1_der(der).context("invalid PKCS#1 RSA public key")?
        }
        other => bail!("unexpected PEM block {other:?} in DKIM public key"),
    };
    let spki = key
        .to_public_key_der()
        .context("failed to encode DKIM public key")?;
    Ok(spki.as_bytes().to_vec())
}

/// `v=DKIM1` TXT record value for the `smtp._domainkey` selector.
pub fn dns_txt_record(key_b64: &str) -> String {
    format!("v=DKIM1; k=rsa; p={key_b64}")
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use mailway_core::InstanceConfig;

    use super::*;
    use crate::cmd::command_exists;

    const SPKI_PEM: &str = include_str!("testdata/dkim-spki.pem");
    const PKCS1_PEM: &str = include_str!("testdata/dkim-pkcs1.pem");
    const LEGACY_PEM: &str = include_str!("testdata/dkim-legacy.pem");

    fn store_in(dir: &Path) -> std::sync::Arc<ConfigStore> {
        let config = InstanceConfig {
            out_dkim_path: dir.join("private/mailway-dkim.pem"),
            ..InstanceConfig::default()
        };
        ConfigStore::with_config(dir.join("conf.toml"), config)
    }

    #[test]
    fn spki_is_used_as_is() {
        let spki = pem::parse(SPKI_PEM).unwrap();
        assert_eq!(dns_record_key(SPKI_PEM.as_bytes()).unwrap(), spki.contents());
    }

    #[test]
    fn pkcs1_is_wrapped_into_spki() {
        let spki = pem::parse(SPKI_PEM).unwrap();
        assert_eq!(dns_record_key(PKCS1_PEM.as_bytes()).unwrap(), spki.contents());
        assert_eq!(dns_record_key(LEGACY_PEM.as_bytes()).unwrap(), spki.contents());
    }

    #[test]
    fn other_blocks_are_rejected() {
        let cert = "-----BEGIN CERTIFICATE-----\nMAA=\n-----END CERTIFICATE-----\n";
        assert!(dns_record_key(cert.as_bytes()).is_err());
        assert!(dns_record_key(b"not pem").is_err());
    }

    #[test]
    fn non_rsa_contents_are_rejected() {
        let junk = "-----BEGIN PUBLIC KEY-----\nMAA=\n-----END PUBLIC KEY-----\n";
        let err = dns_record_key(junk.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("invalid RSA public key"), "got {err:#}");
    }

    #[test]
    fn existing_key_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("mailway-dkim.pem");
        fs::write(&public, SPKI_PEM).unwrap();
        let store = store_in(dir.path());

        let key = ensure_dkim_at(&store, &public).unwrap();
        let expected = STANDARD.encode(pem::parse(SPKI_PEM).unwrap().contents());
        assert_eq!(key, expected);
        assert!(!store.path().exists(), "config must not be rewritten");
    }

    #[test]
    fn missing_key_pair_is_generated() {
        if !command_exists("openssl") {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("certs/mailway-dkim.pem");
        let store = store_in(dir.path());

        let key = ensure_dkim_at(&store, &public).unwrap();
        assert!(!key.is_empty());
        assert!(public.exists());
        assert!(store.snapshot().out_dkim_path.exists());
        assert!(store.path().exists());
    }

    #[test]
    fn txt_record_format() {
        assert_eq!(dns_txt_record("QUJD"), "v=DKIM1; k=rsa; p=QUJD");
    }
}
