//! TLS certificates obtained through certbot.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cmd::{command_exists, run_cmd, run_cmd_interactive};

const LETSENCRYPT_LIVE: &str = "/etc/letsencrypt/live";

/// Installed certificate chain and private key for the web frontend.
pub fn http_cert_paths(hostname: &str) -> (PathBuf, PathBuf) {
    (
        PathBuf::from(format!("/etc/ssl/certs/http-{hostname}.pem")),
        PathBuf::from(format!("/etc/ssl/private/http-{hostname}.pem")),
    )
}

fn ensure_certbot() -> Result<()> {
    if command_exists("certbot") {
        return Ok(());
    }
    run_cmd(
        "installing certbot",
        "apt-get",
        &["install", "-y", "certbot"],
    )
}

/// Obtain the HTTP certificate with certbot's standalone challenge and
/// install it where the frontline expects it.
pub fn ensure_http_cert(hostname: &str, email: &str) -> Result<()> {
    let (cert, key) = http_cert_paths(hostname);
    if cert.exists() || key.exists() {
        tracing::warn!(
            "{} or {} already exist; skipping certificate generation",
            cert.display(),
            key.display()
        );
        return Ok(());
    }

    ensure_certbot()?;
    let cert_name = format!("http-{hostname}");
    run_cmd(
        "requesting HTTP certificate",
        "certbot",
        &[
            "certonly",
            "--standalone",
            "--non-interactive",
            "--agree-tos",
            "--email",
            email,
            "-d",
            hostname,
            "--cert-name",
            &cert_name,
        ],
    )?;

    let live = Path::new(LETSENCRYPT_LIVE).join(&cert_name);
    install_cert(&live, &cert, &key)
}

fn install_cert(live: &Path, cert: &Path, key: &Path) -> Result<()> {
    for (src, dst) in [
        (live.join("fullchain.pem"), cert),
        (live.join("privkey.pem"), key),
    ] {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(&src, dst).with_context(|| {
            format!("failed to copy {} to {}", src.display(), dst.display())
        })?;
    }
    tracing::info!("installed certificate {}", cert.display());
    Ok(())
}

/// Obtain the SMTP certificate through a manual DNS challenge.
///
/// certbot prints the TXT record to publish and waits for the operator.
pub fn setup_secure_smtp(hostname: &str, email: &str) -> Result<()> {
    run_cmd_interactive(
        "installing certbot",
        "apt-get",
        &["install", "-y", "certbot"],
    )?;

    let domain = format!("--domain={hostname}");
    let email = format!("--email={email}");
    let cert_name = format!("--cert-name=smtp-{hostname}");
    run_cmd_interactive(
        "requesting SMTP certificate",
        "certbot",
        &[
            "certonly",
            "--manual",
            &domain,
            &email,
            &cert_name,
            "--preferred-challenges=dns",
        ],
    )
}
