//! Re-running privileged subcommands through sudo.

use std::env;
use std::ffi::OsString;
use std::process::Command;

use anyhow::{Context, Result, bail};
use nix::unistd::geteuid;

use crate::prompt::{confirm, is_noninteractive};

/// Variables the setup flow reads, kept across the sudo boundary.
const PRESERVED_ENV: &str = "--preserve-env=MW_HOSTNAME,MW_EMAIL,DEBIAN_FRONTEND,RUST_LOG";

pub fn is_root() -> bool {
    geteuid().is_root()
}

/// Arguments for sudo to run `exe` again with `args`.
fn sudo_args(exe: OsString, args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut out = vec![OsString::from(PRESERVED_ENV), exe];
    out.extend(args);
    out
}

/// Offer to re-run the current command as root.
///
/// Returns only when already root; otherwise the process exits with the
/// status of the elevated run.
pub fn escalate_if_needed(action: &str) -> Result<()> {
    if is_root() {
        return Ok(());
    }
    if is_noninteractive() {
        bail!("`mailway {action}` must be run as root");
    }
    if !confirm(&format!("`mailway {action}` needs root privileges. Re-run with sudo?"))? {
        bail!("root privileges declined; re-run `sudo mailway {action}`");
    }

    let exe = env::current_exe().context("could not locate the mailway executable")?;
    let args = sudo_args(exe.into_os_string(), env::args_os().skip(1));
    tracing::info!(action, "re-executing with sudo");

    let status = Command::new("sudo")
        .args(&args)
        .status()
        .context("could not run sudo")?;
    std::process::exit(status.code().unwrap_or(1));
}
