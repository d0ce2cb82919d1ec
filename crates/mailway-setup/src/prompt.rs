//! Operator prompts.
//!
//! With `DEBIAN_FRONTEND=noninteractive` (package post-install scripts)
//! confirmations are assumed and free-text answers must come from the
//! environment.

use std::sync::LazyLock;

use anyhow::{Result, bail};
use dialoguer::{Confirm, Input};
use regex::Regex;

static DNS_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?i:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)",
        r"(?:\.(?i:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?))*\.?$",
    ))
    .expect("static regex is valid")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@",
        r"[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?",
        r"(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    ))
    .expect("static regex is valid")
});

/// What a free-text answer must look like.
#[derive(Debug, Clone, Copy)]
pub enum Validation {
    DnsName,
    Email,
}

impl Validation {
    fn check(self, input: &str) -> Result<(), &'static str> {
        match self {
            Self::DnsName if is_dns_name(input) => Ok(()),
            Self::DnsName => Err("Domain name must be valid"),
            Self::Email if is_email(input) => Ok(()),
            Self::Email => Err("Email address must be valid"),
        }
    }
}

pub fn is_dns_name(input: &str) -> bool {
    input.len() <= 253 && DNS_NAME_RE.is_match(input)
}

pub fn is_email(input: &str) -> bool {
    input.len() <= 254 && EMAIL_RE.is_match(input)
}

/// Whether the process runs from a non-interactive package install.
pub fn is_noninteractive() -> bool {
    std::env::var("DEBIAN_FRONTEND").is_ok_and(|v| v == "noninteractive")
}

/// Ask the operator to confirm they performed `action`.
///
/// Declining a mandatory step aborts the setup.
pub fn confirm_done(optional: bool, action: &str) -> Result<()> {
    let label = format!("Did you {action}");
    if is_noninteractive() {
        tracing::info!("{label}? Assuming yes because output is not a tty");
        return Ok(());
    }

    let confirmed = Confirm::new().with_prompt(label).default(true).interact()?;
    if !confirmed && !optional {
        bail!("before proceeding with the setup you need to: {action}");
    }
    Ok(())
}

/// Yes/no question; non-interactive runs answer yes.
pub fn confirm(prompt: &str) -> Result<bool> {
    if is_noninteractive() {
        tracing::info!("{prompt}: continuing because output is not a tty");
        return Ok(true);
    }
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

/// Value from the environment variable `env`, or prompt for it.
pub fn text_from_env_or_prompt(env: &str, prompt: &str, validation: Validation) -> Result<String> {
    if let Ok(value) = std::env::var(env)
        && !value.is_empty()
    {
        if let Err(msg) = validation.check(&value) {
            bail!("{env}: {msg}");
        }
        return Ok(value);
    }

    if is_noninteractive() {
        bail!("{env} is required in non-interactive mode");
    }

    let value: String = Input::new()
        .with_prompt(prompt)
        .validate_with(|input: &String| validation.check(input))
        .interact_text()?;
    Ok(value)
}
