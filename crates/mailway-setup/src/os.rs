//! Host distribution check; the Mailway packages are built for apt and systemd.

use std::collections::HashMap;
use std::fs;

use anyhow::{Context, Result, bail};

const OS_RELEASE: &str = "/etc/os-release";

/// Fields of an `os-release` file.
#[derive(Debug, Default)]
struct OsRelease(HashMap<String, String>);

impl OsRelease {
    fn parse(content: &str) -> Self {
        let fields = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.to_string(), value.trim_matches('"').to_string()))
            .collect();
        Self(fields)
    }

    fn get(&self, key: &str) -> &str {
        self.0.get(key).map_or("unknown", String::as_str)
    }

    fn is_debian_family(&self) -> bool {
        std::iter::once(self.get("ID"))
            .chain(self.0.get("ID_LIKE").into_iter().flat_map(|like| like.split_whitespace()))
            .any(|id| id == "debian")
    }
}

/// Fail unless the host is Debian or a derivative.
pub fn ensure_debian_family() -> Result<()> {
    let content = fs::read_to_string(OS_RELEASE)
        .with_context(|| format!("failed to read {OS_RELEASE}"))?;
    let release = OsRelease::parse(&content);
    if !release.is_debian_family() {
        bail!(
            "mailway only supports Debian-based distributions (detected OS: {})",
            release.get("ID")
        );
    }
    tracing::info!(
        id = release.get("ID"),
        version = release.get("VERSION_ID"),
        "detected supported distribution"
    );
    Ok(())
}
