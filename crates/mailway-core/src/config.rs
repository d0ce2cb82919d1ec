//! Instance configuration for Mailway.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Config file (`/etc/mailway/conf.toml`)
//! 3. Environment variables (highest priority, never written back)
//!
//! The resolved configuration lives in a [`ConfigStore`], a shared handle
//! passed to every component that reads or writes instance state. Writes hit
//! the disk first; the in-memory value only changes once the file is in place.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Root directory for Mailway state.
pub const ROOT_LOCATION: &str = "/etc/mailway";

/// Default location of the durable configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mailway/conf.toml";

/// How the instance is operated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstanceMode {
    /// Self-managed; never talks to the control service.
    Local,
    /// Authorized against the control service and holds a credential.
    #[default]
    Connected,
}

impl fmt::Display for InstanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Durable instance configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Opaque identifier assigned to this instance.
    pub server_id: String,
    pub instance_hostname: String,
    pub instance_email: String,
    pub instance_mode: InstanceMode,
    /// Raw signed credential as last returned by the control service.
    /// Empty when the instance was never authorized.
    pub server_jwt: String,
    /// DKIM private key used by the outbound service.
    pub out_dkim_path: PathBuf,
    /// Port of the local relay that accepts resubmitted mail.
    pub port_forwarding: u16,
    /// Public SMTP port checked during preflight.
    pub port_frontline_smtp: u16,
    pub api_base_url: String,
    pub dashboard_url: String,
    /// Directory holding messages whose delivery failed.
    pub spool_dir: PathBuf,
    /// Control service public key used to verify credentials.
    pub public_key_path: PathBuf,
    pub log_level: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            server_id: String::new(),
            instance_hostname: String::new(),
            instance_email: String::new(),
            instance_mode: InstanceMode::default(),
            server_jwt: String::new(),
            out_dkim_path: PathBuf::from("/etc/ssl/private/mailway-dkim.pem"),
            port_forwarding: 2525,
            port_frontline_smtp: 25,
            api_base_url: "https://apiv1.mailway.app".to_string(),
            dashboard_url: "https://dash.mailway.app".to_string(),
            spool_dir: PathBuf::from("/run/mailway/mailout"),
            public_key_path: Path::new(ROOT_LOCATION).join("key.pub"),
            log_level: "info".to_string(),
        }
    }
}

impl InstanceConfig {
    pub fn is_local(&self) -> bool {
        self.instance_mode == InstanceMode::Local
    }

    /// The stored raw credential, if any.
    pub fn credential(&self) -> Option<&str> {
        (!self.server_jwt.is_empty()).then_some(self.server_jwt.as_str())
    }
}

/// Shared handle to the durable instance configuration.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    on_disk: RwLock<InstanceConfig>,
}

impl ConfigStore {
    /// Load the configuration at `path`, creating it when missing.
    ///
    /// A configuration without a server identifier gets a fresh UUID, which
    /// is persisted immediately so the identifier is stable across runs.
    pub fn load(path: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let path = path.into();
        let config = if path.exists() {
            load_config_file(&path)?
        } else {
            tracing::info!(path = %path.display(), "No config file found; using defaults");
            InstanceConfig::default()
        };

        let store = Self {
            path,
            on_disk: RwLock::new(config),
        };

        if store.read().server_id.is_empty() {
            let server_id = uuid::Uuid::new_v4().to_string();
            tracing::info!(server_id = %server_id, "Generated server identifier");
            store.update(|c| c.server_id = server_id)?;
        }

        Ok(Arc::new(store))
    }

    /// Build a store around an in-memory value without touching the disk.
    pub fn with_config(path: impl Into<PathBuf>, config: InstanceConfig) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            on_disk: RwLock::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration with environment overrides applied.
    pub fn snapshot(&self) -> InstanceConfig {
        let mut config = self.read().clone();
        apply_overrides(&mut config, |key| std::env::var(key).ok());
        config
    }

    /// Persist the raw credential returned by the control service.
    pub fn write_server_jwt(&self, raw: &str) -> Result<()> {
        self.update(|c| c.server_jwt = raw.to_string())
    }

    /// Persist the instance identity obtained from a credential or the operator.
    pub fn write_instance_config(
        &self,
        mode: InstanceMode,
        hostname: &str,
        email: &str,
    ) -> Result<()> {
        self.update(|c| {
            c.instance_mode = mode;
            c.instance_hostname = hostname.to_string();
            c.instance_email = email.to_string();
        })
    }

    /// Record the DKIM private key location.
    pub fn write_dkim(&self, private_key: &Path) -> Result<()> {
        self.update(|c| c.out_dkim_path = private_key.to_path_buf())
    }

    /// Render the effective configuration for display.
    pub fn pretty_print(&self) -> Result<String> {
        Ok(toml::to_string_pretty(&self.snapshot())?)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InstanceConfig> {
        self.on_disk.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, apply: impl FnOnce(&mut InstanceConfig)) -> Result<()> {
        let mut guard = self.on_disk.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        apply(&mut next);
        persist(&self.path, &next)?;
        *guard = next;
        Ok(())
    }
}

fn load_config_file(path: &Path) -> Result<InstanceConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    toml::from_str(&content).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `config` next to `path` and rename it into place.
fn persist(path: &Path, config: &InstanceConfig) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    let persist_err = |source| Error::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(persist_err)?;
    }

    let tmp = path.with_extension("toml.tmp");
    fs::write(&tmp, content).map_err(persist_err)?;

    // The file carries the instance credential.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600)).map_err(persist_err)?;
    }

    fs::rename(&tmp, path).map_err(persist_err)?;
    tracing::debug!(path = %path.display(), "Persisted instance config");
    Ok(())
}

fn apply_overrides(config: &mut InstanceConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("MAILWAY_SERVER_ID") {
        config.server_id = val;
    }
    if let Some(val) = lookup("MAILWAY_API_BASE_URL") {
        config.api_base_url = val;
    }
    if let Some(val) = lookup("MAILWAY_SPOOL_DIR") {
        config.spool_dir = PathBuf::from(val);
    }
    if let Some(val) = lookup("MAILWAY_LOG_LEVEL") {
        config.log_level = val;
    }
    if let Some(val) = lookup("MAILWAY_PORT_FORWARDING")
        && let Ok(port) = val.parse()
    {
        config.port_forwarding = port;
    }
    if let Some(val) = lookup("MW_HOSTNAME") {
        config.instance_hostname = val;
    }
    if let Some(val) = lookup("MW_EMAIL") {
        config.instance_email = val;
    }
}
