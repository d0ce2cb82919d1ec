//! Frontline (nginx) configuration.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use mailway_core::InstanceConfig;

use crate::certs::http_cert_paths;

/// Rendered nginx configuration for the frontline service.
pub const FRONTLINE_CONF_PATH: &str = "/etc/mailway/frontline/nginx.conf";

/// Write the frontline configuration unless one already exists.
pub fn generate_frontline_conf(config: &InstanceConfig) -> Result<()> {
    generate_at(config, Path::new(FRONTLINE_CONF_PATH))
}

fn generate_at(config: &InstanceConfig, path: &Path) -> Result<()> {
    if path.exists() {
        tracing::warn!(
            "{} already exists; skipping frontline config generation",
            path.display()
        );
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    tracing::info!("writing frontline config: {}", path.display());
    fs::write(path, nginx_conf(config)).context("could not create conf file")
}

/// Render the nginx configuration for `config`.
pub fn nginx_conf(config: &InstanceConfig) -> String {
    let hostname = &config.instance_hostname;
    let smtp_port = config.port_frontline_smtp;
    let relay_port = config.port_forwarding;
    let (cert, key) = http_cert_paths(hostname);
    let cert = cert.display();
    let key = key.display();
    format!(
        r"# Generated by `mailway generate-frontline-config`.
# Delete this file and re-run the command to regenerate it.

worker_processes auto;

events {{
    worker_connections 1024;
}}

stream {{
    server {{
        listen {smtp_port};
        proxy_pass 127.0.0.1:{relay_port};
        proxy_timeout 5m;
    }}
}}

http {{
    server {{
        listen 80;
        server_name {hostname};
        return 301 https://$host$request_uri;
    }}

    server {{
        listen 443 ssl;
        server_name {hostname};

        ssl_certificate {cert};
        ssl_certificate_key {key};

        location / {{
            return 404;
        }}
    }}
}}
"
    )
}
