//! Instance provisioning.
//!
//! A connected instance is approved by the operator through the dashboard and
//! receives its identity from the control service. A local instance is
//! configured entirely from operator input.

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use mailway_agent::handshake::POLL_INTERVAL;
use mailway_agent::{Authorizer, ControlClient, Handshake, Url, approval_url};
use mailway_core::{ConfigStore, CredentialStore, CredentialVerifier, InstanceMode};
use tokio_util::sync::CancellationToken;

use crate::certs::ensure_http_cert;
use crate::dkim::{dns_txt_record, ensure_dkim};
use crate::frontline::generate_frontline_conf;
use crate::preflight::check_outbound_port;
use crate::prompt::{Validation, confirm, confirm_done, text_from_env_or_prompt};
use crate::services::services;

/// Build the credential authorizer for this instance.
pub fn authorizer(config: &Arc<ConfigStore>) -> Result<Authorizer<ControlClient>> {
    let snapshot = config.snapshot();
    let client =
        ControlClient::new(&snapshot.api_base_url).context("failed to build API client")?;
    let verifier = CredentialVerifier::from_file(snapshot.public_key_path);
    Ok(Authorizer::new(
        client,
        Arc::clone(config),
        verifier,
        CredentialStore::new(),
    ))
}

/// Run the setup flow for the mode selected on the command line.
pub async fn run(config: &Arc<ConfigStore>, local: bool) -> Result<()> {
    if local {
        tracing::info!("setup for local mode");
    }
    let snapshot = config.snapshot();
    preflight(snapshot.port_frontline_smtp)?;

    let dkim = ensure_dkim(config).context("failed to generate DKIM keys")?;

    let client = ControlClient::new(&snapshot.api_base_url)
        .context("failed to build API client")?;
    let ip = client
        .outbound_ip()
        .await
        .context("failed to get outbound IP")?;

    if local {
        setup_local(config, ip, &dkim)
    } else {
        setup_connected(config, ip, &dkim).await
    }
}

async fn setup_connected(config: &Arc<ConfigStore>, ip: IpAddr, dkim: &str) -> Result<()> {
    let snapshot = config.snapshot();
    let dashboard = Url::parse(&snapshot.dashboard_url)
        .with_context(|| format!("invalid dashboard URL {:?}", snapshot.dashboard_url))?;
    print_approval_url(&approval_url(&dashboard, &snapshot.server_id, ip, dkim));

    let authorizer = authorizer(config)?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut handshake = Handshake::new(&authorizer, POLL_INTERVAL);
    let result = handshake.run(&cancel).await;
    interrupt.abort();
    let report = result.context("instance authorization failed")?;
    tracing::info!(
        polls = report.polls,
        hostname = %report.claims.data.hostname,
        "instance authorized"
    );

    let instance = config.snapshot();
    generate_frontline_conf(&instance).context("failed to generate frontline conf")?;
    ensure_http_cert(&instance.instance_hostname, &instance.instance_email)
        .context("failed to generate certificate")?;

    tracing::info!("setup completed; starting email service");
    services("start");
    Ok(())
}

fn setup_local(config: &Arc<ConfigStore>, ip: IpAddr, dkim: &str) -> Result<()> {
    let hostname = text_from_env_or_prompt(
        "MW_HOSTNAME",
        "Please enter the name of your email server (for example: mx.example.com)",
        Validation::DnsName,
    )?;

    print_dns_record("Add a DNS record (type A)", &hostname, &ip.to_string());
    confirm_done(false, "add the A DNS record")?;

    print_dns_record(
        "Optionally, add a DNS record (type TXT)",
        &hostname,
        &spf_record(ip),
    );
    confirm_done(true, "add the TXT DNS record")?;

    print_dns_record(
        "Optionally, add a DNS record (type TXT)",
        &format!("smtp._domainkey.{hostname}"),
        &dns_txt_record(dkim),
    );
    confirm_done(true, "add the TXT DNS record")?;

    let email = text_from_env_or_prompt(
        "MW_EMAIL",
        "Please enter your email address (only used to generate certificates)",
        Validation::Email,
    )?;

    config
        .write_instance_config(InstanceMode::Local, &hostname, &email)
        .context("could not write instance config")?;

    generate_frontline_conf(&config.snapshot()).context("failed to generate frontline conf")?;

    tracing::info!("setup completed; starting email service");
    services("start");
    Ok(())
}

fn spf_record(ip: IpAddr) -> String {
    let prefix = if ip.is_ipv4() { "ip4" } else { "ip6" };
    let bits = if ip.is_ipv4() { 32 } else { 128 };
    format!("v=spf1 {prefix}:{ip}/{bits} ~all")
}

fn preflight(port: u16) -> Result<()> {
    if let Err(e) = check_outbound_port(port) {
        tracing::warn!("preflight check failed: {e:#}");
        if !confirm("Outbound SMTP seems blocked. Continue anyway?")? {
            bail!("setup aborted after failed preflight check");
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_dns_record(title: &str, name: &str, value: &str) {
    println!("{title}:");
    println!("Name: {name}");
    println!("Value:");
    println!();
    println!("{value}");
    println!();
}

#[allow(clippy::print_stdout)]
fn print_approval_url(url: &Url) {
    println!();
    println!("  Open the following link in your browser to approve this instance:");
    println!();
    println!("    {url}");
    println!();
}

/// Request a fresh credential outside of the renewal schedule.
pub async fn new_jwt(config: &Arc<ConfigStore>) -> Result<()> {
    if config.snapshot().is_local() {
        bail!("local instances have no instance credential to renew");
    }
    let credential = authorizer(config)?
        .acquire()
        .await
        .context("failed to obtain a new instance credential")?;
    tracing::info!(hostname = %credential.hostname(), "instance credential replaced");
    Ok(())
}
