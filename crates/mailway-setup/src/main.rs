use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mailway_agent::SmtpResubmitter;
use mailway_agent::spool::recover_file;
use mailway_core::ConfigStore;
use mailway_core::config::DEFAULT_CONFIG_PATH;
use mailway_core::tracing_init::{default_filter, init_tracing};
use mailway_setup::escalate::escalate_if_needed;
use mailway_setup::{certs, frontline, os, services, setup, supervise};

/// Mailway self-hosted instance management.
#[derive(Debug, Parser)]
#[command(name = "mailway", version, about)]
struct Cli {
    /// Instance configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Provision this instance
    Setup {
        /// Configure a standalone instance without the Mailway dashboard
        #[arg(long)]
        local: bool,
    },
    /// Obtain a certificate for inbound SMTP through a DNS challenge
    SetupSecureSmtp,
    /// Render the frontline (nginx) configuration
    GenerateFrontlineConfig,
    /// Request a new instance credential
    NewJwt,
    /// Restart all Mailway services
    Restart,
    /// Follow the logs of all Mailway services
    Logs,
    /// Show the status of all Mailway services
    Status,
    /// Upgrade the Mailway packages and restart the services
    Update,
    /// Print the instance configuration
    Config,
    /// Run the credential renewal and mail redelivery loops
    Supervisor,
    /// Resubmit one queued message to the local relay
    Recover {
        /// Message file in the spool directory
        file: PathBuf,
    },
}

impl Commands {
    /// Name of the action when the command needs root.
    const fn privileged_action(&self) -> Option<&'static str> {
        match self {
            Self::Setup { .. } => Some("setup"),
            Self::SetupSecureSmtp => Some("setup-secure-smtp"),
            Self::Restart => Some("restart"),
            Self::Update => Some("update"),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Loading may create the config file, so elevate first.
    if let Some(action) = cli.command.privileged_action() {
        escalate_if_needed(action)?;
    }

    let config = ConfigStore::load(&cli.config)
        .with_context(|| format!("could not load config {}", cli.config.display()))?;
    init_tracing(&default_filter(&config.snapshot().log_level), cli.log_json);

    match cli.command {
        Commands::Setup { local } => {
            os::ensure_debian_family()?;
            setup::run(&config, local).await?;
        }
        Commands::SetupSecureSmtp => {
            let instance = config.snapshot();
            certs::setup_secure_smtp(&instance.instance_hostname, &instance.instance_email)
                .context("could not set up secure SMTP")?;
        }
        Commands::GenerateFrontlineConfig => {
            frontline::generate_frontline_conf(&config.snapshot())?;
        }
        Commands::NewJwt => setup::new_jwt(&config).await?,
        Commands::Restart => services::services("restart"),
        Commands::Logs => services::logs()?,
        Commands::Status => services::services("status"),
        Commands::Update => services::update().context("could not update")?,
        Commands::Config => print_config(&config)?,
        Commands::Supervisor => supervise::run(&config).await?,
        Commands::Recover { file } => {
            let resubmitter = SmtpResubmitter::new(config.snapshot().port_forwarding);
            recover_file(&resubmitter, &file)
                .await
                .with_context(|| format!("could not recover email {}", file.display()))?;
            tracing::info!("recovered {}", file.display());
        }
    }

    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_config(config: &ConfigStore) -> Result<()> {
    println!("{}", config.pretty_print()?);
    Ok(())
}
