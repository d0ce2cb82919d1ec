//! Logging setup for the `mailway` binary.
//!
//! Every subcommand logs through the same subscriber, so the supervisor and
//! the interactive setup share filtering and output format.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_filter`. With `log_json` every event is
/// written as one JSON object per line, which journald stores verbatim.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let json = log_json.then(|| fmt::layer().json());
    let text = (!log_json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

/// Filter directive enabling `level` for all Mailway crates.
pub fn default_filter(level: &str) -> String {
    ["mailway", "mailway_setup", "mailway_agent", "mailway_core"]
        .map(|target| format!("{target}={level}"))
        .join(",")
}
