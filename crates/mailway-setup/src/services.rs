//! systemd units shipped by the Mailway packages.

use anyhow::Result;

use crate::cmd::run_cmd_interactive;

/// Units managed together, in start order.
pub const SERVICES: [&str; 6] = [
    "mailout",
    "maildb",
    "auth",
    "forwarding",
    "frontline",
    "mailway-supervisor",
];

const SUPERVISOR_SERVICE: &str = "mailway-supervisor";

/// Apply a systemctl action to every unit. A failing unit is logged and the
/// remaining ones are still processed.
pub fn services(action: &str) {
    for service in SERVICES {
        let unit = format!("{service}.service");
        if let Err(e) = run_cmd_interactive(
            &format!("{action} {unit}"),
            "systemctl",
            &[action, &unit],
        ) {
            tracing::error!(service, "failed to {action}: {e:#}");
        }
    }
}

/// Follow the journal of every unit.
pub fn logs() -> Result<()> {
    run_cmd_interactive("following service logs", "journalctl", &journal_args())
}

fn journal_args() -> Vec<&'static str> {
    let mut args = vec!["-f"];
    for service in SERVICES {
        args.extend(["-u", service]);
    }
    args
}

/// Upgrade the Mailway packages and restart the units.
pub fn update() -> Result<()> {
    run_cmd_interactive("refreshing package lists", "apt-get", &["update"])?;
    run_cmd_interactive(
        "upgrading mailway",
        "apt-get",
        &["install", "-y", "mailway"],
    )?;
    for package in packages() {
        run_cmd_interactive(
            &format!("upgrading mailway-{package}"),
            "apt-get",
            &["install", "-y", &format!("mailway-{package}")],
        )?;
    }
    services("restart");
    Ok(())
}

/// Packages installed per unit; the supervisor ships with `mailway` itself.
fn packages() -> impl Iterator<Item = &'static str> {
    SERVICES
        .into_iter()
        .filter(|service| *service != SUPERVISOR_SERVICE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_follows_every_unit() {
        let args = journal_args();
        assert_eq!(args[0], "-f");
        assert_eq!(args.len(), 1 + 2 * SERVICES.len());
        assert!(args.contains(&"mailway-supervisor"));
    }

    #[test]
    fn supervisor_is_not_a_separate_package() {
        let packages: Vec<_> = packages().collect();
        assert_eq!(
            packages,
            ["mailout", "maildb", "auth", "forwarding", "frontline"]
        );
    }
}
