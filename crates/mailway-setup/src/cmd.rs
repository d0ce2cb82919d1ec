//! Logged execution of the system tools driven by the setup commands.

use std::env;
use std::process::Command;

use anyhow::{Context, Result, bail};

/// Where the child's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    /// Collected; stderr is reported on failure.
    Captured,
    /// Inherited from the terminal, for tools that talk to the operator.
    Attached,
}

fn exec(description: &str, program: &str, args: &[&str], output: Output) -> Result<()> {
    let line = format!("{program} {}", args.join(" "));
    tracing::info!("{description}");
    tracing::debug!(command = %line, attached = output == Output::Attached, "exec");

    let mut command = Command::new(program);
    command.args(args);
    let (status, stderr) = match output {
        Output::Captured => {
            let out = command
                .output()
                .with_context(|| format!("could not run `{line}`"))?;
            (out.status, String::from_utf8_lossy(&out.stderr).trim().to_string())
        }
        Output::Attached => (
            command
                .status()
                .with_context(|| format!("could not run `{line}`"))?,
            String::new(),
        ),
    };

    if status.success() {
        return Ok(());
    }
    tracing::error!(command = %line, %status, "{stderr}");
    if stderr.is_empty() {
        bail!("{description} failed ({status})");
    }
    bail!("{description} failed ({status}): {stderr}")
}

/// Run `program` with its output captured.
pub fn run_cmd(description: &str, program: &str, args: &[&str]) -> Result<()> {
    exec(description, program, args, Output::Captured)
}

/// Run `program` attached to the terminal (certbot, journalctl, apt-get).
pub fn run_cmd_interactive(description: &str, program: &str, args: &[&str]) -> Result<()> {
    exec(description, program, args, Output::Attached)
}

/// Whether `program` is an executable file on `PATH`.
pub fn command_exists(program: &str) -> bool {
    env::var_os("PATH").is_some_and(|paths| {
        env::split_paths(&paths).any(|dir| dir.join(program).is_file())
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn failing_command_reports_description() {
        let err = run_cmd("checking false", "false", &[]).unwrap_err();
        assert!(err.to_string().starts_with("checking false failed"));
    }

    #[test]
    fn stderr_is_part_of_the_error() {
        let err = run_cmd("listing nothing", "ls", &["/mailway/no/such/dir"]).unwrap_err();
        assert!(err.to_string().contains("/mailway/no/such/dir"), "{err}");
    }

    #[test]
    fn missing_program_is_an_error() {
        assert!(run_cmd("running ghost", "mailway-no-such-program", &[]).is_err());
        assert!(!command_exists("mailway-no-such-program"));
        assert!(command_exists("sh"));
    }
}
