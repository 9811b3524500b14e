//! elevate - run a command as another user
//!
//! # Examples
//!
//! ```bash
//! # Run a command as root
//! elevate systemctl restart nginx
//!
//! # Run as another user, never prompting
//! elevate -n -u postgres psql
//!
//! # Start the caller's shell as root
//! elevate -s
//!
//! # Would this be allowed?
//! elevate -C /etc/elevate.toml reboot
//!
//! # Forget a remembered authentication
//! elevate -L
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use elevate::ElevateError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod check;
mod run;

/// Run a command as another user, as allowed by the system policy.
#[derive(Parser, Debug)]
#[command(name = "elevate")]
#[command(version, about, long_about = None, disable_version_flag = true)]
#[command(arg(
    clap::Arg::new("version")
        .short('v')
        .action(clap::ArgAction::Version)
        .help("Print version")
))]
struct Cli {
    /// Parse CONFIG as the calling user and report what it would allow
    #[arg(short = 'C', value_name = "CONFIG", conflicts_with = "shell")]
    check: Option<PathBuf>,

    /// Clear any remembered authentication and exit
    #[arg(short = 'L')]
    clear: bool,

    /// Never prompt; fail if authentication is required
    #[arg(short = 'n')]
    non_interactive: bool,

    /// Run the caller's shell
    #[arg(short = 's', conflicts_with = "command")]
    shell: bool,

    /// Run as USER (name or uid) instead of root
    #[arg(short = 'u', value_name = "USER")]
    user: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Command and arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Cli {
    /// Exactly one of a command or `-s`, unless only checking or clearing.
    fn validate(&self) -> std::result::Result<(), clap::Error> {
        if self.clear || self.check.is_some() || self.shell || !self.command.is_empty() {
            return Ok(());
        }
        Err(Cli::command().error(
            clap::error::ErrorKind::MissingRequiredArgument,
            "a command or -s is required",
        ))
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "elevate=debug,elevate_policy=debug,warn"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("ELEVATE_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose))
        .init();
}

fn execute(cli: &Cli) -> Result<ExitCode> {
    if cli.clear {
        return run::clear();
    }
    if let Some(path) = &cli.check {
        return check::execute(path, cli);
    }
    run::execute(cli)
}

/// Exit status for a failure.
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ElevateError>() {
        Some(ElevateError::CommandNotFound { .. }) => 127,
        _ => 1,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = cli.validate() {
        e.exit();
    }
    init_logging(cli.verbose);

    match execute(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("elevate: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("elevate").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_command_arguments_are_not_options() {
        let cli = parse(&["-u", "operator", "ls", "-l", "-u", "x"]);
        assert_eq!(cli.user.as_deref(), Some("operator"));
        assert_eq!(cli.command, vec!["ls", "-l", "-u", "x"]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_flags_combine() {
        let cli = parse(&["-ns", "--verbose"]);
        assert!(cli.non_interactive);
        assert!(cli.shell);
        assert!(cli.verbose);
    }

    #[test]
    fn test_short_v_prints_version() {
        let err = Cli::try_parse_from(["elevate", "-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        assert!(err.to_string().contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_shell_conflicts_with_command() {
        let err = Cli::try_parse_from(["elevate", "-s", "ls"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_check_conflicts_with_shell() {
        let err = Cli::try_parse_from(["elevate", "-C", "/tmp/p.toml", "-s"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_nothing_to_do_is_a_usage_error() {
        let cli = parse(&["-n"]);
        assert!(cli.validate().is_err());
        assert!(parse(&["-L"]).validate().is_ok());
        assert!(parse(&["-s"]).validate().is_ok());
        assert!(parse(&["-C", "/tmp/p.toml"]).validate().is_ok());
    }

    #[test]
    fn test_exit_codes() {
        let not_found = anyhow::Error::new(ElevateError::CommandNotFound {
            command: "nope".into(),
        });
        assert_eq!(exit_status(&not_found), 127);
        let failed = anyhow::Error::new(ElevateError::AuthFailed);
        assert_eq!(exit_status(&failed), 1);
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
