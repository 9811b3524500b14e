//! Replacing this process with the permitted command.

use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

use elevate_policy::Environment;
use tracing::debug;

use crate::error::{ElevateError, Result};
use crate::privilege::{drop_privileges, ProcessCredentials};
use crate::system::Account;

/// A fully authorized command, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    /// Account to run as.
    pub target: Account,
    /// Command name or path, as requested.
    pub command: String,
    /// Arguments, excluding the command itself.
    pub args: Vec<String>,
    /// The complete environment of the new process.
    pub env: Environment,
}

impl PreparedCommand {
    /// Command and arguments joined by spaces, for logs.
    pub fn command_line(&self) -> String {
        command_line(&self.command, &self.args)
    }

    /// The process builder for this command.
    ///
    /// The environment is replaced wholesale, and a bare command name is
    /// searched for on the new environment's `PATH`.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args).env_clear().envs(self.env.iter());
        cmd
    }
}

/// Join a command and its arguments with spaces.
pub fn command_line(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hands a prepared command over to the operating system.
///
/// [`become_target`](Executor::become_target) runs first and must succeed
/// before [`exec`](Executor::exec) is called. On success `exec` does not
/// return. Whatever it returns is the reason the command did not start.
pub trait Executor {
    /// Take on the target's credentials for good.
    fn become_target(&self, target: &Account) -> Result<()>;

    /// Replace this process with the command.
    fn exec(&self, prepared: PreparedCommand) -> ElevateError;
}

/// Drops credentials and `execve`s in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn become_target(&self, target: &Account) -> Result<()> {
        drop_privileges(&mut ProcessCredentials, target)
    }

    fn exec(&self, prepared: PreparedCommand) -> ElevateError {
        debug!(command = %prepared.command, uid = prepared.target.uid, "exec");
        let err = prepared.to_command().exec();
        exec_error(prepared.command, err)
    }
}

fn exec_error(command: String, source: io::Error) -> ElevateError {
    if source.kind() == io::ErrorKind::NotFound {
        ElevateError::CommandNotFound { command }
    } else {
        ElevateError::Exec { command, source }
    }
}
