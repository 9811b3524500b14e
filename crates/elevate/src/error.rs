//! Error types for elevate enforcement.

use elevate_policy::PolicyError;
use thiserror::Error;

use crate::privilege::DropStep;

/// Result type for elevate operations.
pub type Result<T> = std::result::Result<T, ElevateError>;

/// Everything that ends an invocation without running the command.
///
/// Authorization and authentication failures are separate variants and are
/// never folded into one another. Authentication messages are deliberately
/// generic: they do not tell a wrong password apart from an unknown or
/// locked account.
#[derive(Error, Debug)]
pub enum ElevateError {
    /// The policy could not be loaded.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The requested target does not resolve.
    #[error("unknown user")]
    UnknownUser {
        /// The selector as given.
        spec: String,
    },

    /// The caller's uid has no account entry.
    #[error("no passwd entry for uid {uid}")]
    UnknownCaller {
        /// Real uid of the caller.
        uid: u32,
    },

    /// The target uid has no account entry.
    #[error("no passwd entry for target")]
    NoTargetAccount {
        /// The target uid.
        uid: u32,
    },

    /// No rule permits the request.
    #[error("Operation not permitted")]
    Denied {
        /// Caller's account name.
        caller: String,
        /// Full requested command line.
        command_line: String,
    },

    /// Authentication would be needed but the caller asked for none.
    #[error("Authorization required")]
    AuthRequired,

    /// The authentication backend rejected the caller.
    #[error("Authorization failed")]
    AuthFailed,

    /// Interactive authentication is impossible without a terminal.
    #[error("a tty is required")]
    NoTerminal,

    /// A credential drop step failed. The process must not continue.
    #[error("{step}: {source}")]
    PrivilegeDrop {
        /// The step that failed.
        step: DropStep,
        /// The OS error.
        #[source]
        source: nix::Error,
    },

    /// The command does not exist on the search path.
    #[error("{command}: command not found")]
    CommandNotFound {
        /// The command as requested.
        command: String,
    },

    /// Replacing the process image failed.
    #[error("{command}: {source}")]
    Exec {
        /// The command as requested.
        command: String,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },

    /// An OS query needed before any decision failed.
    #[error("{context}: {source}")]
    System {
        /// What was being attempted.
        context: &'static str,
        /// The OS error.
        #[source]
        source: nix::Error,
    },

    /// IO error from an underlying operation.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ElevateError {
    /// Whether this is an authorization (policy) refusal.
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// Whether this is an authentication failure of any kind.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthRequired | Self::AuthFailed | Self::NoTerminal)
    }
}
