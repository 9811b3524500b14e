//! # Elevate
//!
//! Enforcement for `elevate`: everything that touches the operating system.
//!
//! [`elevate_policy`] decides; this crate acts on the decision. It
//! identifies the caller, authenticates them, keeps the audit trail,
//! remembers standing grants, switches credentials and finally replaces the
//! process with the permitted command.
//!
//! ## Modules
//!
//! | Module | Concern |
//! |--------|---------|
//! | [`system`] | passwd and group lookups, the caller's credentials |
//! | [`auth`] | password prompt, shadow and PAM backends |
//! | [`persist`] | standing grants for `persist` rules |
//! | [`audit`] | syslog and tracing audit sinks |
//! | [`privilege`] | ordered credential drop |
//! | [`exec`] | process replacement |
//! | [`orchestrator`] | the state machine tying it together |
//!
//! Every OS-facing piece sits behind a trait ([`system::AccountDatabase`],
//! [`auth::Authenticator`], [`persist::GrantStore`], [`audit::AuditSink`],
//! [`exec::Executor`]) so the state machine can be driven entirely in memory.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod audit;
pub mod auth;
mod error;
pub mod exec;
pub mod orchestrator;
pub mod persist;
pub mod privilege;
pub mod system;

pub use error::{ElevateError, Result};
pub use exec::{Executor, PreparedCommand, SystemExecutor};
pub use orchestrator::{CheckOutcome, Invocation, Orchestrator};
pub use system::{Account, Caller};

/// Path of the system policy.
pub const POLICY_PATH: &str = "/etc/elevate.toml";
