//! Error types for loading a policy.
//!
//! Matching itself is infallible: every failure here happens before the first
//! decision is made, and none of them leaves a partially loaded store behind.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Configuration faults. All of them are fatal to the invocation.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// The policy source could not be opened or read.
    #[error("could not read policy file {path}: {source}")]
    Io {
        /// The policy file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The policy source is not a syntactically valid document.
    #[error("syntax error in policy: {message}")]
    Parse {
        /// Parser diagnostic.
        message: String,
    },

    /// A rule is well-formed syntax but semantically invalid.
    #[error("invalid rule #{index}: {reason}")]
    Invalid {
        /// One-based position of the rule in the document.
        index: usize,
        /// Why the rule was rejected.
        reason: String,
    },

    /// A `[defaults]` setting is out of range.
    #[error("invalid default {key}: {reason}")]
    InvalidDefault {
        /// The offending key.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The policy file may be modified by someone other than its owner.
    #[error("{path} is writable by group or other (mode {mode:o})")]
    InsecurePermissions {
        /// The policy file.
        path: PathBuf,
        /// The permission bits found.
        mode: u32,
    },

    /// The policy file is not owned by the superuser.
    #[error("{path} is not owned by root (owner uid {uid})")]
    NotOwnedByRoot {
        /// The policy file.
        path: PathBuf,
        /// The owner found.
        uid: u32,
    },
}
