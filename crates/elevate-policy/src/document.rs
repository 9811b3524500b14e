//! Policy documents.
//!
//! The policy is a TOML file with an optional `[defaults]` table and an
//! ordered array of `[[rule]]` tables:
//!
//! ```toml
//! [defaults]
//! persist_timeout_secs = 300
//!
//! [[rule]]
//! action = "permit"
//! identity = ":wheel"
//! options = ["persist"]
//!
//! [[rule]]
//! action = "deny"
//! identity = ":wheel"
//! target = "root"
//! command = "reboot"
//! ```
//!
//! Loading is all-or-nothing: either every rule converts or the whole
//! document is rejected.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PolicyError, Result};
use crate::rule::{EnvEntry, IdentitySpec, Rule, RuleAction, RuleOptions};
use crate::store::RuleStore;

/// Authentication backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthBackend {
    /// Password prompt verified against the shadow database.
    #[default]
    Shadow,
    /// Pluggable authentication modules.
    Pam,
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    /// The system log (`/dev/log`, facility authpriv).
    #[default]
    Syslog,
    /// Structured `tracing` events on stderr.
    Tracing,
}

/// Settings that apply to every rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Lifetime of a standing authentication grant, in seconds.
    #[serde(default = "default_persist_timeout")]
    pub persist_timeout_secs: u64,

    /// Authentication backend.
    #[serde(default)]
    pub auth: AuthBackend,

    /// Where audit events go.
    #[serde(default)]
    pub audit: AuditBackend,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            persist_timeout_secs: default_persist_timeout(),
            auth: AuthBackend::default(),
            audit: AuditBackend::default(),
        }
    }
}

fn default_persist_timeout() -> u64 {
    5 * 60
}

/// Longest standing grant a policy may ask for: one day.
pub const MAX_PERSIST_TIMEOUT_SECS: u64 = 24 * 60 * 60;

impl Defaults {
    fn validate(&self) -> Result<()> {
        if self.persist_timeout_secs > MAX_PERSIST_TIMEOUT_SECS {
            return Err(PolicyError::InvalidDefault {
                key: "persist_timeout_secs",
                reason: format!(
                    "{} exceeds the maximum of {MAX_PERSIST_TIMEOUT_SECS}",
                    self.persist_timeout_secs
                ),
            });
        }
        Ok(())
    }
}

/// A rule as written in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    action: RuleAction,
    identity: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    setenv: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(default)]
    defaults: Defaults,
    #[serde(default, rename = "rule")]
    rules: Vec<RuleSpec>,
}

impl RuleSpec {
    fn into_rule(self, index: usize) -> Result<Rule> {
        let invalid = |reason: String| PolicyError::Invalid { index, reason };

        let identity: IdentitySpec = self.identity.parse().map_err(invalid)?;

        if self.args.is_some() && self.command.is_none() {
            return Err(invalid("args given without a command".into()));
        }
        if self.command.as_deref() == Some("") {
            return Err(invalid("empty command".into()));
        }
        match self.target.as_deref() {
            Some("") => return Err(invalid("empty target".into())),
            Some("*") => return Err(invalid("target \"*\" is not allowed; omit target to allow any".into())),
            _ => {}
        }

        let mut options = RuleOptions::empty();
        for word in &self.options {
            let flag = RuleOptions::from_keyword(word)
                .ok_or_else(|| invalid(format!("unknown option {word:?}")))?;
            options |= flag;
        }

        let setenv = match self.setenv {
            Some(entries) => {
                if !options.contains(RuleOptions::SETENV) {
                    warn!(rule = index, "setenv list ignored without the setenv option");
                }
                entries
                    .iter()
                    .map(|e| e.parse::<EnvEntry>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(invalid)?
            }
            None => Vec::new(),
        };

        Ok(Rule {
            action: self.action,
            identity,
            target: self.target,
            command: self.command,
            args: self.args,
            options,
            setenv,
        })
    }
}

/// Who must own the policy file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Owned by uid 0 and not writable by group or other.
    RequireRoot,
    /// No check. Only for checking a file as its caller.
    Unchecked,
}

/// A loaded policy: defaults plus the rule store.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    /// Document-wide settings.
    pub defaults: Defaults,
    /// The rules in declared order.
    pub rules: RuleStore,
}

impl Policy {
    /// Parse a policy from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let doc: Document = toml::from_str(text).map_err(|e| PolicyError::Parse {
            message: e.to_string(),
        })?;
        doc.defaults.validate()?;

        let rules = doc
            .rules
            .into_iter()
            .enumerate()
            .map(|(i, spec)| spec.into_rule(i + 1))
            .collect::<Result<Vec<_>>>()?;

        debug!(rules = rules.len(), "policy parsed");
        Ok(Self {
            defaults: doc.defaults,
            rules: RuleStore::new(rules),
        })
    }

    /// Open, check and parse a policy file.
    ///
    /// Ownership is checked on the opened descriptor, so the file checked is
    /// the file read.
    pub fn load(path: impl AsRef<Path>, ownership: Ownership) -> Result<Self> {
        let path = path.as_ref();
        let io_err = |source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;

        if ownership == Ownership::RequireRoot {
            use std::os::unix::fs::MetadataExt;

            let meta = file.metadata().map_err(io_err)?;
            let mode = meta.mode() & 0o7777;
            if mode & 0o022 != 0 {
                return Err(PolicyError::InsecurePermissions {
                    path: path.to_path_buf(),
                    mode,
                });
            }
            if meta.uid() != 0 {
                return Err(PolicyError::NotOwnedByRoot {
                    path: path.to_path_buf(),
                    uid: meta.uid(),
                });
            }
        }

        let mut text = String::new();
        file.read_to_string(&mut text).map_err(io_err)?;
        Self::from_toml_str(&text)
    }
}
