//! Rule records.
//!
//! A [`Rule`] is immutable once built. The builder methods consume and return
//! the rule so a policy can be written inline in tests and docs:
//!
//! ```rust
//! use elevate_policy::{IdentitySpec, Rule, RuleOptions};
//!
//! let rule = Rule::permit(IdentitySpec::user("alice"))
//!     .as_target("root")
//!     .command("/usr/bin/apt")
//!     .args(["update"])
//!     .options(RuleOptions::NOPASS);
//! assert!(rule.pins_command());
//! ```

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What a matching rule decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RuleAction {
    /// Allow the command.
    Permit,
    /// Refuse the command.
    Deny,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permit => f.write_str("permit"),
            Self::Deny => f.write_str("deny"),
        }
    }
}

bitflags! {
    /// Independent modifiers on a rule.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RuleOptions: u8 {
        /// Skip interactive authentication.
        const NOPASS  = 0b0001;
        /// A successful authentication may be reused for a bounded time.
        const PERSIST = 0b0010;
        /// Apply the rule's environment override list.
        const SETENV  = 0b0100;
        /// Preserve the caller's environment, minus the deny-list.
        const KEEPENV = 0b1000;
    }
}

impl RuleOptions {
    /// Parse a single option keyword as written in a policy document.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "nopass" => Some(Self::NOPASS),
            "persist" => Some(Self::PERSIST),
            "setenv" => Some(Self::SETENV),
            "keepenv" => Some(Self::KEEPENV),
            _ => None,
        }
    }
}

/// Who a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentitySpec {
    /// Every caller.
    Any,
    /// A user, by name or numeric uid.
    User(String),
    /// Members of a group, by name or numeric gid.
    Group(String),
}

impl IdentitySpec {
    /// Match a single user.
    pub fn user(spec: impl Into<String>) -> Self {
        Self::User(spec.into())
    }

    /// Match members of a group.
    pub fn group(spec: impl Into<String>) -> Self {
        Self::Group(spec.into())
    }
}

impl FromStr for IdentitySpec {
    type Err = String;

    /// `*` is any caller, a leading `:` marks a group, anything else a user.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err("empty identity".into()),
            ":" => Err("empty group name".into()),
            "*" => Ok(Self::Any),
            _ => match s.strip_prefix(':') {
                Some(group) => Ok(Self::Group(group.to_string())),
                None => Ok(Self::User(s.to_string())),
            },
        }
    }
}

impl fmt::Display for IdentitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::User(u) => f.write_str(u),
            Self::Group(g) => write!(f, ":{g}"),
        }
    }
}

/// One entry of a rule's environment override list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnvEntry {
    /// `NAME=value`: set unconditionally.
    Set {
        /// Variable name.
        name: String,
        /// Value to set.
        value: String,
    },
    /// `NAME`: copy the caller's value if it has one.
    Passthrough(String),
    /// `-NAME`: remove the variable.
    Unset(String),
}

impl EnvEntry {
    /// The variable this entry affects.
    pub fn name(&self) -> &str {
        match self {
            Self::Set { name, .. } | Self::Passthrough(name) | Self::Unset(name) => name,
        }
    }
}

fn valid_var_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('=') && !name.contains('\0')
}

impl FromStr for EnvEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entry = if let Some(name) = s.strip_prefix('-') {
            Self::Unset(name.to_string())
        } else if let Some((name, value)) = s.split_once('=') {
            if value.contains('\0') {
                return Err(format!("value of {name} contains a NUL byte"));
            }
            Self::Set {
                name: name.to_string(),
                value: value.to_string(),
            }
        } else {
            Self::Passthrough(s.to_string())
        };

        if valid_var_name(entry.name()) {
            Ok(entry)
        } else {
            Err(format!("invalid environment entry {s:?}"))
        }
    }
}

impl fmt::Display for EnvEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { name, value } => write!(f, "{name}={value}"),
            Self::Passthrough(name) => f.write_str(name),
            Self::Unset(name) => write!(f, "-{name}"),
        }
    }
}

/// One policy entry.
///
/// `args` present implies `command` present; the document loader rejects
/// rules that break this, and the matcher does not re-check it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Decision when this rule is the last match.
    pub action: RuleAction,
    /// Which callers the rule applies to.
    pub identity: IdentitySpec,
    /// Which target the command may run as. `None` means any target.
    pub target: Option<String>,
    /// Exact command the request must name. `None` means any command.
    pub command: Option<String>,
    /// Exact argument vector. `None` means any arguments.
    pub args: Option<Vec<String>>,
    /// Modifiers.
    pub options: RuleOptions,
    /// Environment overrides, applied only with [`RuleOptions::SETENV`].
    pub setenv: Vec<EnvEntry>,
}

impl Rule {
    /// A rule with the given action and identity and no other constraint.
    pub fn new(action: RuleAction, identity: IdentitySpec) -> Self {
        Self {
            action,
            identity,
            target: None,
            command: None,
            args: None,
            options: RuleOptions::empty(),
            setenv: Vec::new(),
        }
    }

    /// A permit rule.
    pub fn permit(identity: IdentitySpec) -> Self {
        Self::new(RuleAction::Permit, identity)
    }

    /// A deny rule.
    pub fn deny(identity: IdentitySpec) -> Self {
        Self::new(RuleAction::Deny, identity)
    }

    /// Restrict the target identity.
    pub fn as_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Pin the command.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Pin the exact argument vector.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Add option flags.
    pub fn options(mut self, options: RuleOptions) -> Self {
        self.options |= options;
        self
    }

    /// Set the environment override list and the SETENV flag.
    pub fn setenv<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = EnvEntry>,
    {
        self.setenv = entries.into_iter().collect();
        self.options |= RuleOptions::SETENV;
        self
    }

    /// Whether the rule names a specific command.
    pub fn pins_command(&self) -> bool {
        self.command.is_some()
    }

    /// Whether authentication is skipped under this rule.
    pub fn is_nopass(&self) -> bool {
        self.options.contains(RuleOptions::NOPASS)
    }
}
