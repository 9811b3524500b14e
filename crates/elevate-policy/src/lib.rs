//! # Elevate Policy
//!
//! The authorization decision engine behind `elevate`, a minimal
//! run-as-another-user command runner.
//!
//! This crate is pure: it never touches the process credentials, never
//! prompts, never execs. It answers two questions:
//!
//! 1. **May this caller run this command as that target?** ([`RuleStore::authorize`])
//! 2. **What environment does the command get?** ([`build_environment`])
//!
//! ## Last Match Wins
//!
//! Rules are evaluated in declared order and every matching rule overwrites
//! the previous match. Broad grants go first, narrow exceptions after:
//!
//! ```text
//! permit :wheel as root            # admins may run anything...
//! deny   :wheel as root cmd=reboot # ...except reboot
//! ```
//!
//! When nothing matches, the answer is deny.
//!
//! ## Quick Start
//!
//! ```rust
//! use elevate_policy::{
//!     GroupSet, IdentitySpec, Outcome, Request, Rule, RuleStore, StaticResolver,
//! };
//!
//! let resolver = StaticResolver::new()
//!     .with_user("root", 0)
//!     .with_user("alice", 1000)
//!     .with_group("wheel", 10);
//!
//! let store = RuleStore::new(vec![
//!     Rule::permit(IdentitySpec::group("wheel")).as_target("root"),
//!     Rule::deny(IdentitySpec::group("wheel"))
//!         .as_target("root")
//!         .command("reboot"),
//! ]);
//!
//! let groups = GroupSet::from(vec![1000, 10]);
//! let ls = Request::new(1000, &groups, 0, "ls", &[]);
//! assert_eq!(store.authorize(&resolver, &ls).outcome, Outcome::Permit);
//!
//! let reboot = Request::new(1000, &groups, 0, "reboot", &[]);
//! assert_eq!(store.authorize(&resolver, &reboot).outcome, Outcome::Deny);
//! ```
//!
//! ## Security Model
//!
//! - A name that does not resolve inside a rule makes that rule not match.
//!   It never aborts evaluation and never widens a grant.
//! - Command and argument comparison is exact. There is no globbing and no
//!   path normalization, so `ls` and `/bin/ls` are different commands.
//! - The default environment carries nothing the caller controls beyond a
//!   short allow-list of terminal and locale variables.

#![deny(missing_docs)]
#![deny(unsafe_code)]

#[cfg(feature = "serde")]
pub mod document;
pub mod env;
mod error;
pub mod identity;
pub mod matcher;
mod rule;
mod store;

#[cfg(feature = "serde")]
pub use document::{AuditBackend, AuthBackend, Defaults, Ownership, Policy, MAX_PERSIST_TIMEOUT_SECS};
pub use env::{build_environment, EnvContext, Environment, SAFE_PATH};
pub use error::{PolicyError, Result};
pub use identity::{GroupSet, Id, Identity, IdentityResolver, StaticResolver, MAX_ID};
pub use matcher::{authorize, rule_matches, Decision, Outcome, Request};
pub use rule::{EnvEntry, IdentitySpec, Rule, RuleAction, RuleOptions};
pub use store::RuleStore;
