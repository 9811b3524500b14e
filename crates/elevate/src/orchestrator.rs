//! The authorization state machine.
//!
//! ```text
//! Start → ResolveIdentities → AuthorizeDecision ─deny──→ [Denied]
//!                                   │ permit
//!                                   ▼
//!                              Authenticate? ─fail──→ [AuthFailed]
//!                                   │
//!                                   ▼
//!                               BuildEnv → [Execute]
//! ```
//!
//! Each terminal state is reached exactly once per invocation. Denials and
//! authentication failures are audited as different events and surface as
//! different [`ElevateError`] variants.
//!
//! # Example
//!
//! ```rust
//! use elevate::auth::{AuthOutcome, CallbackAuthenticator};
//! use elevate::system::StaticAccounts;
//! use elevate::{Invocation, Orchestrator};
//! use elevate_policy::{GroupSet, Policy};
//!
//! let policy = Policy::from_toml_str(r#"
//! [[rule]]
//! action = "permit"
//! identity = ":wheel"
//! options = ["nopass"]
//! "#).unwrap();
//!
//! let accounts = StaticAccounts::new()
//!     .with_account("root", 0, 0)
//!     .with_account("alice", 1000, 1000)
//!     .with_group("wheel", 10);
//!
//! let orchestrator = Orchestrator::new(
//!     &policy,
//!     &accounts,
//!     CallbackAuthenticator::always(AuthOutcome::Failure),
//! );
//!
//! let caller = elevate::Caller {
//!     account: elevate::system::AccountDatabase::account_by_uid(&accounts, 1000).unwrap(),
//!     groups: GroupSet::from(vec![1000, 10]),
//! };
//! let prepared = orchestrator
//!     .prepare(&caller, &Invocation::new("id"))
//!     .unwrap();
//! assert_eq!(prepared.target.name, "root");
//! assert_eq!(prepared.env.get("ELEVATE_USER"), Some("alice"));
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use elevate_policy::{build_environment, Decision, EnvContext, Id, Policy, Request, Rule, RuleOptions};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditSink, AuthFailure, TracingSink};
use crate::auth::{AuthOutcome, AuthRequest, Authenticator};
use crate::error::{ElevateError, Result};
use crate::exec::{command_line, Executor, PreparedCommand};
use crate::persist::{GrantStore, NoGrants};
use crate::system::{Account, AccountDatabase, Caller};

/// One request to run a command as someone else.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Target selector: a name or a numeric uid. `None` means root.
    pub target: Option<String>,
    /// Command name or path.
    pub command: String,
    /// Arguments, excluding the command itself.
    pub args: Vec<String>,
    /// Fail instead of prompting when authentication is needed.
    pub non_interactive: bool,
    /// The caller's environment.
    pub env: BTreeMap<String, String>,
    /// Working directory, for the audit trail.
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    /// A request to run `command` as root with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Set the arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Run as `target` instead of root.
    pub fn as_user(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Never prompt.
    pub fn non_interactive(mut self, yes: bool) -> Self {
        self.non_interactive = yes;
        self
    }

    /// Use this caller environment.
    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Record this working directory.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Command and arguments joined by spaces.
    pub fn command_line(&self) -> String {
        command_line(&self.command, &self.args)
    }
}

/// Result of a dry-run check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Permitted, with authentication.
    Permit,
    /// Permitted without authentication.
    PermitNopass,
    /// Not permitted.
    Deny,
}

impl std::fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Permit => "permit",
            Self::PermitNopass => "permit nopass",
            Self::Deny => "deny",
        })
    }
}

/// Drives one invocation from identities to exec.
pub struct Orchestrator<'a> {
    policy: &'a Policy,
    accounts: &'a dyn AccountDatabase,
    authenticator: Box<dyn Authenticator>,
    grants: Box<dyn GrantStore>,
    audit: Box<dyn AuditSink>,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator with no standing grants and audit via tracing.
    pub fn new(
        policy: &'a Policy,
        accounts: &'a dyn AccountDatabase,
        authenticator: impl Authenticator + 'static,
    ) -> Self {
        Self {
            policy,
            accounts,
            authenticator: Box::new(authenticator),
            grants: Box::new(NoGrants),
            audit: Box::new(TracingSink),
        }
    }

    /// Use a standing-grant store.
    pub fn with_grants(mut self, grants: impl GrantStore + 'static) -> Self {
        self.grants = Box::new(grants);
        self
    }

    /// Send audit events to `sink`.
    pub fn with_audit(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Box::new(sink);
        self
    }

    /// Resolve the target selector. Unknown names are fatal here.
    fn resolve_target(&self, invocation: &Invocation) -> Result<Id> {
        match &invocation.target {
            None => Ok(0),
            Some(spec) => self
                .accounts
                .resolve_user(spec)
                .map(|identity| identity.uid)
                .ok_or_else(|| ElevateError::UnknownUser { spec: spec.clone() }),
        }
    }

    fn decide(&self, caller: &Caller, target: Id, invocation: &Invocation) -> Decision<'a> {
        let request = Request::new(
            caller.account.uid,
            &caller.groups,
            target,
            &invocation.command,
            &invocation.args,
        );
        self.policy.rules.authorize(self.accounts, &request)
    }

    /// Dry run: what would the policy say? Nothing is audited, nobody is
    /// prompted.
    pub fn check(&self, caller: &Caller, invocation: &Invocation) -> Result<CheckOutcome> {
        let target = self.resolve_target(invocation)?;
        let decision = self.decide(caller, target, invocation);
        Ok(match decision.permitted_rule() {
            Some(rule) if rule.is_nopass() => CheckOutcome::PermitNopass,
            Some(_) => CheckOutcome::Permit,
            None => CheckOutcome::Deny,
        })
    }

    /// Run the state machine up to, but not including, exec.
    pub fn prepare(&self, caller: &Caller, invocation: &Invocation) -> Result<PreparedCommand> {
        let caller_name = caller.account.name.as_str();

        // ResolveIdentities
        let target = self.resolve_target(invocation)?;
        debug!(caller = caller_name, target, command = %invocation.command, "identities resolved");

        // AuthorizeDecision
        let decision = self.decide(caller, target, invocation);
        let Some(rule) = decision.permitted_rule() else {
            let command_line = invocation.command_line();
            self.audit.record(&AuditEvent::CommandRejected {
                caller: caller_name.to_string(),
                command_line: command_line.clone(),
            });
            return Err(ElevateError::Denied {
                caller: caller_name.to_string(),
                command_line,
            });
        };

        let target_account = self
            .accounts
            .account_by_uid(target)
            .ok_or(ElevateError::NoTargetAccount { uid: target })?;

        // Authenticate?
        self.authenticate(caller, &target_account, rule, invocation)?;

        // BuildEnv
        let ctx = EnvContext {
            caller_name: caller_name.to_string(),
            target_name: target_account.name.clone(),
            target_home: target_account.home.to_string_lossy().into_owned(),
            target_shell: target_account.shell.to_string_lossy().into_owned(),
        };
        let env = build_environment(&invocation.env, rule, &ctx);

        Ok(PreparedCommand {
            target: target_account,
            command: invocation.command.clone(),
            args: invocation.args.clone(),
            env,
        })
    }

    fn authenticate(
        &self,
        caller: &Caller,
        target: &Account,
        rule: &Rule,
        invocation: &Invocation,
    ) -> Result<()> {
        if rule.is_nopass() {
            return Ok(());
        }

        let uid = caller.account.uid;
        let persist = rule.options.contains(RuleOptions::PERSIST);
        if persist && self.grants.is_valid(uid) {
            debug!(uid, "standing grant honoured");
            self.refresh_grant(uid);
            return Ok(());
        }

        if invocation.non_interactive {
            return Err(ElevateError::AuthRequired);
        }

        let request = AuthRequest::new(caller.account.name.clone(), target.name.clone());
        let (cause, err) = match self.authenticator.authenticate(&request) {
            AuthOutcome::Success => {
                if persist {
                    self.refresh_grant(uid);
                }
                return Ok(());
            }
            AuthOutcome::Failure => (AuthFailure::Rejected, ElevateError::AuthFailed),
            AuthOutcome::NoTerminal => (AuthFailure::NoTerminal, ElevateError::NoTerminal),
        };

        self.audit.record(&AuditEvent::AuthenticationFailed {
            caller: caller.account.name.clone(),
            cause,
        });
        Err(err)
    }

    fn refresh_grant(&self, uid: Id) {
        let ttl = Duration::from_secs(self.policy.defaults.persist_timeout_secs);
        if let Err(e) = self.grants.refresh(uid, ttl) {
            warn!(uid, error = %e, "could not store standing grant");
        }
    }

    /// Prepare, drop to the target, audit, and hand over to `executor`.
    ///
    /// The execution is audited only once the credential drop has
    /// succeeded. Only returns on failure.
    pub fn run(
        &self,
        caller: &Caller,
        invocation: &Invocation,
        executor: &dyn Executor,
    ) -> ElevateError {
        let prepared = match self.prepare(caller, invocation) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if let Err(e) = executor.become_target(&prepared.target) {
            return e;
        }

        let cwd = invocation
            .cwd
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(failed)".to_string());
        self.audit.record(&AuditEvent::CommandExecuted {
            caller: caller.account.name.clone(),
            command_line: invocation.command_line(),
            target: prepared.target.name.clone(),
            cwd,
        });
        info!(target_user = %prepared.target.name, command = %prepared.command, "executing");

        executor.exec(prepared)
    }
}
