//! The privileged path: load the system policy, authorize, exec.

use std::collections::BTreeMap;
use std::process::ExitCode;

use anyhow::Result;
use elevate::audit::{AuditSink, SyslogSink, TracingSink};
use elevate::auth::{Authenticator, ShadowAuthenticator};
use elevate::persist::{GrantStore, TimestampStore};
use elevate::system::SystemAccounts;
use elevate::{Caller, Invocation, Orchestrator, SystemExecutor, POLICY_PATH};
use elevate_policy::{AuditBackend, AuthBackend, Ownership, Policy};
use tracing::debug;

use crate::Cli;

/// Run the requested command. Returns only on failure.
pub(crate) fn execute(cli: &Cli) -> Result<ExitCode> {
    let accounts = SystemAccounts;
    let caller = Caller::current(&accounts)?;

    let policy = Policy::load(POLICY_PATH, Ownership::RequireRoot)?;
    debug!(path = POLICY_PATH, rules = policy.rules.len(), "policy loaded");

    let invocation = invocation(cli, &caller);
    let orchestrator = Orchestrator::new(&policy, &accounts, authenticator(policy.defaults.auth)?)
        .with_grants(TimestampStore::system())
        .with_audit(audit_sink(policy.defaults.audit));

    Err(orchestrator.run(&caller, &invocation, &SystemExecutor).into())
}

/// Forget the caller's standing grant for this session.
pub(crate) fn clear() -> Result<ExitCode> {
    let uid = Caller::current(&SystemAccounts)?.account.uid;
    TimestampStore::system().clear(uid)?;
    Ok(ExitCode::SUCCESS)
}

/// Build the invocation from the command line and the process state.
pub(crate) fn invocation(cli: &Cli, caller: &Caller) -> Invocation {
    let env = caller_environment();

    let (command, args) = if cli.shell {
        let shell = env
            .get("SHELL")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| caller.account.shell.to_string_lossy().into_owned());
        (shell, Vec::new())
    } else {
        match cli.command.split_first() {
            Some((command, args)) => (command.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        }
    };

    let mut invocation = Invocation::new(command)
        .args(args)
        .non_interactive(cli.non_interactive)
        .env(env);
    if let Some(user) = &cli.user {
        invocation = invocation.as_user(user.clone());
    }
    if let Ok(cwd) = std::env::current_dir() {
        invocation = invocation.cwd(cwd);
    }
    invocation
}

/// The caller's environment. Variables that are not valid UTF-8 are
/// dropped.
fn caller_environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

fn authenticator(backend: AuthBackend) -> Result<Box<dyn Authenticator>> {
    match backend {
        AuthBackend::Shadow => Ok(Box::new(ShadowAuthenticator::new())),
        #[cfg(feature = "pam")]
        AuthBackend::Pam => Ok(Box::new(elevate::auth::PamAuthenticator::new())),
        #[cfg(not(feature = "pam"))]
        AuthBackend::Pam => anyhow::bail!("policy asks for PAM, but elevate was built without PAM support"),
    }
}

fn audit_sink(backend: AuditBackend) -> Box<dyn AuditSink> {
    match backend {
        AuditBackend::Syslog => Box::new(SyslogSink::new()),
        AuditBackend::Tracing => Box::new(TracingSink),
    }
}
