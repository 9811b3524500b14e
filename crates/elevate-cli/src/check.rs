//! `elevate -C`: check a policy file as the calling user.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use elevate::auth::{AuthOutcome, CallbackAuthenticator};
use elevate::privilege;
use elevate::system::SystemAccounts;
use elevate::{Caller, CheckOutcome, Orchestrator};
use elevate_policy::{Ownership, Policy};
use tracing::debug;

use crate::{run, Cli};

/// Parse `path` and, if a command was given, print the decision.
///
/// Privileges are given up first: the file is read with the caller's own
/// access rights, so this cannot be used to read files the caller could
/// not read otherwise.
pub(crate) fn execute(path: &Path, cli: &Cli) -> Result<ExitCode> {
    privilege::relinquish()?;

    let policy = Policy::load(path, Ownership::Unchecked)?;
    debug!(rules = policy.rules.len(), "policy parsed");

    if cli.command.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    let accounts = SystemAccounts;
    let caller = Caller::current(&accounts)?;
    let invocation = run::invocation(cli, &caller);

    // Nobody is prompted during a check.
    let orchestrator = Orchestrator::new(
        &policy,
        &accounts,
        CallbackAuthenticator::always(AuthOutcome::Failure),
    );
    let outcome = orchestrator.check(&caller, &invocation)?;
    println!("{outcome}");

    Ok(match outcome {
        CheckOutcome::Deny => ExitCode::FAILURE,
        CheckOutcome::Permit | CheckOutcome::PermitNopass => ExitCode::SUCCESS,
    })
}
