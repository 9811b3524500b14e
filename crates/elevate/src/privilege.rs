//! Switching the process credentials to the target account.
//!
//! The drop happens in a fixed order:
//!
//! | Step | Call |
//! |------|------|
//! | [`DropStep::SetGid`] | `setresgid` |
//! | [`DropStep::InitGroups`] | `initgroups` |
//! | [`DropStep::SetUid`] | `setresuid` |
//! | [`DropStep::Verify`] | `getresuid` / `getresgid` |
//!
//! Group changes need privilege, so they come before the uid change.
//! Any failing step aborts the drop. The caller must then exit without
//! running anything: a half-dropped process would execute with a mix of
//! the caller's and the target's credentials.

use std::ffi::CString;
use std::fmt;

use elevate_policy::Id;
use nix::errno::Errno;
use nix::unistd::{self, Gid, Uid};
use tracing::debug;

use crate::error::{ElevateError, Result};
use crate::system::Account;

/// One step of the credential drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropStep {
    /// Set real, effective and saved group ids.
    SetGid,
    /// Load the target's supplementary groups.
    InitGroups,
    /// Set real, effective and saved user ids.
    SetUid,
    /// Re-read the credentials and compare.
    Verify,
}

impl DropStep {
    /// Every step, in the order it runs.
    pub const ORDER: [DropStep; 4] = [Self::SetGid, Self::InitGroups, Self::SetUid, Self::Verify];
}

impl fmt::Display for DropStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SetGid => "setresgid",
            Self::InitGroups => "initgroups",
            Self::SetUid => "setresuid",
            Self::Verify => "credential check",
        };
        f.write_str(name)
    }
}

/// The credential-changing calls, separated so the ordering can be tested
/// without privilege.
pub trait Credentials {
    /// Set all three group ids.
    fn set_gid(&mut self, gid: Id) -> nix::Result<()>;

    /// Replace the supplementary groups with `user`'s.
    fn init_groups(&mut self, user: &CString, gid: Id) -> nix::Result<()>;

    /// Set all three user ids.
    fn set_uid(&mut self, uid: Id) -> nix::Result<()>;

    /// Confirm all user and group ids now equal the target's.
    fn verify(&self, uid: Id, gid: Id) -> nix::Result<()>;
}

/// The running process's credentials.
#[derive(Debug, Default)]
pub struct ProcessCredentials;

impl Credentials for ProcessCredentials {
    fn set_gid(&mut self, gid: Id) -> nix::Result<()> {
        let gid = Gid::from_raw(gid);
        unistd::setresgid(gid, gid, gid)
    }

    fn init_groups(&mut self, user: &CString, gid: Id) -> nix::Result<()> {
        unistd::initgroups(user, Gid::from_raw(gid))
    }

    fn set_uid(&mut self, uid: Id) -> nix::Result<()> {
        let uid = Uid::from_raw(uid);
        unistd::setresuid(uid, uid, uid)
    }

    fn verify(&self, uid: Id, gid: Id) -> nix::Result<()> {
        let u = unistd::getresuid()?;
        let g = unistd::getresgid()?;
        let uids = [u.real, u.effective, u.saved];
        let gids = [g.real, g.effective, g.saved];
        if uids.iter().all(|id| id.as_raw() == uid) && gids.iter().all(|id| id.as_raw() == gid) {
            Ok(())
        } else {
            Err(Errno::EPERM)
        }
    }
}

/// Become `target`, or fail naming the step that broke.
pub fn drop_privileges<C: Credentials + ?Sized>(creds: &mut C, target: &Account) -> Result<()> {
    creds.set_gid(target.gid).map_err(step_failed(DropStep::SetGid))?;

    let name = CString::new(target.name.as_str()).map_err(|_| ElevateError::PrivilegeDrop {
        step: DropStep::InitGroups,
        source: Errno::EINVAL,
    })?;
    creds
        .init_groups(&name, target.gid)
        .map_err(step_failed(DropStep::InitGroups))?;

    creds.set_uid(target.uid).map_err(step_failed(DropStep::SetUid))?;
    creds
        .verify(target.uid, target.gid)
        .map_err(step_failed(DropStep::Verify))?;

    debug!(uid = target.uid, gid = target.gid, "credentials switched");
    Ok(())
}

fn step_failed(step: DropStep) -> impl FnOnce(nix::Error) -> ElevateError {
    move |source| ElevateError::PrivilegeDrop { step, source }
}

/// Give up any elevated privilege and run as the real user from here on.
///
/// Used before reading files on the caller's behalf.
pub fn relinquish() -> Result<()> {
    let uid = unistd::getuid();
    let gid = unistd::getgid();
    unistd::setresgid(gid, gid, gid).map_err(step_failed(DropStep::SetGid))?;
    unistd::setresuid(uid, uid, uid).map_err(step_failed(DropStep::SetUid))?;
    Ok(())
}
