//! Account and group lookups against the host databases.

use std::path::PathBuf;

use elevate_policy::{GroupSet, Id, Identity, IdentityResolver};
use nix::unistd::{self, Gid, Group, Uid, User};
use tracing::debug;

use crate::error::{ElevateError, Result};

/// A resolved account: everything needed to become this user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// User id.
    pub uid: Id,
    /// Primary group id.
    pub gid: Id,
    /// Account name.
    pub name: String,
    /// Home directory.
    pub home: PathBuf,
    /// Login shell.
    pub shell: PathBuf,
}

impl Account {
    /// Identity of this account, carrying its name.
    pub fn identity(&self) -> Identity {
        Identity::named(self.uid, self.name.clone())
    }
}

impl From<User> for Account {
    fn from(user: User) -> Self {
        Self {
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            name: user.name,
            home: user.dir,
            shell: user.shell,
        }
    }
}

/// An identity database that can also return full account records.
pub trait AccountDatabase: IdentityResolver {
    /// Look up an account by user id.
    fn account_by_uid(&self, uid: Id) -> Option<Account>;
}

/// The invoking user: real uid and full group membership.
#[derive(Debug, Clone)]
pub struct Caller {
    /// The caller's account.
    pub account: Account,
    /// Primary and supplementary groups.
    pub groups: GroupSet,
}

impl Caller {
    /// Identify the real user of this process.
    ///
    /// Group membership is the kernel's view of the process credentials,
    /// not a fresh read of the group database.
    pub fn current(accounts: &dyn AccountDatabase) -> Result<Self> {
        let uid = unistd::getuid().as_raw();
        let account = accounts
            .account_by_uid(uid)
            .ok_or(ElevateError::UnknownCaller { uid })?;

        let mut groups: GroupSet = supplementary_groups()?.into_iter().collect();
        groups.insert(unistd::getgid().as_raw());

        debug!(uid, name = %account.name, groups = groups.len(), "caller identified");
        Ok(Self { account, groups })
    }
}

#[cfg(not(target_os = "macos"))]
fn supplementary_groups() -> Result<Vec<Id>> {
    let gids = unistd::getgroups().map_err(|source| ElevateError::System {
        context: "getgroups",
        source,
    })?;
    Ok(gids.into_iter().map(Gid::as_raw).collect())
}

#[cfg(target_os = "macos")]
fn supplementary_groups() -> Result<Vec<Id>> {
    Ok(Vec::new())
}

/// The host's passwd and group databases, through libc.
///
/// Lookup errors are treated as "not found": a rule naming an account that
/// cannot be read simply does not match.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAccounts;

impl IdentityResolver for SystemAccounts {
    fn user_by_name(&self, name: &str) -> Option<Identity> {
        match User::from_name(name) {
            Ok(Some(user)) => Some(Identity::named(user.uid.as_raw(), user.name)),
            Ok(None) => None,
            Err(e) => {
                debug!(name, error = %e, "user lookup failed");
                None
            }
        }
    }

    fn group_by_name(&self, name: &str) -> Option<Id> {
        match Group::from_name(name) {
            Ok(Some(group)) => Some(group.gid.as_raw()),
            Ok(None) => None,
            Err(e) => {
                debug!(name, error = %e, "group lookup failed");
                None
            }
        }
    }
}

impl AccountDatabase for SystemAccounts {
    fn account_by_uid(&self, uid: Id) -> Option<Account> {
        match User::from_uid(Uid::from_raw(uid)) {
            Ok(user) => user.map(Account::from),
            Err(e) => {
                debug!(uid, error = %e, "account lookup failed");
                None
            }
        }
    }
}

/// Accounts held in memory, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticAccounts {
    accounts: Vec<Account>,
    groups: Vec<(String, Id)>,
}

impl StaticAccounts {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account with a conventional home and shell.
    pub fn with_account(mut self, name: impl Into<String>, uid: Id, gid: Id) -> Self {
        let name = name.into();
        let home = if uid == 0 {
            PathBuf::from("/root")
        } else {
            PathBuf::from(format!("/home/{name}"))
        };
        self.accounts.push(Account {
            uid,
            gid,
            name,
            home,
            shell: PathBuf::from("/bin/sh"),
        });
        self
    }

    /// Add a named group.
    pub fn with_group(mut self, name: impl Into<String>, gid: Id) -> Self {
        self.groups.push((name.into(), gid));
        self
    }
}

impl IdentityResolver for StaticAccounts {
    fn user_by_name(&self, name: &str) -> Option<Identity> {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .map(Account::identity)
    }

    fn group_by_name(&self, name: &str) -> Option<Id> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, gid)| *gid)
    }
}

impl AccountDatabase for StaticAccounts {
    fn account_by_uid(&self, uid: Id) -> Option<Account> {
        self.accounts.iter().find(|a| a.uid == uid).cloned()
    }
}

/// This host's name, for prompts and log lines.
pub fn hostname() -> String {
    unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
