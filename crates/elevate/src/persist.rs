//! Standing authentication grants.
//!
//! After a successful authentication under a `persist` rule, the caller is
//! not asked again for a while. The grant is scoped to one login session:
//! the (uid, session, terminal, parent process) tuple that made it. A new
//! terminal or a new shell starts without one.
//!
//! [`TimestampStore`] keeps one small JSON record per scope in a directory
//! only the privileged user can write. A record is honoured only if
//!
//! - it is a regular file owned by the effective user with no group or
//!   other permission bits,
//! - the directory holding it passes the same checks, and
//! - `created_at <= now < expires_at` (a clock moved backwards voids it).
//!
//! Failing to create or refresh a grant is never fatal: the caller is
//! simply asked again next time.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use elevate_policy::Id;
use nix::unistd;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default directory for timestamp records.
pub const TIMESTAMP_DIR: &str = "/run/elevate";

/// Storage for standing grants.
pub trait GrantStore {
    /// Whether `uid` holds an unexpired grant in the current scope.
    fn is_valid(&self, uid: Id) -> bool;

    /// Create or extend the grant for `uid`.
    fn refresh(&self, uid: Id, ttl: Duration) -> io::Result<()>;

    /// Revoke the grant for `uid`.
    fn clear(&self, uid: Id) -> io::Result<()>;
}

/// A store that never holds a grant.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGrants;

impl GrantStore for NoGrants {
    fn is_valid(&self, _uid: Id) -> bool {
        false
    }

    fn refresh(&self, _uid: Id, _ttl: Duration) -> io::Result<()> {
        Ok(())
    }

    fn clear(&self, _uid: Id) -> io::Result<()> {
        Ok(())
    }
}

/// The login session a grant belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionScope {
    /// Session leader's process id.
    pub session: i32,
    /// Controlling terminal device number.
    pub tty: u64,
    /// Parent process id.
    pub parent: i32,
    /// Parent start time in clock ticks since boot. Guards against the
    /// parent pid being reused.
    pub parent_start: u64,
}

impl SessionScope {
    /// Scope of this process, or `None` without a controlling terminal.
    pub fn current() -> Option<Self> {
        let own = fs::read_to_string("/proc/self/stat").ok()?;
        let fields = stat_fields(&own)?;
        // Fields after the command name: state ppid pgrp session tty_nr ...
        let parent: i32 = fields.get(1)?.parse().ok()?;
        let session: i32 = fields.get(3)?.parse().ok()?;
        let tty: u64 = fields.get(4)?.parse().ok()?;
        if tty == 0 {
            return None;
        }

        let parent_stat = fs::read_to_string(format!("/proc/{parent}/stat")).ok()?;
        let parent_start: u64 = stat_fields(&parent_stat)?.get(19)?.parse().ok()?;

        Some(Self {
            session,
            tty,
            parent,
            parent_start,
        })
    }

    fn file_name(&self, uid: Id) -> String {
        format!(
            "{uid}-{}-{}-{}-{}",
            self.session, self.tty, self.parent, self.parent_start
        )
    }
}

/// Split a `/proc/<pid>/stat` line into the fields after the command name.
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so the split happens at the last `)`.
fn stat_fields(stat: &str) -> Option<Vec<&str>> {
    let (_, rest) = stat.rsplit_once(')')?;
    Some(rest.split_whitespace().collect())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GrantRecord {
    uid: Id,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl GrantRecord {
    fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.created_at <= now && now < self.expires_at
    }
}

/// Grants kept as files under a private directory.
#[derive(Debug, Clone)]
pub struct TimestampStore {
    dir: PathBuf,
    scope: Option<SessionScope>,
}

impl TimestampStore {
    /// Store under [`TIMESTAMP_DIR`] for the current session.
    pub fn system() -> Self {
        Self::new(TIMESTAMP_DIR, SessionScope::current())
    }

    /// Store under `dir` for an explicit scope.
    ///
    /// With no scope the store behaves like [`NoGrants`].
    pub fn new(dir: impl Into<PathBuf>, scope: Option<SessionScope>) -> Self {
        Self {
            dir: dir.into(),
            scope,
        }
    }

    fn record_path(&self, uid: Id) -> Option<PathBuf> {
        self.scope.map(|s| self.dir.join(s.file_name(uid)))
    }

    fn ensure_dir(&self) -> io::Result<()> {
        match DirBuilder::new().mode(0o700).recursive(true).create(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
        check_private(&self.dir, true)
    }

    fn read_record(&self, path: &Path) -> io::Result<GrantRecord> {
        check_private(&self.dir, true)?;
        let mut file = OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_NOFOLLOW)
            .open(path)?;
        check_private_file(&file)?;

        let mut text = String::new();
        file.read_to_string(&mut text)?;
        serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl GrantStore for TimestampStore {
    fn is_valid(&self, uid: Id) -> bool {
        let Some(path) = self.record_path(uid) else {
            return false;
        };
        match self.read_record(&path) {
            Ok(record) if record.uid == uid && record.is_current(Utc::now()) => true,
            Ok(_) => {
                debug!(path = %path.display(), "grant expired");
                false
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring grant record");
                false
            }
        }
    }

    fn refresh(&self, uid: Id, ttl: Duration) -> io::Result<()> {
        let Some(path) = self.record_path(uid) else {
            debug!("no controlling terminal, grant not stored");
            return Ok(());
        };
        self.ensure_dir()?;

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "grant lifetime out of range"))?;
        let record = GrantRecord {
            uid,
            created_at: now,
            expires_at,
        };
        let body = serde_json::to_vec(&record).map_err(io::Error::other)?;

        // Write beside the record, then rename over it.
        let tmp = path.with_extension(format!("tmp{}", std::process::id()));
        let result = (|| {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result?;

        debug!(uid, expires_at = %record.expires_at, "grant refreshed");
        Ok(())
    }

    fn clear(&self, uid: Id) -> io::Result<()> {
        let Some(path) = self.record_path(uid) else {
            return Ok(());
        };
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(uid, "grant cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn check_private(path: &Path, want_dir: bool) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if want_dir != meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unexpected file type",
        ));
    }
    check_owner_and_mode(meta.uid(), meta.mode())
}

fn check_private_file(file: &File) -> io::Result<()> {
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a regular file",
        ));
    }
    check_owner_and_mode(meta.uid(), meta.mode())
}

fn check_owner_and_mode(uid: u32, mode: u32) -> io::Result<()> {
    if uid != unistd::geteuid().as_raw() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "wrong owner",
        ));
    }
    if mode & 0o077 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "group or other access",
        ));
    }
    Ok(())
}
