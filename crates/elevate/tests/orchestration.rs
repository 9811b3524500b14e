//! Full invocations against a policy file on disk, a real timestamp
//! directory and in-memory everything else.

use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use elevate::audit::{AuditEvent, MemorySink};
use elevate::auth::{AuthOutcome, CallbackAuthenticator};
use elevate::persist::{GrantStore, SessionScope, TimestampStore};
use elevate::system::{AccountDatabase, StaticAccounts};
use elevate::{Caller, ElevateError, Invocation, Orchestrator};
use elevate_policy::{GroupSet, Ownership, Policy, SAFE_PATH};

const POLICY: &str = r#"
[defaults]
persist_timeout_secs = 600

[[rule]]
action = "permit"
identity = ":wheel"
options = ["persist", "setenv"]
setenv = ["EDITOR", "-TERM", "LANG=C"]

[[rule]]
action = "deny"
identity = ":wheel"
command = "/sbin/reboot"

[[rule]]
action = "permit"
identity = "backup"
target = "operator"
command = "/usr/bin/dump"
args = ["-0", "/home"]
options = ["nopass", "keepenv"]
"#;

fn accounts() -> StaticAccounts {
    StaticAccounts::new()
        .with_account("root", 0, 0)
        .with_account("alice", 1000, 1000)
        .with_account("backup", 1002, 1002)
        .with_account("operator", 2, 5)
        .with_group("wheel", 10)
}

fn caller(db: &StaticAccounts, uid: u32, groups: &[u32]) -> Caller {
    Caller {
        account: db.account_by_uid(uid).unwrap(),
        groups: GroupSet::from(groups.to_vec()),
    }
}

fn load_policy(dir: &tempfile::TempDir) -> Policy {
    let path = dir.path().join("elevate.toml");
    fs::write(&path, POLICY).unwrap();
    Policy::load(&path, Ownership::Unchecked).unwrap()
}

fn scope() -> Option<SessionScope> {
    Some(SessionScope {
        session: 7,
        tty: 34816,
        parent: 8,
        parent_start: 99,
    })
}

fn counter() -> (CallbackAuthenticator, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let auth = CallbackAuthenticator::new(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        AuthOutcome::Success
    });
    (auth, count)
}

#[test]
fn test_persisted_grant_survives_across_orchestrators() {
    let dir = tempfile::tempdir().unwrap();
    let policy = load_policy(&dir);
    let db = accounts();
    let alice = caller(&db, 1000, &[1000, 10]);
    let grants_dir = dir.path().join("grants");

    let (auth, prompts) = counter();
    Orchestrator::new(&policy, &db, auth)
        .with_grants(TimestampStore::new(&grants_dir, scope()))
        .prepare(&alice, &Invocation::new("id"))
        .unwrap();
    assert_eq!(prompts.load(Ordering::SeqCst), 1);

    // A second process in the same session is not asked again.
    let (auth, prompts) = counter();
    Orchestrator::new(&policy, &db, auth)
        .with_grants(TimestampStore::new(&grants_dir, scope()))
        .prepare(&alice, &Invocation::new("id").non_interactive(true))
        .unwrap();
    assert_eq!(prompts.load(Ordering::SeqCst), 0);

    // After clearing, it is.
    TimestampStore::new(&grants_dir, scope()).clear(1000).unwrap();
    let (auth, _) = counter();
    let err = Orchestrator::new(&policy, &db, auth)
        .with_grants(TimestampStore::new(&grants_dir, scope()))
        .prepare(&alice, &Invocation::new("id").non_interactive(true))
        .unwrap_err();
    assert!(matches!(err, ElevateError::AuthRequired));
}

#[test]
fn test_setenv_entries_apply() {
    let dir = tempfile::tempdir().unwrap();
    let policy = load_policy(&dir);
    let db = accounts();

    let mut env = BTreeMap::new();
    env.insert("EDITOR".to_string(), "vi".to_string());
    env.insert("TERM".to_string(), "xterm".to_string());
    env.insert("LANG".to_string(), "de_DE.UTF-8".to_string());

    let (auth, _) = counter();
    let prepared = Orchestrator::new(&policy, &db, auth)
        .prepare(&caller(&db, 1000, &[10]), &Invocation::new("vipw").env(env))
        .unwrap();

    assert_eq!(prepared.env.get("EDITOR"), Some("vi"));
    assert_eq!(prepared.env.get("LANG"), Some("C"));
    assert!(!prepared.env.contains("TERM"));
}

#[test]
fn test_exception_rule_denies_and_audits() {
    let dir = tempfile::tempdir().unwrap();
    let policy = load_policy(&dir);
    let db = accounts();
    let sink = MemorySink::new();

    let (auth, prompts) = counter();
    let err = Orchestrator::new(&policy, &db, auth)
        .with_audit(sink.clone())
        .prepare(&caller(&db, 1000, &[10]), &Invocation::new("/sbin/reboot"))
        .unwrap_err();

    assert!(err.is_denial());
    assert_eq!(prompts.load(Ordering::SeqCst), 0);
    assert!(matches!(
        sink.events().as_slice(),
        [AuditEvent::CommandRejected { caller, .. }] if caller == "alice"
    ));
}

#[test]
fn test_pinned_command_with_keepenv() {
    let dir = tempfile::tempdir().unwrap();
    let policy = load_policy(&dir);
    let db = accounts();

    let mut env = BTreeMap::new();
    env.insert("PATH".to_string(), "/home/backup/bin".to_string());
    env.insert("DUMPDATES".to_string(), "/var/lib/dumpdates".to_string());
    env.insert("LD_LIBRARY_PATH".to_string(), "/tmp".to_string());

    let (auth, prompts) = counter();
    let orch = Orchestrator::new(&policy, &db, auth);
    let backup = caller(&db, 1002, &[1002]);

    let exact = Invocation::new("/usr/bin/dump")
        .args(["-0", "/home"])
        .as_user("operator")
        .env(env);
    let prepared = orch.prepare(&backup, &exact).unwrap();
    assert_eq!(prompts.load(Ordering::SeqCst), 0);
    assert_eq!(prepared.target.uid, 2);
    assert_eq!(prepared.env.get("PATH"), Some(SAFE_PATH));
    assert_eq!(prepared.env.get("DUMPDATES"), Some("/var/lib/dumpdates"));
    assert!(!prepared.env.contains("LD_LIBRARY_PATH"));

    let extra = Invocation::new("/usr/bin/dump")
        .args(["-0", "/home", "-f", "/dev/null"])
        .as_user("operator");
    assert!(orch.prepare(&backup, &extra).unwrap_err().is_denial());
}
