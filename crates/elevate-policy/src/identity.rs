//! Principal resolution.
//!
//! Rules name users and groups either by name or by numeric id. Resolution
//! tries the name first and falls back to parsing a decimal id, so a rule may
//! say `root` or `0` interchangeably.
//!
//! The OS-backed resolver lives in the `elevate` crate. This module defines
//! the trait and an in-memory [`StaticResolver`] used by tests and by anyone
//! evaluating a policy against a synthetic user database.

use std::collections::HashMap;

/// Numeric user or group id.
pub type Id = u32;

/// Largest valid id.
///
/// `u32::MAX` is excluded: `setresuid(-1, ...)` means "leave unchanged", so
/// accepting it as a target would silently keep the current credentials.
pub const MAX_ID: Id = u32::MAX - 1;

/// A caller or target principal.
///
/// Two identities are equal iff their numeric ids are equal; the name is
/// informational.
#[derive(Debug, Clone, Eq)]
pub struct Identity {
    /// Numeric user id.
    pub uid: Id,
    /// Resolved account name, when known.
    pub name: Option<String>,
}

impl Identity {
    /// Identity known only by id.
    pub fn from_uid(uid: Id) -> Self {
        Self { uid, name: None }
    }

    /// Identity with a resolved name.
    pub fn named(uid: Id, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: Some(name.into()),
        }
    }

    /// The superuser.
    pub fn root() -> Self {
        Self::named(0, "root")
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl std::hash::Hash for Identity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
    }
}

/// Group membership of a caller: supplementary groups plus the primary group.
///
/// Duplicates are harmless; only membership is ever queried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSet(Vec<Id>);

impl GroupSet {
    /// Empty membership.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a group id.
    pub fn insert(&mut self, gid: Id) {
        self.0.push(gid);
    }

    /// Whether `gid` is among the caller's groups.
    pub fn contains(&self, gid: Id) -> bool {
        self.0.contains(&gid)
    }

    /// Iterate over the group ids.
    pub fn iter(&self) -> impl Iterator<Item = Id> + '_ {
        self.0.iter().copied()
    }

    /// Number of entries, duplicates included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Id>> for GroupSet {
    fn from(ids: Vec<Id>) -> Self {
        Self(ids)
    }
}

impl FromIterator<Id> for GroupSet {
    fn from_iter<I: IntoIterator<Item = Id>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parse a decimal id within `0..=MAX_ID`.
///
/// Only ASCII digits are accepted: no sign, no whitespace, no radix prefix.
pub fn parse_id(spec: &str) -> Option<Id> {
    if spec.is_empty() || !spec.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    spec.parse::<u64>()
        .ok()
        .filter(|id| *id <= u64::from(MAX_ID))
        .map(|id| id as Id)
}

/// Lookup of principals against some identity database.
///
/// Implementors supply name lookups; the numeric fallback is shared.
/// A `None` is a normal outcome, never an error.
pub trait IdentityResolver {
    /// Look up a user by account name.
    fn user_by_name(&self, name: &str) -> Option<Identity>;

    /// Look up a group id by group name.
    fn group_by_name(&self, name: &str) -> Option<Id>;

    /// Resolve a user spec: a known name, else a numeric id.
    fn resolve_user(&self, spec: &str) -> Option<Identity> {
        self.user_by_name(spec)
            .or_else(|| parse_id(spec).map(Identity::from_uid))
    }

    /// Resolve a group spec: a known name, else a numeric id.
    fn resolve_group(&self, spec: &str) -> Option<Id> {
        self.group_by_name(spec).or_else(|| parse_id(spec))
    }
}

impl<R: IdentityResolver + ?Sized> IdentityResolver for &R {
    fn user_by_name(&self, name: &str) -> Option<Identity> {
        (**self).user_by_name(name)
    }

    fn group_by_name(&self, name: &str) -> Option<Id> {
        (**self).group_by_name(name)
    }
}

/// In-memory identity database.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    users: HashMap<String, Id>,
    groups: HashMap<String, Id>,
}

impl StaticResolver {
    /// Empty database; only numeric specs resolve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user.
    pub fn with_user(mut self, name: impl Into<String>, uid: Id) -> Self {
        self.users.insert(name.into(), uid);
        self
    }

    /// Add a group.
    pub fn with_group(mut self, name: impl Into<String>, gid: Id) -> Self {
        self.groups.insert(name.into(), gid);
        self
    }
}

impl IdentityResolver for StaticResolver {
    fn user_by_name(&self, name: &str) -> Option<Identity> {
        self.users
            .get(name)
            .map(|uid| Identity::named(*uid, name))
    }

    fn group_by_name(&self, name: &str) -> Option<Id> {
        self.groups.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StaticResolver {
        StaticResolver::new()
            .with_user("root", 0)
            .with_user("alice", 1000)
            .with_user("4242", 7)
            .with_group("wheel", 10)
    }

    #[test]
    fn test_resolve_user_by_name() {
        let id = resolver().resolve_user("alice").unwrap();
        assert_eq!(id.uid, 1000);
        assert_eq!(id.name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_resolve_user_numeric_fallback() {
        let id = resolver().resolve_user("1234").unwrap();
        assert_eq!(id.uid, 1234);
        assert!(id.name.is_none());
    }

    #[test]
    fn test_name_takes_precedence_over_number() {
        // An account literally named "4242" wins over the numeric reading.
        assert_eq!(resolver().resolve_user("4242").unwrap().uid, 7);
    }

    #[test]
    fn test_unknown_user() {
        assert!(resolver().resolve_user("mallory").is_none());
    }

    #[test]
    fn test_resolve_group() {
        let r = resolver();
        assert_eq!(r.resolve_group("wheel"), Some(10));
        assert_eq!(r.resolve_group("20"), Some(20));
        assert_eq!(r.resolve_group("staff"), None);
    }

    #[test]
    fn test_parse_id_bounds() {
        assert_eq!(parse_id("0"), Some(0));
        assert_eq!(parse_id("4294967294"), Some(MAX_ID));
        assert_eq!(parse_id("4294967295"), None);
        assert_eq!(parse_id("99999999999999999999"), None);
    }

    #[test]
    fn test_parse_id_rejects_non_digits() {
        for spec in ["", "-1", "+1", " 1", "1 ", "0x10", "1e3", "１"] {
            assert_eq!(parse_id(spec), None, "{spec:?}");
        }
    }

    #[test]
    fn test_identity_equality_ignores_name() {
        assert_eq!(Identity::named(0, "root"), Identity::from_uid(0));
        assert_ne!(Identity::named(0, "root"), Identity::named(1, "root"));
    }

    #[test]
    fn test_group_set_membership() {
        let groups = GroupSet::from(vec![10, 10, 100]);
        assert!(groups.contains(10));
        assert!(groups.contains(100));
        assert!(!groups.contains(0));
        assert_eq!(groups.len(), 3);
    }
}
