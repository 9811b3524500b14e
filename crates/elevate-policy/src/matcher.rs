//! Rule matching and last-match-wins resolution.
//!
//! [`rule_matches`] is the single-rule predicate; [`authorize`] folds it over
//! a rule list. Both are pure: the only external input is the
//! [`IdentityResolver`], which is a read-only lookup.

use tracing::trace;

use crate::identity::{GroupSet, Id, IdentityResolver};
use crate::rule::{IdentitySpec, Rule, RuleAction};

/// A request to run a command.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// Real uid of the caller.
    pub caller: Id,
    /// Caller's groups.
    pub groups: &'a GroupSet,
    /// Uid the command should run as.
    pub target: Id,
    /// Command as typed by the caller.
    pub command: &'a str,
    /// Arguments after the command.
    pub args: &'a [String],
}

impl<'a> Request<'a> {
    /// Bundle a request.
    pub fn new(
        caller: Id,
        groups: &'a GroupSet,
        target: Id,
        command: &'a str,
        args: &'a [String],
    ) -> Self {
        Self {
            caller,
            groups,
            target,
            command,
            args,
        }
    }
}

/// Outcome of policy resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The last matching rule permits the request.
    Permit,
    /// No rule matched, or the last matching rule denies the request.
    Deny,
}

impl From<RuleAction> for Outcome {
    fn from(action: RuleAction) -> Self {
        match action {
            RuleAction::Permit => Self::Permit,
            RuleAction::Deny => Self::Deny,
        }
    }
}

/// Result of [`authorize`]: the outcome and the rule that decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision<'a> {
    /// Permit or deny.
    pub outcome: Outcome,
    /// The last matching rule, `None` when nothing matched.
    pub rule: Option<&'a Rule>,
}

impl<'a> Decision<'a> {
    /// Whether the request is permitted.
    pub fn is_permit(&self) -> bool {
        self.outcome == Outcome::Permit
    }

    /// The matched rule, but only for a permit.
    pub fn permitted_rule(&self) -> Option<&'a Rule> {
        match self.outcome {
            Outcome::Permit => self.rule,
            Outcome::Deny => None,
        }
    }
}

/// Whether `rule` applies to `request`.
///
/// Clauses are checked in order: identity, target, command, arguments. Any
/// user or group name that fails to resolve makes the rule not match.
pub fn rule_matches<R>(resolver: &R, request: &Request<'_>, rule: &Rule) -> bool
where
    R: IdentityResolver + ?Sized,
{
    let identity_ok = match &rule.identity {
        IdentitySpec::Any => true,
        IdentitySpec::Group(spec) => resolver
            .resolve_group(spec)
            .is_some_and(|gid| request.groups.contains(gid)),
        IdentitySpec::User(spec) => resolver
            .resolve_user(spec)
            .is_some_and(|user| user.uid == request.caller),
    };
    if !identity_ok {
        return false;
    }

    if let Some(target) = &rule.target {
        match resolver.resolve_user(target) {
            Some(user) if user.uid == request.target => {}
            _ => return false,
        }
    }

    if let Some(command) = &rule.command {
        if command != request.command {
            return false;
        }
    }

    if let Some(args) = &rule.args {
        if args.len() != request.args.len() {
            return false;
        }
        if args.iter().zip(request.args).any(|(want, got)| want != got) {
            return false;
        }
    }

    true
}

/// Evaluate every rule in order; the last match decides.
///
/// An empty list, or a list where nothing matches, denies.
pub fn authorize<'r, R>(resolver: &R, rules: &'r [Rule], request: &Request<'_>) -> Decision<'r>
where
    R: IdentityResolver + ?Sized,
{
    let mut last = None;
    for (index, rule) in rules.iter().enumerate() {
        if rule_matches(resolver, request, rule) {
            trace!(index, action = %rule.action, "rule matched");
            last = Some(rule);
        }
    }

    match last {
        Some(rule) => Decision {
            outcome: rule.action.into(),
            rule: Some(rule),
        },
        None => Decision {
            outcome: Outcome::Deny,
            rule: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticResolver;

    fn resolver() -> StaticResolver {
        StaticResolver::new()
            .with_user("root", 0)
            .with_user("alice", 1000)
            .with_user("bob", 1001)
            .with_group("wheel", 10)
            .with_group("users", 100)
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_user_clause() {
        let groups = GroupSet::from(vec![100]);
        let req = Request::new(1000, &groups, 0, "ls", &[]);
        let r = resolver();

        assert!(rule_matches(&r, &req, &Rule::permit(IdentitySpec::user("alice"))));
        assert!(rule_matches(&r, &req, &Rule::permit(IdentitySpec::user("1000"))));
        assert!(!rule_matches(&r, &req, &Rule::permit(IdentitySpec::user("bob"))));
        assert!(!rule_matches(&r, &req, &Rule::permit(IdentitySpec::user("nobody"))));
    }

    #[test]
    fn test_group_clause_ignores_uid() {
        let groups = GroupSet::from(vec![1000, 10]);
        let r = resolver();
        let rule = Rule::permit(IdentitySpec::group("wheel"));

        for caller in [0, 1000, 1001, 65534] {
            let req = Request::new(caller, &groups, 0, "ls", &[]);
            assert!(rule_matches(&r, &req, &rule));
        }
    }

    #[test]
    fn test_unresolvable_group_does_not_match() {
        let groups = GroupSet::from(vec![10]);
        let req = Request::new(1000, &groups, 0, "ls", &[]);
        let rule = Rule::permit(IdentitySpec::group("no-such-group"));
        assert!(!rule_matches(&resolver(), &req, &rule));
    }

    #[test]
    fn test_numeric_group() {
        let groups = GroupSet::from(vec![4242]);
        let req = Request::new(1000, &groups, 0, "ls", &[]);
        assert!(rule_matches(
            &resolver(),
            &req,
            &Rule::permit(IdentitySpec::group("4242"))
        ));
    }

    #[test]
    fn test_target_clause() {
        let groups = GroupSet::new();
        let r = resolver();
        let rule = Rule::permit(IdentitySpec::Any).as_target("root");

        assert!(rule_matches(&r, &Request::new(1000, &groups, 0, "ls", &[]), &rule));
        assert!(!rule_matches(&r, &Request::new(1000, &groups, 1001, "ls", &[]), &rule));

        let unresolvable = Rule::permit(IdentitySpec::Any).as_target("ghost");
        assert!(!rule_matches(&r, &Request::new(1000, &groups, 0, "ls", &[]), &unresolvable));

        let any_target = Rule::permit(IdentitySpec::Any);
        assert!(rule_matches(&r, &Request::new(1000, &groups, 1001, "ls", &[]), &any_target));
    }

    #[test]
    fn test_command_clause_is_exact() {
        let groups = GroupSet::new();
        let r = resolver();
        let rule = Rule::permit(IdentitySpec::Any).command("ls");

        assert!(rule_matches(&r, &Request::new(1000, &groups, 0, "ls", &[]), &rule));
        assert!(!rule_matches(&r, &Request::new(1000, &groups, 0, "/bin/ls", &[]), &rule));
        assert!(!rule_matches(&r, &Request::new(1000, &groups, 0, "ls ", &[]), &rule));
        assert!(!rule_matches(&r, &Request::new(1000, &groups, 0, "l*", &[]), &rule));
    }

    #[test]
    fn test_command_without_args_accepts_any_args() {
        let groups = GroupSet::new();
        let args = strings(&["-la", "/root"]);
        let rule = Rule::permit(IdentitySpec::Any).command("ls");
        assert!(rule_matches(
            &resolver(),
            &Request::new(1000, &groups, 0, "ls", &args),
            &rule
        ));
    }

    #[test]
    fn test_args_exact_length() {
        let groups = GroupSet::new();
        let r = resolver();
        let rule = Rule::permit(IdentitySpec::Any)
            .command("apt")
            .args(["install", "pkg"]);

        let exact = strings(&["install", "pkg"]);
        let extra = strings(&["install", "pkg", "--force"]);
        let short = strings(&["install"]);
        let wrong = strings(&["install", "other"]);

        assert!(rule_matches(&r, &Request::new(1000, &groups, 0, "apt", &exact), &rule));
        assert!(!rule_matches(&r, &Request::new(1000, &groups, 0, "apt", &extra), &rule));
        assert!(!rule_matches(&r, &Request::new(1000, &groups, 0, "apt", &short), &rule));
        assert!(!rule_matches(&r, &Request::new(1000, &groups, 0, "apt", &wrong), &rule));
    }

    #[test]
    fn test_empty_args_clause_requires_no_args() {
        let groups = GroupSet::new();
        let r = resolver();
        let rule = Rule::permit(IdentitySpec::Any)
            .command("reboot")
            .args(Vec::<String>::new());

        assert!(rule_matches(&r, &Request::new(1000, &groups, 0, "reboot", &[]), &rule));
        let one = strings(&["-f"]);
        assert!(!rule_matches(&r, &Request::new(1000, &groups, 0, "reboot", &one), &rule));
    }

    #[test]
    fn test_authorize_empty_denies() {
        let groups = GroupSet::new();
        let decision = authorize(&resolver(), &[], &Request::new(1000, &groups, 0, "ls", &[]));
        assert_eq!(decision.outcome, Outcome::Deny);
        assert!(decision.rule.is_none());
    }

    #[test]
    fn test_authorize_last_match_wins() {
        let groups = GroupSet::new();
        let rules = vec![
            Rule::permit(IdentitySpec::Any).as_target("root"),
            Rule::deny(IdentitySpec::Any).as_target("root").command("reboot"),
        ];
        let r = resolver();

        let reboot = authorize(&r, &rules, &Request::new(1000, &groups, 0, "reboot", &[]));
        assert_eq!(reboot.outcome, Outcome::Deny);
        assert_eq!(reboot.rule, Some(&rules[1]));
        assert!(reboot.permitted_rule().is_none());

        let ls = authorize(&r, &rules, &Request::new(1000, &groups, 0, "ls", &[]));
        assert_eq!(ls.outcome, Outcome::Permit);
        assert_eq!(ls.rule, Some(&rules[0]));
        assert_eq!(ls.permitted_rule(), Some(&rules[0]));
    }

    #[test]
    fn test_later_permit_overrides_earlier_deny() {
        let groups = GroupSet::from(vec![10]);
        let rules = vec![
            Rule::deny(IdentitySpec::Any),
            Rule::permit(IdentitySpec::group("wheel")),
        ];
        let decision = authorize(&resolver(), &rules, &Request::new(1000, &groups, 0, "sh", &[]));
        assert!(decision.is_permit());
    }

    #[test]
    fn test_non_matching_later_rule_does_not_override() {
        let groups = GroupSet::new();
        let rules = vec![
            Rule::permit(IdentitySpec::user("alice")),
            Rule::deny(IdentitySpec::user("bob")),
        ];
        let decision = authorize(&resolver(), &rules, &Request::new(1000, &groups, 0, "sh", &[]));
        assert_eq!(decision.rule, Some(&rules[0]));
        assert!(decision.is_permit());
    }
}
