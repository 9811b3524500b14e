//! Environment sanitization.
//!
//! The executed command never inherits the caller's environment implicitly.
//! [`build_environment`] produces a fresh mapping from three inputs: the
//! caller's environment (read only), the matched rule, and the caller/target
//! account details.
//!
//! # Policy
//!
//! | Rule options | Base |
//! |--------------|------|
//! | none | [`ALLOWED_VARS`] copied from the caller, identity variables, `PATH` = [`SAFE_PATH`] |
//! | `keepenv` | caller's environment minus the deny-list, identity variables overwritten |
//! | `setenv` | applied on top of either base, in order |
//!
//! Whatever the options, a rule that pins a command gets `PATH` reset to
//! [`SAFE_PATH`] as the very last step.

use std::collections::BTreeMap;

use crate::rule::{EnvEntry, Rule, RuleOptions};

/// Search path forced on pinned commands and on the default environment.
pub const SAFE_PATH: &str = "/bin:/sbin:/usr/bin:/usr/sbin:/usr/local/bin:/usr/local/sbin";

/// Variables copied from the caller into the default environment.
pub const ALLOWED_VARS: &[&str] = &[
    "TERM",
    "DISPLAY",
    "LANG",
    "LANGUAGE",
    "LC_ALL",
    "LC_CTYPE",
    "LC_COLLATE",
    "LC_MESSAGES",
    "LC_MONETARY",
    "LC_NUMERIC",
    "LC_TIME",
];

/// Variables always derived from the accounts rather than the caller.
pub const IDENTITY_VARS: &[&str] = &["ELEVATE_USER", "HOME", "LOGNAME", "USER", "SHELL"];

/// Variables never passed through from the caller, even under `keepenv`.
pub const DENIED_VARS: &[&str] = &[
    "IFS",
    "ENV",
    "BASH_ENV",
    "SHELLOPTS",
    "BASHOPTS",
    "PS4",
    "CDPATH",
    "GLOBIGNORE",
    "PERL5LIB",
    "PERL5OPT",
    "PERLLIB",
    "PERL5DB",
    "PYTHONPATH",
    "PYTHONHOME",
    "PYTHONSTARTUP",
    "PYTHONINSPECT",
    "RUBYLIB",
    "RUBYOPT",
    "NODE_OPTIONS",
    "NODE_PATH",
    "JAVA_TOOL_OPTIONS",
    "TCLLIBPATH",
    "GCONV_PATH",
    "NLSPATH",
    "HOSTALIASES",
    "RES_OPTIONS",
    "LOCALDOMAIN",
    "MALLOC_CHECK_",
];

/// Prefixes of variable families never passed through from the caller.
pub const DENIED_PREFIXES: &[&str] = &["LD_", "DYLD_", "BASH_FUNC_", "_RLD"];

/// Whether a variable name is on the deny-list.
pub fn is_denied(name: &str) -> bool {
    DENIED_VARS.contains(&name) || DENIED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Values that old shells import as function definitions.
fn is_function_export(value: &str) -> bool {
    value.starts_with("()")
}

/// Account details the identity variables are derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvContext {
    /// Caller's account name, exported as `ELEVATE_USER`.
    pub caller_name: String,
    /// Target's account name, exported as `USER` and `LOGNAME`.
    pub target_name: String,
    /// Target's home directory.
    pub target_home: String,
    /// Target's login shell.
    pub target_shell: String,
}

/// The environment handed to the executed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment(BTreeMap<String, String>);

impl Environment {
    /// Value of a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Whether a variable is set.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no variable is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

impl IntoIterator for Environment {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Build the environment for a command permitted by `rule`.
pub fn build_environment(
    current: &BTreeMap<String, String>,
    rule: &Rule,
    ctx: &EnvContext,
) -> Environment {
    let keepenv = rule.options.contains(RuleOptions::KEEPENV);

    let mut env = Environment::default();
    if keepenv {
        for (name, value) in current {
            if !is_denied(name) && !is_function_export(value) {
                env.set(name.as_str(), value.as_str());
            }
        }
    } else {
        for name in ALLOWED_VARS {
            if let Some(value) = current.get(*name) {
                env.set(*name, value.as_str());
            }
        }
        env.set("PATH", SAFE_PATH);
    }

    env.set("ELEVATE_USER", ctx.caller_name.as_str());
    env.set("HOME", ctx.target_home.as_str());
    env.set("LOGNAME", ctx.target_name.as_str());
    env.set("USER", ctx.target_name.as_str());
    env.set("SHELL", ctx.target_shell.as_str());

    if rule.options.contains(RuleOptions::SETENV) {
        for entry in &rule.setenv {
            apply_entry(&mut env, current, entry);
        }
    }

    if rule.pins_command() || !env.contains("PATH") {
        env.set("PATH", SAFE_PATH);
    }

    env
}

fn apply_entry(env: &mut Environment, current: &BTreeMap<String, String>, entry: &EnvEntry) {
    match entry {
        EnvEntry::Set { name, value } => env.set(name.as_str(), value.as_str()),
        EnvEntry::Passthrough(name) => {
            if is_denied(name) {
                tracing::warn!(%name, "refusing to pass through deny-listed variable");
                return;
            }
            if let Some(value) = current.get(name) {
                if !is_function_export(value) {
                    env.set(name.as_str(), value.as_str());
                }
            }
        }
        EnvEntry::Unset(name) => {
            env.0.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::IdentitySpec;

    fn ctx() -> EnvContext {
        EnvContext {
            caller_name: "alice".into(),
            target_name: "root".into(),
            target_home: "/root".into(),
            target_shell: "/bin/sh".into(),
        }
    }

    fn caller_env() -> BTreeMap<String, String> {
        [
            ("TERM", "xterm-256color"),
            ("LANG", "en_US.UTF-8"),
            ("PATH", "/home/alice/bin:/usr/bin"),
            ("HOME", "/home/alice"),
            ("USER", "alice"),
            ("EDITOR", "vim"),
            ("LD_PRELOAD", "/tmp/evil.so"),
            ("LD_LIBRARY_PATH", "/tmp"),
            ("BASH_ENV", "/tmp/rc"),
            ("HTTP_PROXY", "http://proxy:3128"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_default_environment() {
        let env = build_environment(&caller_env(), &Rule::permit(IdentitySpec::Any), &ctx());

        assert_eq!(env.get("TERM"), Some("xterm-256color"));
        assert_eq!(env.get("LANG"), Some("en_US.UTF-8"));
        assert_eq!(env.get("PATH"), Some(SAFE_PATH));
        assert_eq!(env.get("HOME"), Some("/root"));
        assert_eq!(env.get("USER"), Some("root"));
        assert_eq!(env.get("LOGNAME"), Some("root"));
        assert_eq!(env.get("SHELL"), Some("/bin/sh"));
        assert_eq!(env.get("ELEVATE_USER"), Some("alice"));
        assert!(!env.contains("EDITOR"));
        assert!(!env.contains("LD_PRELOAD"));
        assert!(!env.contains("HTTP_PROXY"));
    }

    #[test]
    fn test_default_environment_from_empty_caller() {
        let env = build_environment(&BTreeMap::new(), &Rule::permit(IdentitySpec::Any), &ctx());
        let names: Vec<_> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["ELEVATE_USER", "HOME", "LOGNAME", "PATH", "SHELL", "USER"]);
    }

    #[test]
    fn test_keepenv_strips_denied() {
        let rule = Rule::permit(IdentitySpec::Any).options(RuleOptions::KEEPENV);
        let env = build_environment(&caller_env(), &rule, &ctx());

        assert_eq!(env.get("EDITOR"), Some("vim"));
        assert_eq!(env.get("HTTP_PROXY"), Some("http://proxy:3128"));
        assert_eq!(env.get("PATH"), Some("/home/alice/bin:/usr/bin"));
        assert_eq!(env.get("HOME"), Some("/root"));
        assert!(!env.contains("LD_PRELOAD"));
        assert!(!env.contains("LD_LIBRARY_PATH"));
        assert!(!env.contains("BASH_ENV"));
    }

    #[test]
    fn test_keepenv_drops_function_exports() {
        let mut current = caller_env();
        current.insert("greet".into(), "() { echo pwned; }".into());
        let rule = Rule::permit(IdentitySpec::Any).options(RuleOptions::KEEPENV);
        assert!(!build_environment(&current, &rule, &ctx()).contains("greet"));
    }

    #[test]
    fn test_keepenv_without_caller_path_gets_safe_path() {
        let mut current = caller_env();
        current.remove("PATH");
        let rule = Rule::permit(IdentitySpec::Any).options(RuleOptions::KEEPENV);
        assert_eq!(build_environment(&current, &rule, &ctx()).get("PATH"), Some(SAFE_PATH));
    }

    #[test]
    fn test_pinned_command_forces_safe_path_under_keepenv() {
        let rule = Rule::permit(IdentitySpec::Any)
            .command("make")
            .options(RuleOptions::KEEPENV);
        let env = build_environment(&caller_env(), &rule, &ctx());
        assert_eq!(env.get("PATH"), Some(SAFE_PATH));
        assert_eq!(env.get("EDITOR"), Some("vim"));
    }

    #[test]
    fn test_setenv_entries_in_order() {
        let rule = Rule::permit(IdentitySpec::Any).setenv([
            EnvEntry::Set {
                name: "FOO".into(),
                value: "one".into(),
            },
            EnvEntry::Set {
                name: "FOO".into(),
                value: "two".into(),
            },
            EnvEntry::Passthrough("EDITOR".into()),
            EnvEntry::Passthrough("MISSING".into()),
            EnvEntry::Unset("TERM".into()),
        ]);
        let env = build_environment(&caller_env(), &rule, &ctx());

        assert_eq!(env.get("FOO"), Some("two"));
        assert_eq!(env.get("EDITOR"), Some("vim"));
        assert!(!env.contains("MISSING"));
        assert!(!env.contains("TERM"));
    }

    #[test]
    fn test_setenv_passthrough_refuses_denied() {
        let rule = Rule::permit(IdentitySpec::Any).setenv([EnvEntry::Passthrough("LD_PRELOAD".into())]);
        assert!(!build_environment(&caller_env(), &rule, &ctx()).contains("LD_PRELOAD"));
    }

    #[test]
    fn test_setenv_ignored_without_flag() {
        let mut rule = Rule::permit(IdentitySpec::Any);
        rule.setenv = vec![EnvEntry::Passthrough("EDITOR".into())];
        assert!(!build_environment(&caller_env(), &rule, &ctx()).contains("EDITOR"));
    }

    #[test]
    fn test_setenv_cannot_override_path_of_pinned_command() {
        let rule = Rule::permit(IdentitySpec::Any)
            .command("backup")
            .setenv([EnvEntry::Set {
                name: "PATH".into(),
                value: "/tmp".into(),
            }]);
        assert_eq!(build_environment(&caller_env(), &rule, &ctx()).get("PATH"), Some(SAFE_PATH));
    }

    #[test]
    fn test_setenv_may_set_path_for_unpinned_rule() {
        let rule = Rule::permit(IdentitySpec::Any).setenv([EnvEntry::Set {
            name: "PATH".into(),
            value: "/opt/bin".into(),
        }]);
        assert_eq!(build_environment(&caller_env(), &rule, &ctx()).get("PATH"), Some("/opt/bin"));
    }

    #[test]
    fn test_does_not_mutate_input() {
        let current = caller_env();
        let before = current.clone();
        let rule = Rule::permit(IdentitySpec::Any)
            .options(RuleOptions::KEEPENV)
            .setenv([EnvEntry::Unset("EDITOR".into())]);
        let _ = build_environment(&current, &rule, &ctx());
        assert_eq!(current, before);
    }

    #[test]
    fn test_is_denied() {
        assert!(is_denied("LD_PRELOAD"));
        assert!(is_denied("LD_AUDIT"));
        assert!(is_denied("DYLD_INSERT_LIBRARIES"));
        assert!(is_denied("BASH_FUNC_ls%%"));
        assert!(is_denied("IFS"));
        assert!(!is_denied("LDFLAGS"));
        assert!(!is_denied("TERM"));
    }
}
