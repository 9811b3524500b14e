#![no_main]

use std::collections::BTreeMap;

use elevate_policy::env::is_denied;
use elevate_policy::{build_environment, EnvContext, IdentitySpec, Rule, RuleOptions, SAFE_PATH};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&bits, rest)) = data.split_first() else {
        return;
    };
    let text = String::from_utf8_lossy(rest);

    let current: BTreeMap<String, String> = text
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let rule = Rule::permit(IdentitySpec::Any)
        .command("fuzz")
        .options(RuleOptions::from_bits_truncate(bits) & !RuleOptions::SETENV);
    let ctx = EnvContext {
        caller_name: "alice".into(),
        target_name: "root".into(),
        target_home: "/root".into(),
        target_shell: "/bin/sh".into(),
    };

    let env = build_environment(&current, &rule, &ctx);
    assert_eq!(env.get("PATH"), Some(SAFE_PATH));
    for (name, _) in env.iter() {
        assert!(!is_denied(name), "{name} leaked");
    }
});
