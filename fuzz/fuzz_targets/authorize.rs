#![no_main]

use elevate_policy::{GroupSet, Outcome, Policy, Request, StaticResolver};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let mut parts = text.splitn(2, '\n');
    let request_line = parts.next().unwrap_or_default();
    let Ok(policy) = Policy::from_toml_str(parts.next().unwrap_or_default()) else {
        return;
    };

    let resolver = StaticResolver::new()
        .with_user("root", 0)
        .with_user("alice", 1000)
        .with_group("wheel", 10);
    let groups = GroupSet::from(vec![1000, 10]);

    let mut words = request_line.split_whitespace().map(String::from);
    let command = words.next().unwrap_or_default();
    let args: Vec<String> = words.collect();

    let request = Request::new(1000, &groups, 0, &command, &args);
    let decision = policy.rules.authorize(&resolver, &request);

    // A deny outcome never carries a rule that permits.
    if decision.outcome == Outcome::Deny {
        assert!(decision.permitted_rule().is_none());
    }
});
