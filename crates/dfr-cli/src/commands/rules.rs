use crate::support;
use dfr_kernel::{EngineVersion, RULESET, RULESET_REVISION, rules::describe_ruleset};
use serde_json::json;

pub fn run(json_output: bool) {
    let version = EngineVersion::current();

    if json_output {
        support::print_json(&json!({
            "engine_version": version,
            "ruleset_revision": RULESET_REVISION,
            "rules": describe_ruleset(),
        }));
        return;
    }

    println!("dfr rules");
    println!("  Engine: {version}");
    for (order, rule) in RULESET.iter().enumerate() {
        println!("  {}. {}: {}", order + 1, rule.id(), rule.description());
    }
}
