use crate::config::DfrConfig;
use crate::support;

pub fn run(config: &DfrConfig, json_output: bool) {
    let service = support::open_service(config);
    let runtime = support::runtime_or_exit();
    let stats = match runtime.block_on(service.stats()) {
        Ok(stats) => stats,
        Err(err) => support::fail_with(&err, json_output),
    };

    if json_output {
        support::print_json(&stats);
        return;
    }

    println!("dfr stats");
    println!("  Total: {}", stats.total);
    println!("  Passed: {}", stats.passed);
    println!("  Failed: {}", stats.failed);
    if !stats.recent.is_empty() {
        println!("  Recent:");
        for recent in &stats.recent {
            println!(
                "    - {} {} {}",
                recent.fingerprint,
                recent.engine_version,
                if recent.passed { "passed" } else { "failed" }
            );
        }
    }
    if !stats.top_rules.is_empty() {
        println!("  Top rules:");
        for rule in &stats.top_rules {
            println!("    - {}: {}", rule.rule_id, rule.count);
        }
    }
}
