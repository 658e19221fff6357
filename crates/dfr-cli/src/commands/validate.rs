use crate::config::DfrConfig;
use crate::support::{self, EXIT_VIOLATIONS};
use dfr_kernel::ReportEnvelope;

pub fn run(config: &DfrConfig, plan: String, no_cache: bool, json_output: bool) {
    let raw = support::read_plan_or_exit(&plan);
    let service = support::open_service(config);

    let result = if no_cache {
        service.evaluate_uncached(&raw)
    } else {
        let runtime = support::runtime_or_exit();
        runtime.block_on(service.validate_str(&raw))
    };

    let envelope = match result {
        Ok(envelope) => envelope,
        Err(err) => support::fail_with(&err, json_output),
    };

    if json_output {
        support::print_json(&envelope);
    } else {
        print_human(&plan, &envelope);
    }

    if !envelope.report.passed {
        std::process::exit(EXIT_VIOLATIONS);
    }
}

fn print_human(plan: &str, envelope: &ReportEnvelope) {
    let report = &envelope.report;
    let verdict = if report.passed {
        "PASSED".to_string()
    } else {
        format!("FAILED ({} violation(s))", report.violations.len())
    };

    println!("dfr validate");
    println!("  Plan: {plan}");
    println!("  Fingerprint: {}", report.fingerprint);
    println!("  Engine: {}", report.engine_version);
    println!("  Cache: {}", if envelope.cache_hit { "hit" } else { "miss" });
    println!("  Result: {verdict}");
    for violation in &report.violations {
        println!(
            "  - [{}] {}: {}",
            violation.rule_id, violation.offending_node, violation.message
        );
    }
}
