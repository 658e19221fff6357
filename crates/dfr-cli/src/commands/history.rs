use crate::config::DfrConfig;
use crate::support::{self, EXIT_REJECTED};
use dfr_kernel::Fingerprint;
use serde_json::json;

pub fn run(config: &DfrConfig, fingerprint: String, json_output: bool) {
    let Some(parsed) = Fingerprint::parse(&fingerprint) else {
        eprintln!("error: `{fingerprint}` is not a 64-character lowercase hex fingerprint");
        std::process::exit(EXIT_REJECTED);
    };

    let service = support::open_service(config);
    let runtime = support::runtime_or_exit();
    let rows = match runtime.block_on(service.history(&parsed)) {
        Ok(rows) => rows,
        Err(err) => support::fail_with(&err, json_output),
    };

    if json_output {
        let reports: Vec<_> = rows
            .iter()
            .map(|row| {
                json!({
                    "engine_version": row.engine_version,
                    "created_at": row.created_at,
                    "report": row.report,
                })
            })
            .collect();
        support::print_json(&json!({
            "fingerprint": parsed,
            "count": rows.len(),
            "reports": reports,
        }));
        return;
    }

    println!("dfr history");
    println!("  Fingerprint: {parsed}");
    println!("  Reports: {}", rows.len());
    for row in &rows {
        println!(
            "  - {} at {}: {} ({} violation(s))",
            row.engine_version,
            row.created_at.to_rfc3339(),
            if row.report.passed { "passed" } else { "failed" },
            row.report.violations.len()
        );
    }
}
