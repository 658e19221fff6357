use crate::support;
use dfr_kernel::CanonicalPlan;
use serde_json::{Value, json};

pub fn run(plan: String, canonical: bool, json_output: bool) {
    let raw = support::read_plan_or_exit(&plan);
    let prepared = match CanonicalPlan::prepare_str(&raw) {
        Ok(prepared) => prepared,
        Err(err) => support::fail_with(&err.into(), json_output),
    };

    if json_output {
        let mut payload = json!({
            "plan": plan,
            "fingerprint": prepared.fingerprint,
        });
        if canonical {
            payload["canonical"] = Value::String(prepared.canonical_json.clone());
        }
        support::print_json(&payload);
    } else if canonical {
        println!("{}", prepared.fingerprint);
        println!("{}", prepared.canonical_json);
    } else {
        println!("{}", prepared.fingerprint);
    }
}
