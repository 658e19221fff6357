//! Pure evaluation pipeline: validate → canonicalize → graph → rules → report.
//!
//! Caching sits outside this module. Everything here is synchronous and
//! free of shared state, so it can run on any worker.

use crate::canonical::{self, Fingerprint};
use crate::error::{EngineError, MalformedPlan};
use crate::graph::Graph;
use crate::plan::Plan;
use crate::report::Report;
use crate::rules::run_ruleset;
use crate::version::EngineVersion;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A validated plan together with its canonical form and fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPlan {
    pub plan: Plan,
    /// JCS text of the canonical projection.
    pub canonical_json: String,
    pub fingerprint: Fingerprint,
}

impl CanonicalPlan {
    /// Validate and canonicalize a submitted plan.
    pub fn prepare(value: &Value) -> Result<Self, MalformedPlan> {
        let plan = Plan::from_value(value)?;
        Ok(Self::from_plan(plan))
    }

    pub fn prepare_str(raw: &str) -> Result<Self, MalformedPlan> {
        let plan = Plan::from_json_str(raw)?;
        Ok(Self::from_plan(plan))
    }

    fn from_plan(plan: Plan) -> Self {
        let bytes = canonical::canonical_bytes(&plan);
        let fingerprint = Fingerprint::of_bytes(&bytes);
        // jcs_serialize only writes UTF-8 (valid input strings, ASCII syntax).
        let canonical_json = String::from_utf8_lossy(&bytes).into_owned();
        Self {
            plan,
            canonical_json,
            fingerprint,
        }
    }
}

/// Evaluate a prepared plan under `version`, stamping `timestamp`.
///
/// Returns a Report (passed or not) or an error; never a partial Report.
pub fn evaluate(
    prepared: &CanonicalPlan,
    version: &EngineVersion,
    timestamp: DateTime<Utc>,
) -> Result<Report, EngineError> {
    let graph = Graph::build(&prepared.plan)?;
    let violations = run_ruleset(&graph)?;

    tracing::debug!(
        fingerprint = %prepared.fingerprint.short(),
        engine_version = %version,
        violations = violations.len(),
        "plan evaluated"
    );

    Ok(Report::assemble(
        prepared.fingerprint.clone(),
        version.clone(),
        violations,
        timestamp,
    ))
}

/// Validate, canonicalize and evaluate in one step under the current engine
/// version.
pub fn evaluate_value(value: &Value, timestamp: DateTime<Utc>) -> Result<Report, EngineError> {
    let prepared = CanonicalPlan::prepare(value)?;
    evaluate(&prepared, EngineVersion::current(), timestamp)
}
