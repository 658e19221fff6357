//! Report assembly.

use crate::canonical::Fingerprint;
use crate::version::EngineVersion;
use crate::violation::Violation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The deterministic failure report for one (fingerprint, engine version).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub fingerprint: Fingerprint,
    pub engine_version: EngineVersion,
    /// True iff `violations` is empty.
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub timestamp: DateTime<Utc>,
}

impl Report {
    /// Combine rule output with its identifying metadata.
    ///
    /// Violations keep the order they were produced in.
    pub fn assemble(
        fingerprint: Fingerprint,
        engine_version: EngineVersion,
        violations: Vec<Violation>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            passed: violations.is_empty(),
            fingerprint,
            engine_version,
            violations,
            timestamp,
        }
    }

    /// Equal in everything but the capture time.
    pub fn same_content(&self, other: &Report) -> bool {
        self.fingerprint == other.fingerprint
            && self.engine_version == other.engine_version
            && self.passed == other.passed
            && self.violations == other.violations
    }

    /// Violation count per rule id, in first-seen order.
    pub fn rule_counts(&self) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for v in &self.violations {
            match counts.iter_mut().find(|(id, _)| *id == v.rule_id) {
                Some((_, n)) => *n += 1,
                None => counts.push((v.rule_id.as_str(), 1)),
            }
        }
        counts
    }
}

/// A report as returned to a caller, with the out-of-band cache flag.
///
/// `cache_hit` is not part of the report's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEnvelope {
    #[serde(flatten)]
    pub report: Report,
    pub cache_hit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn passed_follows_violation_list() {
        let fp = Fingerprint::of_bytes(b"plan");
        let version = EngineVersion::new("1+test");

        let clean = Report::assemble(fp.clone(), version.clone(), Vec::new(), at(0));
        assert!(clean.passed);

        let v = Violation::new("DB_MIG_001", "no migration", "users", BTreeMap::new());
        let failing = Report::assemble(fp, version, vec![v], at(0));
        assert!(!failing.passed);
        assert_eq!(failing.rule_counts(), vec![("DB_MIG_001", 1)]);
    }

    #[test]
    fn timestamp_is_excluded_from_content_equality() {
        let fp = Fingerprint::of_bytes(b"plan");
        let a = Report::assemble(fp.clone(), EngineVersion::new("v1"), Vec::new(), at(1));
        let b = Report::assemble(fp.clone(), EngineVersion::new("v1"), Vec::new(), at(2));
        let c = Report::assemble(fp, EngineVersion::new("v2"), Vec::new(), at(1));
        assert!(a.same_content(&b));
        assert!(!a.same_content(&c));
    }

    #[test]
    fn envelope_flattens_report_fields() {
        let report = Report::assemble(
            Fingerprint::of_bytes(b"plan"),
            EngineVersion::new("1+abc"),
            Vec::new(),
            at(0),
        );
        let json = serde_json::to_value(ReportEnvelope {
            report,
            cache_hit: true,
        })
        .expect("serializable");

        let mut keys: Vec<&str> = json
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["cache_hit", "engine_version", "fingerprint", "passed", "timestamp", "violations"]
        );
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
    }
}
