//! Persisted report rows.

use chrono::{DateTime, Utc};
use dfr_kernel::{CanonicalPlan, EngineVersion, Fingerprint, Report};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key. Evaluation always keys by the pair, never the fingerprint alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub fingerprint: Fingerprint,
    pub engine_version: EngineVersion,
}

impl CacheKey {
    pub fn new(fingerprint: Fingerprint, engine_version: EngineVersion) -> Self {
        Self {
            fingerprint,
            engine_version,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.fingerprint.short(), self.engine_version)
    }
}

/// One stored evaluation, unique per (fingerprint, engine version).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub fingerprint: Fingerprint,
    pub engine_version: EngineVersion,
    /// `schema_version` of the submitted plan.
    pub schema_version: String,
    /// Canonical JCS text the fingerprint was taken over.
    pub canonical_plan: String,
    pub report: Report,
    pub created_at: DateTime<Utc>,
}

impl ReportRow {
    pub fn new(prepared: &CanonicalPlan, report: Report, created_at: DateTime<Utc>) -> Self {
        Self {
            fingerprint: report.fingerprint.clone(),
            engine_version: report.engine_version.clone(),
            schema_version: prepared.plan.schema_version.clone(),
            canonical_plan: prepared.canonical_json.clone(),
            report,
            created_at,
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.fingerprint.clone(), self.engine_version.clone())
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        self.fingerprint == key.fingerprint && self.engine_version == key.engine_version
    }
}
