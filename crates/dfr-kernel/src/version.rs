//! Engine version: the identity of the rule set and its evaluation order.
//!
//! `<revision>+<16 hex of SHA-256 over "revision\nRULE_1\nRULE_2…">`
//!
//! The version is part of the cache key, so reordering, adding or removing a
//! rule yields a fresh key space without anyone remembering to bump a string.

use crate::rules::{RULESET, RULESET_REVISION};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineVersion(String);

impl EngineVersion {
    /// Version of the rule set compiled into this build.
    pub fn current() -> &'static EngineVersion {
        static CURRENT: OnceLock<EngineVersion> = OnceLock::new();
        CURRENT.get_or_init(|| {
            Self::derive(RULESET_REVISION, RULESET.iter().map(|rule| rule.id()))
        })
    }

    /// Derive a version from a revision tag and the ordered rule ids.
    pub fn derive<'a>(revision: &str, rule_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(revision.as_bytes());
        for id in rule_ids {
            hasher.update(b"\n");
            hasher.update(id.as_bytes());
        }
        let digest = format!("{:x}", hasher.finalize());
        Self(format!("{revision}+{}", &digest[..16]))
    }

    /// Wrap an explicit version string (stored rows, tests).
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_version_is_derived_from_the_ruleset() {
        let current = EngineVersion::current();
        assert!(current.as_str().starts_with("2+"));
        assert_eq!(current.as_str().len(), "2+".len() + 16);
        assert_eq!(
            current,
            &EngineVersion::derive(
                "2",
                ["FE_BE_001", "API_SCHEMA_001", "DB_MIG_001", "API_METHOD_MATCH_001"]
            )
        );
    }

    #[test]
    fn order_and_revision_change_the_version() {
        let base = EngineVersion::derive("1", ["A", "B"]);
        assert_ne!(base, EngineVersion::derive("1", ["B", "A"]));
        assert_ne!(base, EngineVersion::derive("2", ["A", "B"]));
        assert_ne!(base, EngineVersion::derive("1", ["A"]));
        assert_ne!(EngineVersion::derive("1", ["AB"]), EngineVersion::derive("1", ["A", "B"]));
    }
}
