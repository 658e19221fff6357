//! # DFR Kernel
//!
//! Deterministic failure reports for declarative architecture plans.
//!
//! Given the same plan and the same rule set, the kernel produces the same
//! report, bit for bit (the capture timestamp aside). Input it cannot
//! evaluate safely is rejected or reported as ambiguous, never guessed at.
//!
//! ## Pipeline
//!
//! ```text
//! JSON ──▶ Plan::from_value      (MalformedPlan: every issue, by field path)
//!      ──▶ canonical + fingerprint
//!      ──▶ Graph::build          (StructuralError)
//!      ──▶ run_ruleset           (violations, or SystemError on a defect)
//!      ──▶ Report::assemble
//! ```
//!
//! Caching and persistence live in `dfr-cache` and `dfr-store`.

pub mod canonical;
pub mod endpoint;
pub mod error;
pub mod evaluate;
pub mod graph;
pub mod plan;
pub mod property;
pub mod report;
pub mod rules;
pub mod version;
pub mod violation;

pub use canonical::{Fingerprint, canonical_bytes, canonical_value, fingerprint, jcs_serialize};
pub use error::{EngineError, MalformedPlan, PlanIssue, StructuralError, SystemError};
pub use evaluate::{CanonicalPlan, evaluate, evaluate_value};
pub use graph::{Graph, NodeIndex};
pub use plan::{Component, ComponentKind, Plan, Relationship, RelationshipKind, Resource, ResourceKind};
pub use property::{Lookup, PropertyBag, PropertyValue};
pub use report::{Report, ReportEnvelope};
pub use rules::{RULESET, RULESET_REVISION, Rule};
pub use version::EngineVersion;
pub use violation::Violation;
