//! Error taxonomy for DFR evaluation.
//!
//! Nothing in this module is ever cached. A caller that receives an
//! `EngineError` got no Report at all, which keeps "the architecture is bad"
//! (a Report with violations) apart from "the input or the engine is bad".

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// One addressable defect in a submitted plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanIssue {
    /// Field path into the submitted document, e.g. `components[1].type`.
    pub path: String,
    pub message: String,
}

impl PlanIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// The plan failed schema or reference validation.
///
/// Every issue found is reported, not only the first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct MalformedPlan {
    pub issues: Vec<PlanIssue>,
}

impl MalformedPlan {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![PlanIssue::new(path, message)],
        }
    }
}

impl fmt::Display for MalformedPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed plan ({} issue(s))", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "; {issue}")?;
        }
        Ok(())
    }
}

/// Graph inconsistency detected after nominal validation passed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("{referenced_by} references unknown component `{id}`")]
    UnknownComponent { referenced_by: String, id: String },

    #[error("component `{id}` is declared more than once")]
    DuplicateComponent { id: String },
}

/// Unexpected failure inside the engine or its persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SystemError {
    /// A rule met data it could not handle after validation passed.
    #[error("rule {rule_id} failed: {message}")]
    RuleDefect { rule_id: String, message: String },

    /// A rule panicked; the panic was contained.
    #[error("rule {rule_id} panicked: {message}")]
    RulePanicked { rule_id: String, message: String },

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("persistence {operation} timed out after {timeout_ms}ms")]
    PersistenceTimeout { operation: String, timeout_ms: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Top-level failure of one evaluation request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    MalformedPlan(#[from] MalformedPlan),

    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("system error: {0}")]
    System(#[from] SystemError),
}

impl EngineError {
    /// Stable category string for callers and logs.
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::MalformedPlan(_) => "malformed_plan",
            EngineError::Structural(_) => "structural_error",
            EngineError::System(_) => "system_error",
        }
    }

    /// Whether the caller's input is at fault (as opposed to the engine).
    pub fn is_input_rejection(&self) -> bool {
        matches!(self, EngineError::MalformedPlan(_))
    }

    /// Machine-readable error payload.
    pub fn to_json(&self) -> Value {
        match self {
            EngineError::MalformedPlan(err) => json!({
                "error": self.category(),
                "message": err.to_string(),
                "issues": err.issues,
            }),
            _ => json!({
                "error": self.category(),
                "message": self.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_stable() {
        let malformed: EngineError = MalformedPlan::single("components", "missing").into();
        let structural: EngineError = StructuralError::DuplicateComponent {
            id: "fe".to_string(),
        }
        .into();
        let system: EngineError = SystemError::Internal("boom".to_string()).into();

        assert_eq!(malformed.category(), "malformed_plan");
        assert_eq!(structural.category(), "structural_error");
        assert_eq!(system.category(), "system_error");
        assert!(malformed.is_input_rejection());
        assert!(!system.is_input_rejection());
    }

    #[test]
    fn malformed_plan_json_lists_every_issue() {
        let err = EngineError::MalformedPlan(MalformedPlan {
            issues: vec![
                PlanIssue::new("project_name", "required field is missing"),
                PlanIssue::new("components[0].type", "unknown component type `gui`"),
            ],
        });

        let payload = err.to_json();
        assert_eq!(payload["error"], "malformed_plan");
        assert_eq!(payload["issues"].as_array().map(Vec::len), Some(2));
        assert_eq!(payload["issues"][1]["path"], "components[0].type");
    }
}
