//! Resolving a `calls` relationship to the `api` resource it targets.
//!
//! Candidates are the target component's `api` resources with a readable
//! string `path` property. Two tiers, tried in order:
//!
//! - exact: resource path equals the call path
//! - prefix: the call path extends the resource path by whole segments
//!   (`/users` covers `/users/42`, not `/usersx`). A root path (`/` or
//!   empty) only ever matches exactly.
//!
//! The first non-empty tier wins. Resources whose `path` is absent or not a
//! string can never be ruled out, so they are reported alongside the verdict.

use crate::graph::{Graph, NodeIndex};
use crate::plan::{Resource, ResourceKind};
use crate::property::Lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    Prefix,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::Prefix => "prefix",
        }
    }
}

/// Path-level candidates for one call.
#[derive(Debug, Clone)]
pub struct Candidates<'p> {
    /// `None` when neither tier produced a candidate.
    pub tier: Option<MatchTier>,
    pub matches: Vec<&'p Resource>,
    /// `api` resources whose path could not be read.
    pub unreadable: Vec<&'p Resource>,
}

impl<'p> Candidates<'p> {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn ids(&self) -> Vec<&'p str> {
        self.matches.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn unreadable_ids(&self) -> Vec<&'p str> {
        self.unreadable.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Collect the path-level candidates in `target` for `call_path`.
pub fn candidates<'p>(graph: &Graph<'p>, target: NodeIndex, call_path: &str) -> Candidates<'p> {
    let mut exact = Vec::new();
    let mut prefix = Vec::new();
    let mut unreadable = Vec::new();

    for (_, resource) in graph.resources_of_kind(target, ResourceKind::Api) {
        match resource.properties.get_str("path") {
            Lookup::Present(path) if path == call_path => exact.push(resource),
            Lookup::Present(path) if extends_path(call_path, path) => prefix.push(resource),
            Lookup::Present(_) => {}
            Lookup::Absent | Lookup::WrongType { .. } => unreadable.push(resource),
        }
    }

    let (tier, matches) = if !exact.is_empty() {
        (Some(MatchTier::Exact), exact)
    } else if !prefix.is_empty() {
        (Some(MatchTier::Prefix), prefix)
    } else {
        (None, Vec::new())
    };

    Candidates {
        tier,
        matches,
        unreadable,
    }
}

/// `call` is `base` followed by one or more further path segments.
fn extends_path(call: &str, base: &str) -> bool {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return false;
    }
    call.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty())
}

/// HTTP method comparison.
pub fn same_method(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Plan;
    use serde_json::json;

    fn backend(resources: serde_json::Value) -> Plan {
        Plan::from_value(&json!({
            "schema_version": "1.0",
            "project_name": "endpoints",
            "components": [
                {"id": "api", "name": "API", "type": "backend", "path": "/api", "resources": resources}
            ],
            "relationships": []
        }))
        .expect("fixture plan should validate")
    }

    #[test]
    fn exact_tier_wins_over_prefix() {
        let plan = backend(json!([
            {"id": "users", "type": "api", "name": "Users", "properties": {"path": "/users"}},
            {"id": "user", "type": "api", "name": "User", "properties": {"path": "/users/42"}}
        ]));
        let graph = Graph::build(&plan).expect("graph");
        let target = graph.component_index("api").expect("api");

        let found = candidates(&graph, target, "/users/42");
        assert_eq!(found.tier, Some(MatchTier::Exact));
        assert_eq!(found.ids(), vec!["user"]);

        let found = candidates(&graph, target, "/users/7");
        assert_eq!(found.tier, Some(MatchTier::Prefix));
        assert_eq!(found.ids(), vec!["users"]);
    }

    #[test]
    fn prefix_requires_a_segment_boundary() {
        assert!(extends_path("/users/42", "/users"));
        assert!(extends_path("/users/42", "/users/"));
        assert!(!extends_path("/usersx", "/users"));
        assert!(!extends_path("/users", "/users"));
        assert!(!extends_path("/users/", "/users"));
    }

    #[test]
    fn root_path_matches_only_itself() {
        assert!(!extends_path("/billing/invoices", "/"));
        assert!(!extends_path("/billing", ""));

        let plan = backend(json!([
            {"id": "index", "type": "api", "name": "Index", "properties": {"method": "GET", "path": "/"}}
        ]));
        let graph = Graph::build(&plan).expect("graph");
        let target = graph.component_index("api").expect("api");

        let found = candidates(&graph, target, "/billing/invoices/does-not-exist");
        assert!(found.is_empty());
        assert_eq!(found.tier, None);

        let found = candidates(&graph, target, "/");
        assert_eq!(found.tier, Some(MatchTier::Exact));
        assert_eq!(found.ids(), vec!["index"]);
    }

    #[test]
    fn unreadable_paths_are_reported_and_other_kinds_skipped() {
        let plan = backend(json!([
            {"id": "broken", "type": "api", "name": "Broken", "properties": {"path": 5}},
            {"id": "bare", "type": "api", "name": "Bare"},
            {"id": "job", "type": "job", "name": "Job", "properties": {"path": "/orders"}}
        ]));
        let graph = Graph::build(&plan).expect("graph");
        let target = graph.component_index("api").expect("api");

        let found = candidates(&graph, target, "/orders");
        assert!(found.is_empty());
        assert_eq!(found.tier, None);
        assert_eq!(found.unreadable_ids(), vec!["broken", "bare"]);
    }

    #[test]
    fn methods_compare_case_insensitively() {
        assert!(same_method("get", "GET"));
        assert!(!same_method("POST", "GET"));
    }
}
