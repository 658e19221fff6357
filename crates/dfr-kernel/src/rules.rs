//! The versioned rule set.
//!
//! Rules are a closed list of enum variants run in [`RULESET`] order. That
//! order, together with [`RULESET_REVISION`], is what the engine version
//! fingerprints: changing either changes the cache key.
//!
//! Every rule is pure over the graph, which borrows the plan. When a rule
//! cannot reach a verdict (metadata missing or wrong-typed, or several equally
//! good matches) it emits a violation under `ambiguous_<RULE_ID>` instead of
//! passing.

use crate::endpoint::{self, Candidates};
use crate::error::SystemError;
use crate::graph::{Edge, EdgeOrigin, Graph, NodeIndex};
use crate::plan::{Component, ComponentKind, RelationshipKind, Resource, ResourceKind};
use crate::property::{Lookup, PropertyBag};
use crate::violation::{AMBIGUOUS_PREFIX, Detail, Violation};
use serde_json::{Value, json};
use std::panic::{self, AssertUnwindSafe};

/// Bumped whenever any rule's semantics change.
pub const RULESET_REVISION: &str = "2";

/// Evaluation order. Output order follows it.
pub const RULESET: [Rule; 4] = [
    Rule::FrontendBackendMatch,
    Rule::ApiSchemaDeclared,
    Rule::TableHasMigration,
    Rule::ApiMethodMatch,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// FE_BE_001
    FrontendBackendMatch,
    /// API_SCHEMA_001
    ApiSchemaDeclared,
    /// DB_MIG_001
    TableHasMigration,
    /// API_METHOD_MATCH_001
    ApiMethodMatch,
}

/// A rule met data it cannot handle. Converted to [`SystemError::RuleDefect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDefect(pub String);

type RuleResult = Result<Vec<Violation>, RuleDefect>;

impl Rule {
    pub fn id(&self) -> &'static str {
        match self {
            Rule::FrontendBackendMatch => "FE_BE_001",
            Rule::ApiSchemaDeclared => "API_SCHEMA_001",
            Rule::TableHasMigration => "DB_MIG_001",
            Rule::ApiMethodMatch => "API_METHOD_MATCH_001",
        }
    }

    pub fn ambiguous_id(&self) -> String {
        format!("{AMBIGUOUS_PREFIX}{}", self.id())
    }

    pub fn description(&self) -> &'static str {
        match self {
            Rule::FrontendBackendMatch => {
                "frontend `calls` must target an api resource whose path matches the call path"
            }
            Rule::ApiSchemaDeclared => "api resources must declare request and response schemas",
            Rule::TableHasMigration => {
                "tables in database components must be referenced by a sibling migration"
            }
            Rule::ApiMethodMatch => {
                "non-frontend `calls` must resolve to an api resource, and a `calls` method must equal the declared method of the api resource it resolves to"
            }
        }
    }

    pub fn evaluate(&self, graph: &Graph<'_>) -> RuleResult {
        match self {
            Rule::FrontendBackendMatch => frontend_backend_match(self, graph),
            Rule::ApiSchemaDeclared => api_schema_declared(self, graph),
            Rule::TableHasMigration => table_has_migration(self, graph),
            Rule::ApiMethodMatch => api_method_match(self, graph),
        }
    }

    fn violation(&self, message: String, node: impl Into<String>, detail: Detail) -> Violation {
        Violation::new(self.id(), message, node, detail.into_map())
    }

    fn ambiguous(&self, message: String, node: impl Into<String>, detail: Detail) -> Violation {
        Violation::new(self.ambiguous_id(), message, node, detail.into_map())
    }
}

/// Run every rule in order and merge their violations.
///
/// A rule that returns a defect or panics aborts the evaluation with a
/// [`SystemError`]; no partial result escapes.
pub fn run_ruleset(graph: &Graph<'_>) -> Result<Vec<Violation>, SystemError> {
    let mut violations = Vec::new();
    for rule in RULESET {
        let found = guarded(rule.id(), || rule.evaluate(graph))?;
        tracing::debug!(rule = rule.id(), count = found.len(), "rule evaluated");
        violations.extend(found);
    }
    Ok(violations)
}

/// Run one rule body, converting defects and panics into [`SystemError`].
pub fn guarded<F>(rule_id: &str, body: F) -> Result<Vec<Violation>, SystemError>
where
    F: FnOnce() -> RuleResult,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(violations)) => Ok(violations),
        Ok(Err(RuleDefect(message))) => {
            tracing::error!(rule = rule_id, defect = %message, "rule defect");
            Err(SystemError::RuleDefect {
                rule_id: rule_id.to_string(),
                message,
            })
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(rule = rule_id, panic = %message, "rule panicked");
            Err(SystemError::RulePanicked {
                rule_id: rule_id.to_string(),
                message,
            })
        }
    }
}

/// `relationships[i]` for a relationship edge.
fn relationship_node(edge: &Edge<'_>) -> Result<String, RuleDefect> {
    match edge.origin {
        EdgeOrigin::Relationship(i) => Ok(format!("relationships[{i}]")),
        other => Err(RuleDefect(format!(
            "expected a relationship edge, found {other:?}"
        ))),
    }
}

fn component_at<'p>(graph: &Graph<'p>, idx: NodeIndex) -> Result<&'p Component, RuleDefect> {
    graph
        .component(idx)
        .ok_or_else(|| RuleDefect(format!("node {} is not a component", idx.index())))
}

fn lookup_note<T>(lookup: &Lookup<T>) -> String {
    match lookup {
        Lookup::Present(_) => "present".to_string(),
        Lookup::Absent => "missing".to_string(),
        Lookup::WrongType { expected, found } => format!("expected {expected}, found {found}"),
    }
}

fn call_detail(source: &Component, target: &Component) -> Detail {
    Detail::new()
        .with("source", source.id.as_str())
        .with("target", target.id.as_str())
}

fn with_candidates(detail: Detail, found: &Candidates<'_>) -> Detail {
    let detail = detail.with("candidates", json!(found.ids()));
    match found.tier {
        Some(tier) => detail.with("match_tier", tier.as_str()),
        None => detail,
    }
}

fn frontend_backend_match(rule: &Rule, graph: &Graph<'_>) -> RuleResult {
    let mut out = Vec::new();

    for edge in graph.relationship_edges(RelationshipKind::Calls) {
        let source = component_at(graph, edge.source)?;
        if source.kind != ComponentKind::Frontend {
            continue;
        }
        let target = component_at(graph, edge.target)?;
        let node = relationship_node(edge)?;
        let empty = PropertyBag::new();
        let metadata = edge.metadata.unwrap_or(&empty);

        let call_path = match metadata.get_str("path") {
            Lookup::Present(path) => path,
            other => {
                out.push(rule.ambiguous(
                    format!(
                        "cannot check call from `{}` to `{}`: metadata.path is {}",
                        source.id,
                        target.id,
                        lookup_note(&other)
                    ),
                    node,
                    call_detail(source, target).with("field", "metadata.path"),
                ));
                continue;
            }
        };

        let found = endpoint::candidates(graph, edge.target, call_path);
        if !found.is_empty() {
            continue;
        }

        if !found.unreadable.is_empty() {
            out.push(rule.ambiguous(
                format!(
                    "cannot check call to `{}` {call_path}: api resources with unreadable paths: {}",
                    target.id,
                    found.unreadable_ids().join(", ")
                ),
                node,
                call_detail(source, target)
                    .with("path", call_path)
                    .with("unreadable", json!(found.unreadable_ids())),
            ));
            continue;
        }

        out.push(rule.violation(
            format!(
                "frontend `{}` calls {call_path} but `{}` declares no api resource for that path",
                source.id, target.id
            ),
            node,
            call_detail(source, target).with("path", call_path),
        ));
    }

    Ok(out)
}

fn api_schema_declared(rule: &Rule, graph: &Graph<'_>) -> RuleResult {
    let mut out = Vec::new();

    for (idx, resource) in graph.resource_nodes() {
        if resource.kind != ResourceKind::Api {
            continue;
        }
        let owner = graph
            .owner_of(idx)
            .ok_or_else(|| RuleDefect(format!("resource `{}` has no owner", resource.id)))?;
        let owner = component_at(graph, owner)?;
        let props = &resource.properties;

        let schema = match props.get_map("schema") {
            Lookup::Present(bag) => Some(bag),
            Lookup::Absent => None,
            wrong @ Lookup::WrongType { .. } => {
                out.push(rule.ambiguous(
                    format!(
                        "cannot read schema of api resource `{}`: properties.schema is {}",
                        resource.id,
                        lookup_note(&wrong)
                    ),
                    resource.id.as_str(),
                    Detail::new()
                        .with("component", owner.id.as_str())
                        .with("field", "properties.schema"),
                ));
                continue;
            }
        };

        let declares = |part: &str| {
            props.contains_key(&format!("{part}_schema"))
                || schema.is_some_and(|bag| bag.contains_key(part))
        };
        let missing: Vec<&str> = ["request", "response"]
            .into_iter()
            .filter(|&part| !declares(part))
            .collect();

        if missing.is_empty() {
            continue;
        }

        out.push(rule.violation(
            format!(
                "api resource `{}` ({}) does not declare a {} schema",
                resource.id,
                describe_endpoint(resource),
                missing.join(" or ")
            ),
            resource.id.as_str(),
            Detail::new()
                .with("component", owner.id.as_str())
                .with("missing", json!(missing)),
        ));
    }

    Ok(out)
}

fn describe_endpoint(resource: &Resource) -> String {
    let props = &resource.properties;
    match (props.get_str("method"), props.get_str("path")) {
        (Lookup::Present(m), Lookup::Present(p)) => format!("{m} {p}"),
        (_, Lookup::Present(p)) => p.to_string(),
        _ => resource.name.clone(),
    }
}

/// Tables a migration says it touches.
enum MigrationRefs<'p> {
    Known(Vec<&'p str>),
    Unreadable(String),
}

fn migration_refs(migration: &Resource) -> MigrationRefs<'_> {
    let props = &migration.properties;
    let mut refs = Vec::new();
    let mut readable = false;

    match props.get_str("table") {
        Lookup::Present(t) => {
            refs.push(t);
            readable = true;
        }
        Lookup::Absent => {}
        wrong @ Lookup::WrongType { .. } => {
            return MigrationRefs::Unreadable(format!("table is {}", lookup_note(&wrong)));
        }
    }
    match props.get_str_list("tables") {
        Lookup::Present(ts) => {
            refs.extend(ts);
            readable = true;
        }
        Lookup::Absent => {}
        wrong @ Lookup::WrongType { .. } => {
            return MigrationRefs::Unreadable(format!("tables is {}", lookup_note(&wrong)));
        }
    }

    if readable {
        MigrationRefs::Known(refs)
    } else {
        MigrationRefs::Unreadable("neither table nor tables is declared".to_string())
    }
}

fn table_has_migration(rule: &Rule, graph: &Graph<'_>) -> RuleResult {
    let mut out = Vec::new();

    for (owner_idx, owner) in graph.component_nodes() {
        if owner.kind != ComponentKind::Database {
            continue;
        }

        let migrations: Vec<(&Resource, MigrationRefs<'_>)> = graph
            .resources_of_kind(owner_idx, ResourceKind::Migration)
            .map(|(_, m)| (m, migration_refs(m)))
            .collect();

        for (_, table) in graph.resources_of_kind(owner_idx, ResourceKind::Table) {
            let covered = migrations.iter().any(|(_, refs)| match refs {
                MigrationRefs::Known(names) => names
                    .iter()
                    .any(|n| *n == table.id || *n == table.name),
                MigrationRefs::Unreadable(_) => false,
            });
            if covered {
                continue;
            }

            let unreadable: Vec<(&str, &str)> = migrations
                .iter()
                .filter_map(|(m, refs)| match refs {
                    MigrationRefs::Unreadable(why) => Some((m.id.as_str(), why.as_str())),
                    MigrationRefs::Known(_) => None,
                })
                .collect();

            if !unreadable.is_empty() {
                let notes: Vec<String> = unreadable
                    .iter()
                    .map(|(id, why)| format!("`{id}`: {why}"))
                    .collect();
                out.push(rule.ambiguous(
                    format!(
                        "cannot tell whether table `{}` has a migration ({})",
                        table.id,
                        notes.join("; ")
                    ),
                    table.id.as_str(),
                    Detail::new()
                        .with("component", owner.id.as_str())
                        .with(
                            "unreadable_migrations",
                            json!(unreadable.iter().map(|(id, _)| *id).collect::<Vec<_>>()),
                        ),
                ));
                continue;
            }

            out.push(rule.violation(
                format!(
                    "table `{}` in `{}` is not referenced by any migration",
                    table.name, owner.id
                ),
                table.id.as_str(),
                Detail::new()
                    .with("component", owner.id.as_str())
                    .with("table_name", table.name.as_str()),
            ));
        }
    }

    Ok(out)
}

fn api_method_match(rule: &Rule, graph: &Graph<'_>) -> RuleResult {
    let mut out = Vec::new();
    let empty = PropertyBag::new();

    for edge in graph.relationship_edges(RelationshipKind::Calls) {
        let source = component_at(graph, edge.source)?;
        let target = component_at(graph, edge.target)?;
        let node = relationship_node(edge)?;
        let metadata = edge.metadata.unwrap_or(&empty);
        // FE_BE_001 resolves frontend calls; every other caller is resolved here.
        let resolves_here = source.kind != ComponentKind::Frontend;

        let call_method = match metadata.get_str("method") {
            Lookup::Present(m) => Some(m),
            Lookup::Absent => None,
            wrong @ Lookup::WrongType { .. } => {
                out.push(rule.ambiguous(
                    format!(
                        "cannot check call method from `{}`: metadata.method is {}",
                        source.id,
                        lookup_note(&wrong)
                    ),
                    node,
                    call_detail(source, target).with("field", "metadata.method"),
                ));
                continue;
            }
        };
        if call_method.is_none() && !resolves_here {
            continue;
        }
        let detail = match call_method {
            Some(m) => call_detail(source, target).with("call_method", m),
            None => call_detail(source, target),
        };

        let call_path = match metadata.get_str("path") {
            Lookup::Present(p) => p,
            other => {
                out.push(rule.ambiguous(
                    format!(
                        "cannot resolve call from `{}` to `{}`: metadata.path is {}",
                        source.id,
                        target.id,
                        lookup_note(&other)
                    ),
                    node,
                    detail.with("field", "metadata.path"),
                ));
                continue;
            }
        };

        let found = endpoint::candidates(graph, edge.target, call_path);
        let base = detail.with("path", call_path);

        if found.is_empty() {
            if !found.unreadable.is_empty() {
                out.push(rule.ambiguous(
                    format!(
                        "cannot resolve {call_path} on `{}`: api resources with unreadable paths: {}",
                        target.id,
                        found.unreadable_ids().join(", ")
                    ),
                    node,
                    base.with("unreadable", json!(found.unreadable_ids())),
                ));
            } else if resolves_here {
                out.push(rule.violation(
                    format!(
                        "{} `{}` calls {call_path} but `{}` declares no api resource for that path",
                        source.kind.as_str(),
                        source.id,
                        target.id
                    ),
                    node,
                    base,
                ));
            }
            continue;
        }

        let Some(call_method) = call_method else {
            continue;
        };

        if let [resource] = found.matches.as_slice() {
            match resource.properties.get_str("method") {
                Lookup::Present(declared) if endpoint::same_method(declared, call_method) => {}
                Lookup::Present(declared) => out.push(rule.violation(
                    format!(
                        "call uses {call_method} {call_path} but api resource `{}` declares {declared}",
                        resource.id
                    ),
                    node,
                    with_candidates(base, &found)
                        .with("resource", resource.id.as_str())
                        .with("target_method", declared),
                )),
                other => out.push(rule.ambiguous(
                    format!(
                        "cannot compare methods for {call_path}: api resource `{}` method is {}",
                        resource.id,
                        lookup_note(&other)
                    ),
                    node,
                    with_candidates(base, &found)
                        .with("resource", resource.id.as_str())
                        .with("field", "properties.method"),
                )),
            }
            continue;
        }

        // Several candidates in the winning tier: the method is the only
        // remaining tie-break.
        let mut declared = Vec::new();
        let mut unreadable_method = false;
        for resource in &found.matches {
            match resource.properties.get_str("method") {
                Lookup::Present(m) => declared.push((resource.id.as_str(), m)),
                _ => unreadable_method = true,
            }
        }
        let agreeing: Vec<&str> = declared
            .iter()
            .filter(|(_, m)| endpoint::same_method(m, call_method))
            .map(|(id, _)| *id)
            .collect();

        match (agreeing.len(), unreadable_method) {
            (1, _) => {}
            (0, false) => {
                let methods: Vec<&str> = declared.iter().map(|(_, m)| *m).collect();
                out.push(rule.violation(
                    format!(
                        "call uses {call_method} {call_path} but the matching api resources declare {}",
                        methods.join(", ")
                    ),
                    node,
                    with_candidates(base, &found).with("target_methods", json!(methods)),
                ));
            }
            _ => out.push(rule.ambiguous(
                format!(
                    "{call_method} {call_path} on `{}` matches {} api resources with no deterministic tie-break",
                    target.id,
                    found.matches.len()
                ),
                node,
                with_candidates(base, &found),
            )),
        }
    }

    Ok(out)
}

/// Serializable description of the rule set, in evaluation order.
pub fn describe_ruleset() -> Value {
    Value::Array(
        RULESET
            .iter()
            .enumerate()
            .map(|(order, rule)| {
                json!({
                    "order": order,
                    "rule_id": rule.id(),
                    "ambiguous_id": rule.ambiguous_id(),
                    "description": rule.description(),
                })
            })
            .collect(),
    )
}
