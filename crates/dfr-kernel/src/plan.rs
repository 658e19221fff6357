//! Plan model and structural validation.
//!
//! A plan is read from JSON through [`Plan::from_value`], which checks
//! required fields, closed enumerations, id uniqueness and every id
//! reference in one pass and reports all problems by field path. Unknown
//! fields are ignored so older engines accept newer documents.
//!
//! A `Plan` value is only ever constructed through validation and is never
//! mutated afterwards.

use crate::error::{MalformedPlan, PlanIssue};
use crate::property::PropertyBag;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Component classification (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentKind {
    Frontend,
    Backend,
    Database,
    Worker,
    Cli,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::Frontend,
        ComponentKind::Backend,
        ComponentKind::Database,
        ComponentKind::Worker,
        ComponentKind::Cli,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Frontend => "frontend",
            ComponentKind::Backend => "backend",
            ComponentKind::Database => "database",
            ComponentKind::Worker => "worker",
            ComponentKind::Cli => "cli",
        }
    }
}

/// Resource classification (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Api,
    Table,
    Migration,
    Topic,
    Job,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Api,
        ResourceKind::Table,
        ResourceKind::Migration,
        ResourceKind::Topic,
        ResourceKind::Job,
    ];

    /// Parse a resource kind.
    ///
    /// Accepts the long-form aliases `api_endpoint` and `database_table`;
    /// they normalize to `api` and `table` before canonicalization.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "api_endpoint" => Some(ResourceKind::Api),
            "database_table" => Some(ResourceKind::Table),
            _ => Self::ALL.into_iter().find(|kind| kind.as_str() == raw),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Api => "api",
            ResourceKind::Table => "table",
            ResourceKind::Migration => "migration",
            ResourceKind::Topic => "topic",
            ResourceKind::Job => "job",
        }
    }
}

/// Relationship classification (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelationshipKind {
    Calls,
    Creates,
    Reads,
    Updates,
    Deletes,
    DependsOn,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 6] = [
        RelationshipKind::Calls,
        RelationshipKind::Creates,
        RelationshipKind::Reads,
        RelationshipKind::Updates,
        RelationshipKind::Deletes,
        RelationshipKind::DependsOn,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Calls => "calls",
            RelationshipKind::Creates => "creates",
            RelationshipKind::Reads => "reads",
            RelationshipKind::Updates => "updates",
            RelationshipKind::Deletes => "deletes",
            RelationshipKind::DependsOn => "depends_on",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(ComponentKind, ResourceKind, RelationshipKind);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub description: Option<String>,
    pub properties: PropertyBag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub kind: ComponentKind,
    pub path: String,
    pub resources: Vec<Resource>,
    /// Dependency component ids, sorted and duplicate-free.
    pub dependencies: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub kind: RelationshipKind,
    pub metadata: Option<PropertyBag>,
}

/// A validated architecture plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub schema_version: String,
    pub project_name: String,
    pub components: Vec<Component>,
    pub relationships: Vec<Relationship>,
    pub env_vars: Option<BTreeMap<String, String>>,
}

impl Plan {
    /// Parse and validate a plan from raw JSON text.
    pub fn from_json_str(raw: &str) -> Result<Self, MalformedPlan> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| MalformedPlan::single("$", format!("invalid JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Parse and validate a plan from a JSON value.
    pub fn from_value(value: &Value) -> Result<Self, MalformedPlan> {
        let mut reader = PlanReader::default();
        let plan = reader.plan(value);
        match plan {
            Some(plan) if reader.issues.is_empty() => {
                check_references(&plan, &mut reader.issues);
                if reader.issues.is_empty() {
                    Ok(plan)
                } else {
                    Err(MalformedPlan {
                        issues: reader.issues,
                    })
                }
            }
            _ => Err(MalformedPlan {
                issues: reader.issues,
            }),
        }
    }

    /// Lookup one component by id.
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Number of resources across all components.
    pub fn resource_count(&self) -> usize {
        self.components.iter().map(|c| c.resources.len()).sum()
    }
}

/// Id uniqueness and cross-reference checks, run only on a well-shaped plan.
fn check_references(plan: &Plan, issues: &mut Vec<PlanIssue>) {
    let mut seen = BTreeSet::new();
    for (ci, component) in plan.components.iter().enumerate() {
        if !seen.insert(component.id.as_str()) {
            issues.push(PlanIssue::new(
                format!("components[{ci}].id"),
                format!("duplicate component id `{}`", component.id),
            ));
        }

        let mut resource_ids = BTreeSet::new();
        for (ri, resource) in component.resources.iter().enumerate() {
            if !resource_ids.insert(resource.id.as_str()) {
                issues.push(PlanIssue::new(
                    format!("components[{ci}].resources[{ri}].id"),
                    format!(
                        "duplicate resource id `{}` in component `{}`",
                        resource.id, component.id
                    ),
                ));
            }
        }
    }

    for (ci, component) in plan.components.iter().enumerate() {
        for dep in &component.dependencies {
            if dep == &component.id {
                issues.push(PlanIssue::new(
                    format!("components[{ci}].dependencies"),
                    format!("component `{}` depends on itself", component.id),
                ));
            } else if !seen.contains(dep.as_str()) {
                issues.push(PlanIssue::new(
                    format!("components[{ci}].dependencies"),
                    format!("unknown component id `{dep}`"),
                ));
            }
        }
    }

    for (ri, rel) in plan.relationships.iter().enumerate() {
        for (field, id) in [("source", &rel.source), ("target", &rel.target)] {
            if !seen.contains(id.as_str()) {
                issues.push(PlanIssue::new(
                    format!("relationships[{ri}].{field}"),
                    format!("unknown component id `{id}`"),
                ));
            }
        }
    }
}

/// Walks a JSON document, collecting every shape issue it meets.
#[derive(Default)]
struct PlanReader {
    issues: Vec<PlanIssue>,
}

impl PlanReader {
    fn issue(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(PlanIssue::new(path, message));
    }

    fn object<'v>(&mut self, value: &'v Value, path: &str) -> Option<&'v Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            other => {
                self.issue(path, format!("expected an object, found {}", json_type(other)));
                None
            }
        }
    }

    fn required_str(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<String> {
        self.required_str_any(obj, path, &[key])
    }

    /// Required string under the first of `keys` present (aliases).
    fn required_str_any(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
        keys: &[&str],
    ) -> Option<String> {
        let field = join(path, keys[0]);
        let Some((key, value)) = keys.iter().find_map(|k| obj.get(*k).map(|v| (*k, v))) else {
            self.issue(field, "required field is missing");
            return None;
        };
        match value {
            Value::String(s) => Some(s.clone()),
            other => {
                self.issue(
                    join(path, key),
                    format!("expected a string, found {}", json_type(other)),
                );
                None
            }
        }
    }

    /// Required, non-empty identifier.
    fn required_id(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<String> {
        let id = self.required_str(obj, path, key)?;
        if id.trim().is_empty() {
            self.issue(join(path, key), "identifier must not be empty");
            return None;
        }
        Some(id)
    }

    fn optional_str(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<String> {
        match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                self.issue(
                    join(path, key),
                    format!("expected a string, found {}", json_type(other)),
                );
                None
            }
        }
    }

    fn required_array<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        path: &str,
        key: &str,
    ) -> Option<&'v [Value]> {
        match obj.get(key) {
            None => {
                self.issue(join(path, key), "required field is missing");
                None
            }
            Some(value) => self.array(value, &join(path, key)),
        }
    }

    /// Optional array; absent means empty.
    fn optional_array<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        path: &str,
        key: &str,
    ) -> Option<&'v [Value]> {
        match obj.get(key) {
            None => Some(&[]),
            Some(value) => self.array(value, &join(path, key)),
        }
    }

    fn array<'v>(&mut self, value: &'v Value, path: &str) -> Option<&'v [Value]> {
        match value {
            Value::Array(items) => Some(items.as_slice()),
            other => {
                self.issue(path, format!("expected an array, found {}", json_type(other)));
                None
            }
        }
    }

    fn bag(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<Option<PropertyBag>> {
        let field = join(path, key);
        match obj.get(key) {
            None => Some(None),
            Some(Value::Object(map)) => {
                PropertyBag::from_json_map(map, &field, &mut self.issues).map(Some)
            }
            Some(other) => {
                self.issue(field, format!("expected an object, found {}", json_type(other)));
                None
            }
        }
    }

    fn plan(&mut self, value: &Value) -> Option<Plan> {
        let obj = self.object(value, "$")?;

        let schema_version = self.required_str(obj, "", "schema_version");
        let project_name = self.required_str(obj, "", "project_name");

        let components = self.required_array(obj, "", "components").and_then(|items| {
            let parsed: Vec<Option<Component>> = items
                .iter()
                .enumerate()
                .map(|(i, item)| self.component(item, &format!("components[{i}]")))
                .collect();
            parsed.into_iter().collect::<Option<Vec<_>>>()
        });

        let relationships = self
            .required_array(obj, "", "relationships")
            .and_then(|items| {
                let parsed: Vec<Option<Relationship>> = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.relationship(item, &format!("relationships[{i}]")))
                    .collect();
                parsed.into_iter().collect::<Option<Vec<_>>>()
            });

        let env_vars = self.env_vars(obj);

        Some(Plan {
            schema_version: schema_version?,
            project_name: project_name?,
            components: components?,
            relationships: relationships?,
            env_vars: env_vars?,
        })
    }

    fn env_vars(&mut self, obj: &Map<String, Value>) -> Option<Option<BTreeMap<String, String>>> {
        let map = match obj.get("env_vars") {
            None => return Some(None),
            Some(Value::Object(map)) => map,
            Some(other) => {
                self.issue(
                    "env_vars",
                    format!("expected an object, found {}", json_type(other)),
                );
                return None;
            }
        };

        let mut out = BTreeMap::new();
        let mut ok = true;
        for (name, value) in map {
            match value {
                Value::String(s) => {
                    out.insert(name.clone(), s.clone());
                }
                other => {
                    self.issue(
                        format!("env_vars.{name}"),
                        format!("expected a string, found {}", json_type(other)),
                    );
                    ok = false;
                }
            }
        }
        ok.then_some(Some(out))
    }

    fn component(&mut self, value: &Value, path: &str) -> Option<Component> {
        let obj = self.object(value, path)?;

        let id = self.required_id(obj, path, "id");
        let name = self.required_str(obj, path, "name");
        let kind = self
            .required_str_any(obj, path, &["type", "kind"])
            .and_then(|raw| {
                let kind = ComponentKind::parse(&raw);
                if kind.is_none() {
                    self.issue(
                        join(path, "type"),
                        format!(
                            "unknown component type `{raw}` (allowed: frontend, backend, database, worker, cli)"
                        ),
                    );
                }
                kind
            });
        let fs_path = self.required_str(obj, path, "path");

        let resources = self.optional_array(obj, path, "resources").and_then(|items| {
            let parsed: Vec<Option<Resource>> = items
                .iter()
                .enumerate()
                .map(|(i, item)| self.resource(item, &format!("{path}.resources[{i}]")))
                .collect();
            parsed.into_iter().collect::<Option<Vec<_>>>()
        });

        let dependencies = self
            .optional_array(obj, path, "dependencies")
            .and_then(|items| self.dependencies(items, &join(path, "dependencies")));

        Some(Component {
            id: id?,
            name: name?,
            kind: kind?,
            path: fs_path?,
            resources: resources?,
            dependencies: dependencies?,
        })
    }

    fn dependencies(&mut self, items: &[Value], path: &str) -> Option<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        let mut ok = true;
        for (i, item) in items.iter().enumerate() {
            match item {
                Value::String(id) if !id.trim().is_empty() => {
                    if !out.insert(id.clone()) {
                        self.issue(format!("{path}[{i}]"), format!("duplicate dependency `{id}`"));
                        ok = false;
                    }
                }
                Value::String(_) => {
                    self.issue(format!("{path}[{i}]"), "identifier must not be empty");
                    ok = false;
                }
                other => {
                    self.issue(
                        format!("{path}[{i}]"),
                        format!("expected a string, found {}", json_type(other)),
                    );
                    ok = false;
                }
            }
        }
        ok.then_some(out)
    }

    fn resource(&mut self, value: &Value, path: &str) -> Option<Resource> {
        let obj = self.object(value, path)?;

        let id = self.required_id(obj, path, "id");
        let kind = self
            .required_str_any(obj, path, &["type", "kind"])
            .and_then(|raw| {
                let kind = ResourceKind::parse(&raw);
                if kind.is_none() {
                    self.issue(
                        join(path, "type"),
                        format!(
                            "unknown resource type `{raw}` (allowed: api, table, migration, topic, job)"
                        ),
                    );
                }
                kind
            });
        let name = self.required_str(obj, path, "name");
        let description = self.optional_str(obj, path, "description");
        let properties = self.bag(obj, path, "properties");

        Some(Resource {
            id: id?,
            kind: kind?,
            name: name?,
            description,
            properties: properties?.unwrap_or_default(),
        })
    }

    fn relationship(&mut self, value: &Value, path: &str) -> Option<Relationship> {
        let obj = self.object(value, path)?;

        let source = self.required_id(obj, path, "source");
        let target = self.required_id(obj, path, "target");
        let kind = self
            .required_str_any(obj, path, &["type", "kind"])
            .and_then(|raw| {
                let kind = RelationshipKind::parse(&raw);
                if kind.is_none() {
                    self.issue(
                        join(path, "type"),
                        format!(
                            "unknown relationship type `{raw}` (allowed: calls, creates, reads, updates, deletes, depends_on)"
                        ),
                    );
                }
                kind
            });
        let metadata = self.bag(obj, path, "metadata");

        Some(Relationship {
            source: source?,
            target: target?,
            kind: kind?,
            metadata: metadata?,
        })
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "schema_version": "1.0",
            "project_name": "shop",
            "components": [
                {"id": "web", "name": "Web", "type": "frontend", "path": "/web"},
                {
                    "id": "api",
                    "name": "API",
                    "type": "backend",
                    "path": "/api",
                    "resources": [
                        {"id": "list_users", "type": "api_endpoint", "name": "List users",
                         "properties": {"method": "GET", "path": "/users"}}
                    ]
                }
            ],
            "relationships": [
                {"source": "web", "target": "api", "type": "calls",
                 "metadata": {"method": "GET", "path": "/users"}}
            ]
        })
    }

    fn issue_paths(err: &MalformedPlan) -> Vec<&str> {
        err.issues.iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn parses_minimal_plan_and_normalizes_aliases() {
        let plan = Plan::from_value(&minimal()).expect("plan should validate");
        assert_eq!(plan.components.len(), 2);
        assert_eq!(plan.components[1].resources[0].kind, ResourceKind::Api);
        assert_eq!(plan.relationships[0].kind, RelationshipKind::Calls);
        assert!(plan.env_vars.is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut raw = minimal();
        raw["future_field"] = json!({"anything": true});
        raw["components"][0]["owner_team"] = json!("growth");
        assert!(Plan::from_value(&raw).is_ok());
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let raw = json!({
            "components": [{"id": "web", "type": "frontend"}],
            "relationships": []
        });
        let err = Plan::from_value(&raw).expect_err("must be malformed");
        let paths = issue_paths(&err);
        assert!(paths.contains(&"schema_version"));
        assert!(paths.contains(&"project_name"));
        assert!(paths.contains(&"components[0].name"));
        assert!(paths.contains(&"components[0].path"));
    }

    #[test]
    fn closed_enumerations_are_enforced() {
        let mut raw = minimal();
        raw["components"][0]["type"] = json!("desktop");
        raw["relationships"][0]["type"] = json!("invokes");
        let err = Plan::from_value(&raw).expect_err("must be malformed");
        assert_eq!(
            issue_paths(&err),
            vec!["components[0].type", "relationships[0].type"]
        );
    }

    #[test]
    fn unknown_relationship_target_is_malformed() {
        let mut raw = minimal();
        raw["relationships"][0]["target"] = json!("ghost");
        let err = Plan::from_value(&raw).expect_err("must be malformed");
        assert_eq!(issue_paths(&err), vec!["relationships[0].target"]);
        assert!(err.issues[0].message.contains("ghost"));
    }

    #[test]
    fn dependency_rules_are_enforced() {
        let mut raw = minimal();
        raw["components"][0]["dependencies"] = json!(["web", "nowhere"]);
        let err = Plan::from_value(&raw).expect_err("must be malformed");
        assert_eq!(err.issues.len(), 2);
        assert!(err.issues.iter().any(|i| i.message.contains("depends on itself")));
        assert!(err.issues.iter().any(|i| i.message.contains("nowhere")));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut raw = minimal();
        raw["components"][1]["id"] = json!("web");
        raw["relationships"] = json!([]);
        let err = Plan::from_value(&raw).expect_err("must be malformed");
        assert_eq!(issue_paths(&err), vec!["components[1].id"]);
    }

    #[test]
    fn env_vars_must_be_strings() {
        let mut raw = minimal();
        raw["env_vars"] = json!({"DATABASE_URL": "postgres://db", "PORT": 8080});
        let err = Plan::from_value(&raw).expect_err("must be malformed");
        assert_eq!(issue_paths(&err), vec!["env_vars.PORT"]);
    }

    #[test]
    fn invalid_json_text_is_malformed_at_root() {
        let err = Plan::from_json_str("{not json").expect_err("must be malformed");
        assert_eq!(issue_paths(&err), vec!["$"]);
    }
}
