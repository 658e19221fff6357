//! Open property bags attached to resources and relationships.
//!
//! Values are a closed set of variants. Numbers keep their source text, so
//! `1.50` stays `1.50` in the canonical form.
//!
//! Rules never read a bag through a defaulting accessor. Every typed lookup
//! returns a [`Lookup`], and an absent or wrong-typed value is something the
//! rule has to decide about explicitly.

use crate::error::PlanIssue;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// One value inside a property bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    String(String),
    /// Opaque numeric token; compared and hashed by its source text.
    Number(Number),
    Bool(bool),
    List(Vec<PropertyValue>),
    Map(PropertyBag),
}

impl PropertyValue {
    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "string",
            PropertyValue::Number(_) => "number",
            PropertyValue::Bool(_) => "boolean",
            PropertyValue::List(_) => "list",
            PropertyValue::Map(_) => "map",
        }
    }

    /// Convert a JSON value, recording an issue for unsupported shapes.
    ///
    /// `null` is rejected: it is neither "absent" nor a value, and treating it
    /// as either would be a guess.
    pub(crate) fn from_json(value: &Value, path: &str, issues: &mut Vec<PlanIssue>) -> Option<Self> {
        match value {
            Value::Null => {
                issues.push(PlanIssue::new(
                    path,
                    "null is not a supported property value",
                ));
                None
            }
            Value::Bool(b) => Some(PropertyValue::Bool(*b)),
            Value::Number(n) => Some(PropertyValue::Number(n.clone())),
            Value::String(s) => Some(PropertyValue::String(s.clone())),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                let mut ok = true;
                for (i, item) in items.iter().enumerate() {
                    match PropertyValue::from_json(item, &format!("{path}[{i}]"), issues) {
                        Some(v) => out.push(v),
                        None => ok = false,
                    }
                }
                ok.then_some(PropertyValue::List(out))
            }
            Value::Object(map) => PropertyBag::from_json_map(map, path, issues).map(PropertyValue::Map),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::Number(n) => Value::Number(n.clone()),
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            PropertyValue::Map(bag) => bag.to_json(),
        }
    }
}

/// Result of a typed property lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Present(T),
    Absent,
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
}

impl<T> Lookup<T> {
    pub fn present(self) -> Option<T> {
        match self {
            Lookup::Present(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Lookup::Present(_))
    }
}

/// Key-ordered property map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyBag(BTreeMap<String, PropertyValue>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_json_map(
        map: &Map<String, Value>,
        path: &str,
        issues: &mut Vec<PlanIssue>,
    ) -> Option<Self> {
        let mut out = BTreeMap::new();
        let mut ok = true;
        for (key, value) in map {
            match PropertyValue::from_json(value, &format!("{path}.{key}"), issues) {
                Some(v) => {
                    out.insert(key.clone(), v);
                }
                None => ok = false,
            }
        }
        ok.then_some(Self(out))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PropertyValue) -> Option<PropertyValue> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    pub fn get_str(&self, key: &str) -> Lookup<&str> {
        match self.0.get(key) {
            None => Lookup::Absent,
            Some(PropertyValue::String(s)) => Lookup::Present(s.as_str()),
            Some(other) => Lookup::WrongType {
                expected: "string",
                found: other.type_name(),
            },
        }
    }

    pub fn get_map(&self, key: &str) -> Lookup<&PropertyBag> {
        match self.0.get(key) {
            None => Lookup::Absent,
            Some(PropertyValue::Map(bag)) => Lookup::Present(bag),
            Some(other) => Lookup::WrongType {
                expected: "map",
                found: other.type_name(),
            },
        }
    }

    /// A list whose every element is a string.
    pub fn get_str_list(&self, key: &str) -> Lookup<Vec<&str>> {
        match self.0.get(key) {
            None => Lookup::Absent,
            Some(PropertyValue::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        PropertyValue::String(s) => out.push(s.as_str()),
                        other => {
                            return Lookup::WrongType {
                                expected: "list of strings",
                                found: other.type_name(),
                            };
                        }
                    }
                }
                Lookup::Present(out)
            }
            Some(other) => Lookup::WrongType {
                expected: "list of strings",
                found: other.type_name(),
            },
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.0 {
            map.insert(key.clone(), value.to_json());
        }
        Value::Object(map)
    }
}

impl FromIterator<(String, PropertyValue)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
