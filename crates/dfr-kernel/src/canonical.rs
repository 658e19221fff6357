//! Canonical plan form and content fingerprint.
//!
//! Algorithm:
//! 1. Project the validated plan onto its canonical JSON shape (normalized
//!    kinds, unknown input fields dropped, optional fields omitted when absent)
//! 2. Serialize JCS-style: sorted keys, no whitespace, numbers as source text
//! 3. fingerprint = lowercase hex SHA-256 of those bytes
//!
//! Arrays keep their input order: reordering `components` changes the
//! fingerprint. Dependency sets are already sorted by the plan model.
//! Property-bag numbers are written as their source text.

use crate::plan::{Component, Plan, Relationship, Resource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 content fingerprint of a canonical plan (64 lowercase hex chars).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{hash:x}"))
    }

    /// Accept an externally supplied fingerprint (e.g. a history lookup).
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == 64
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for human-facing output.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical JSON projection of a plan.
pub fn canonical_value(plan: &Plan) -> Value {
    let mut map = Map::new();
    map.insert(
        "schema_version".to_string(),
        Value::String(plan.schema_version.clone()),
    );
    map.insert(
        "project_name".to_string(),
        Value::String(plan.project_name.clone()),
    );
    map.insert(
        "components".to_string(),
        Value::Array(plan.components.iter().map(component_value).collect()),
    );
    map.insert(
        "relationships".to_string(),
        Value::Array(plan.relationships.iter().map(relationship_value).collect()),
    );
    if let Some(env_vars) = &plan.env_vars {
        let vars = env_vars
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        map.insert("env_vars".to_string(), Value::Object(vars));
    }
    Value::Object(map)
}

fn component_value(component: &Component) -> Value {
    let mut map = Map::new();
    map.insert("id".to_string(), Value::String(component.id.clone()));
    map.insert("name".to_string(), Value::String(component.name.clone()));
    map.insert(
        "type".to_string(),
        Value::String(component.kind.as_str().to_string()),
    );
    map.insert("path".to_string(), Value::String(component.path.clone()));
    map.insert(
        "resources".to_string(),
        Value::Array(component.resources.iter().map(resource_value).collect()),
    );
    map.insert(
        "dependencies".to_string(),
        Value::Array(
            component
                .dependencies
                .iter()
                .map(|d| Value::String(d.clone()))
                .collect(),
        ),
    );
    Value::Object(map)
}

fn resource_value(resource: &Resource) -> Value {
    let mut map = Map::new();
    map.insert("id".to_string(), Value::String(resource.id.clone()));
    map.insert(
        "type".to_string(),
        Value::String(resource.kind.as_str().to_string()),
    );
    map.insert("name".to_string(), Value::String(resource.name.clone()));
    if let Some(description) = &resource.description {
        map.insert(
            "description".to_string(),
            Value::String(description.clone()),
        );
    }
    map.insert("properties".to_string(), resource.properties.to_json());
    Value::Object(map)
}

fn relationship_value(rel: &Relationship) -> Value {
    let mut map = Map::new();
    map.insert("source".to_string(), Value::String(rel.source.clone()));
    map.insert("target".to_string(), Value::String(rel.target.clone()));
    map.insert(
        "type".to_string(),
        Value::String(rel.kind.as_str().to_string()),
    );
    if let Some(metadata) = &rel.metadata {
        map.insert("metadata".to_string(), metadata.to_json());
    }
    Value::Object(map)
}

/// Canonical bytes of a plan.
pub fn canonical_bytes(plan: &Plan) -> Vec<u8> {
    jcs_serialize(&canonical_value(plan))
}

/// Fingerprint of a plan's canonical bytes.
pub fn fingerprint(plan: &Plan) -> Fingerprint {
    Fingerprint::of_bytes(&canonical_bytes(plan))
}

/// JCS-style canonical JSON, modelled on RFC 8785 but not byte-compatible
/// with it.
///
/// Object keys are sorted by UTF-8 bytes (RFC 8785 sorts UTF-16 code units,
/// which differs for non-BMP keys). Numbers are emitted as their stored text
/// rather than in ES6 form. No insignificant whitespace.
pub fn jcs_serialize(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    write_value(&mut buf, value);
    buf
}

fn write_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(true) => buf.extend_from_slice(b"true"),
        Value::Bool(false) => buf.extend_from_slice(b"false"),
        Value::Number(n) => buf.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_string(buf, s),
        Value::Array(items) => {
            buf.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_value(buf, item);
            }
            buf.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            buf.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_string(buf, key);
                buf.push(b':');
                write_value(buf, &map[key.as_str()]);
            }
            buf.push(b'}');
        }
    }
}

/// JSON string escaping per RFC 8785 §3.2.2.2.
fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for ch in s.chars() {
        match ch {
            '"' => buf.extend_from_slice(b"\\\""),
            '\\' => buf.extend_from_slice(b"\\\\"),
            '\u{08}' => buf.extend_from_slice(b"\\b"),
            '\u{0c}' => buf.extend_from_slice(b"\\f"),
            '\n' => buf.extend_from_slice(b"\\n"),
            '\r' => buf.extend_from_slice(b"\\r"),
            '\t' => buf.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                buf.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut tmp = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
    buf.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(value: Value) -> Plan {
        Plan::from_value(&value).expect("fixture plan should validate")
    }

    fn two_components(first: Value, second: Value) -> Value {
        json!({
            "schema_version": "1.0",
            "project_name": "p",
            "components": [first, second],
            "relationships": []
        })
    }

    #[test]
    fn canonical_form_is_sorted_and_compact() {
        let p = plan(json!({
            "schema_version": "1.0",
            "project_name": "p",
            "components": [{"id": "w", "name": "W", "type": "worker", "path": "/w"}],
            "relationships": []
        }));
        let text = String::from_utf8(canonical_bytes(&p)).expect("utf-8");
        insta::assert_snapshot!(text, @r#"{"components":[{"dependencies":[],"id":"w","name":"W","path":"/w","resources":[],"type":"worker"}],"project_name":"p","relationships":[],"schema_version":"1.0"}"#);
        assert_eq!(
            fingerprint(&p).as_str(),
            "ed12e514f73c1404d7c3c55b085cd2273da2cebbf424450c96f3b6324a700074"
        );
    }

    #[test]
    fn property_key_order_does_not_change_fingerprint() {
        let a = plan(two_components(
            json!({"id": "a", "name": "A", "type": "backend", "path": "/a", "resources": [
                {"id": "r", "type": "api", "name": "R", "properties": {"method": "GET", "path": "/x"}}
            ]}),
            json!({"id": "b", "name": "B", "type": "worker", "path": "/b"}),
        ));
        let b = plan(two_components(
            json!({"path": "/a", "type": "backend", "resources": [
                {"properties": {"path": "/x", "method": "GET"}, "name": "R", "type": "api", "id": "r"}
            ], "name": "A", "id": "a"}),
            json!({"id": "b", "name": "B", "type": "worker", "path": "/b"}),
        ));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn component_order_changes_fingerprint() {
        let first = json!({"id": "a", "name": "A", "type": "backend", "path": "/a"});
        let second = json!({"id": "b", "name": "B", "type": "worker", "path": "/b"});
        let forward = plan(two_components(first.clone(), second.clone()));
        let reversed = plan(two_components(second, first));
        assert_ne!(fingerprint(&forward), fingerprint(&reversed));
    }

    #[test]
    fn optional_field_presence_changes_fingerprint() {
        let base = json!({
            "schema_version": "1.0",
            "project_name": "p",
            "components": [],
            "relationships": []
        });
        let mut with_env = base.clone();
        with_env["env_vars"] = json!({});
        assert_ne!(fingerprint(&plan(base)), fingerprint(&plan(with_env)));
    }

    #[test]
    fn kind_aliases_share_a_fingerprint() {
        let long = plan(two_components(
            json!({"id": "db", "name": "DB", "type": "database", "path": "/db", "resources": [
                {"id": "t", "type": "database_table", "name": "users"}
            ]}),
            json!({"id": "b", "name": "B", "type": "worker", "path": "/b"}),
        ));
        let short = plan(two_components(
            json!({"id": "db", "name": "DB", "type": "database", "path": "/db", "resources": [
                {"id": "t", "type": "table", "name": "users"}
            ]}),
            json!({"id": "b", "name": "B", "type": "worker", "path": "/b"}),
        ));
        assert_eq!(fingerprint(&long), fingerprint(&short));
    }

    #[test]
    fn numbers_are_opaque_tokens() {
        let with_decimal: Value = serde_json::from_str(
            r#"{"schema_version":"1.0","project_name":"p","relationships":[],
                "components":[{"id":"a","name":"A","type":"backend","path":"/a","resources":[
                  {"id":"r","type":"job","name":"R","properties":{"retries":3.0}}]}]}"#,
        )
        .expect("valid json");
        let with_integer: Value = serde_json::from_str(
            r#"{"schema_version":"1.0","project_name":"p","relationships":[],
                "components":[{"id":"a","name":"A","type":"backend","path":"/a","resources":[
                  {"id":"r","type":"job","name":"R","properties":{"retries":3}}]}]}"#,
        )
        .expect("valid json");

        let decimal = canonical_bytes(&plan(with_decimal));
        let integer = canonical_bytes(&plan(with_integer));
        assert!(String::from_utf8_lossy(&decimal).contains(r#""retries":3.0"#));
        assert_ne!(decimal, integer);
    }

    #[test]
    fn keys_sort_by_utf8_bytes_not_utf16_units() {
        // U+FF61 sorts before U+1F600 in UTF-8; UTF-16 ordering would flip them.
        let value = json!({"\u{1F600}": 1, "\u{FF61}": 2});
        let text = String::from_utf8(jcs_serialize(&value)).expect("utf-8");
        assert_eq!(text, "{\"\u{FF61}\":2,\"\u{1F600}\":1}");
    }

    #[test]
    fn strings_escape_control_characters() {
        let mut buf = Vec::new();
        write_string(&mut buf, "a\"b\\c\n\u{01}é");
        assert_eq!(
            String::from_utf8(buf).expect("utf-8"),
            "\"a\\\"b\\\\c\\n\\u0001é\""
        );
    }

    #[test]
    fn fingerprint_parse_requires_lowercase_hex() {
        let fp = "a".repeat(64);
        assert!(Fingerprint::parse(&fp).is_some());
        assert!(Fingerprint::parse(&"A".repeat(64)).is_none());
        assert!(Fingerprint::parse("abc").is_none());
    }
}
