//! Violations and their deterministic identifiers.
//!
//! Algorithm:
//! 1. Build the identity key `{rule_id, offending_node, detail}` where
//!    `detail` is the violation metadata
//! 2. Serialize via JCS
//! 3. violation_id = "v1_" || base32hex_lower(SHA256(keyBytes))
//!
//! The id is written back into the metadata under `violation_id`, so two
//! engines that agree on a failure agree on its id.

use crate::canonical::jcs_serialize;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const VIOLATION_ID_KEY: &str = "violation_id";

/// A single rule failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub message: String,
    /// Component id, resource id, or a composite path such as
    /// `relationships[2]`.
    pub offending_node: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Violation {
    /// Build a violation and stamp its deterministic id.
    pub fn new(
        rule_id: impl Into<String>,
        message: impl Into<String>,
        offending_node: impl Into<String>,
        detail: BTreeMap<String, Value>,
    ) -> Self {
        let rule_id = rule_id.into();
        let offending_node = offending_node.into();
        let id = compute_violation_id(&rule_id, &offending_node, &detail);

        let mut metadata = detail;
        metadata.insert(VIOLATION_ID_KEY.to_string(), Value::String(id));

        Self {
            rule_id,
            message: message.into(),
            offending_node,
            metadata,
        }
    }

    pub fn violation_id(&self) -> Option<&str> {
        self.metadata.get(VIOLATION_ID_KEY).and_then(Value::as_str)
    }

    /// Whether this is an `ambiguous_<RULE>` outcome.
    pub fn is_ambiguous(&self) -> bool {
        self.rule_id.starts_with(AMBIGUOUS_PREFIX)
    }
}

pub const AMBIGUOUS_PREFIX: &str = "ambiguous_";

/// Compute a violation id from its identity fields.
///
/// `detail` must not contain `violation_id` itself; if it does, that entry is
/// ignored.
pub fn compute_violation_id(
    rule_id: &str,
    offending_node: &str,
    detail: &BTreeMap<String, Value>,
) -> String {
    let detail: Map<String, Value> = detail
        .iter()
        .filter(|(k, _)| k.as_str() != VIOLATION_ID_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut key = Map::new();
    key.insert("rule_id".to_string(), Value::String(rule_id.to_string()));
    key.insert(
        "offending_node".to_string(),
        Value::String(offending_node.to_string()),
    );
    key.insert("detail".to_string(), Value::Object(detail));

    let hash = Sha256::digest(jcs_serialize(&Value::Object(key)));
    format!("v1_{}", base32hex_lower_no_pad(&hash))
}

/// RFC 4648 base32hex encoding, lowercase, without padding.
fn base32hex_lower_no_pad(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuv";

    let mut result = String::with_capacity(data.len() * 8 / 5 + 1);
    let mut bits: u64 = 0;
    let mut num_bits: u32 = 0;

    for &byte in data {
        bits = (bits << 8) | u64::from(byte);
        num_bits += 8;

        while num_bits >= 5 {
            num_bits -= 5;
            let idx = ((bits >> num_bits) & 0x1f) as usize;
            result.push(ALPHABET[idx] as char);
        }
    }

    if num_bits > 0 {
        let idx = ((bits << (5 - num_bits)) & 0x1f) as usize;
        result.push(ALPHABET[idx] as char);
    }

    result
}

/// Small builder for violation metadata.
#[derive(Debug, Default)]
pub(crate) struct Detail(BTreeMap<String, Value>);

impl Detail {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub(crate) fn into_map(self) -> BTreeMap<String, Value> {
        self.0
    }
}
