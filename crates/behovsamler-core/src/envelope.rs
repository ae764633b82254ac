//! Record Envelope
//!
//! This module defines the `Envelope` type - the dynamic JSON view of a
//! record flowing over the log.
//!
//! ## What is an Envelope?
//! Every record on the topic is an open JSON object. The processor only
//! inspects four reserved fields and carries everything else through
//! verbatim:
//! - **@id**: correlation identifier binding a need to its solutions
//! - **@behov**: ordered list of required answer kinds
//! - **@løsning**: mapping from answer kind to an arbitrary payload
//! - **final**: set by this component on the records it emits itself
//!
//! ## Design Decisions
//! - The full tree is held as an opaque `serde_json::Value`; no schema
//!   binding, no typed payload structs.
//! - Accessors are lenient: a missing or wrongly-typed reserved field reads
//!   as absent. Only a payload that is not a JSON object is rejected at
//!   construction.
//! - Completion copies the tree and overwrites `@løsning` and `final`,
//!   preserving all other fields.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::{EnvelopeError, Result};

/// Correlation identifier field.
pub const FIELD_ID: &str = "@id";

/// Required answer kinds field.
pub const FIELD_NEED: &str = "@behov";

/// Partial answers field.
pub const FIELD_SOLUTION: &str = "@løsning";

/// Marker set on records emitted by this component.
pub const FIELD_FINAL: &str = "final";

/// A record envelope: an arbitrary JSON object with a handful of
/// recognised fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    tree: Value,
}

impl Envelope {
    /// Parse an envelope from raw bytes.
    ///
    /// Fails unless the payload parses as a JSON object.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let tree: Value = serde_json::from_slice(bytes)?;
        Self::from_value(tree)
    }

    /// Wrap an already-parsed JSON value.
    pub fn from_value(tree: Value) -> Result<Self> {
        if !tree.is_object() {
            return Err(EnvelopeError::Malformed(format!(
                "expected a JSON object, got {}",
                json_type_name(&tree)
            )));
        }
        Ok(Self { tree })
    }

    /// The correlation identifier, if present as a string.
    pub fn id(&self) -> Option<&str> {
        self.tree.get(FIELD_ID).and_then(Value::as_str)
    }

    /// The required answer kinds, in declaration order.
    ///
    /// Returns `None` when the field is absent or not an array. Non-string
    /// entries are skipped.
    pub fn need(&self) -> Option<Vec<String>> {
        let entries = self.tree.get(FIELD_NEED)?.as_array()?;
        Some(
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )
    }

    /// The partial answers carried by this record, if any.
    pub fn solutions(&self) -> Option<&Map<String, Value>> {
        self.tree.get(FIELD_SOLUTION).and_then(Value::as_object)
    }

    /// Whether this record was emitted by this component.
    ///
    /// Only a boolean `true` counts; any other value reads as not final.
    pub fn is_final(&self) -> bool {
        self.tree.get(FIELD_FINAL).and_then(Value::as_bool) == Some(true)
    }

    /// Access the underlying JSON tree.
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// Build the completion record: a copy of this envelope with
    /// `@løsning` replaced by `solutions` and `final` set to `true`.
    /// Every other field is preserved verbatim.
    pub fn with_completion(&self, solutions: &Map<String, Value>) -> Envelope {
        let mut tree = self.tree.clone();
        let obj = tree
            .as_object_mut()
            .expect("envelope invariant: tree is an object");
        obj.insert(FIELD_SOLUTION.to_string(), Value::Object(solutions.clone()));
        obj.insert(FIELD_FINAL.to_string(), Value::Bool(true));
        Envelope { tree }
    }

    /// Serialise the envelope back to JSON bytes.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let raw = serde_json::to_vec(&self.tree)
            .map_err(|e| EnvelopeError::Serialization(e.to_string()))?;
        Ok(Bytes::from(raw))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
