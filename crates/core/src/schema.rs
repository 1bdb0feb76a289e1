//! Output schema contract attached to a project.
//!
//! The orchestrator never interprets the schema; the automation capability
//! does. We only check that it is a well-formed, bounded JSON object so a
//! malformed contract is rejected at creation time rather than mid-run.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum serialized size of an output schema.
pub const MAX_SCHEMA_BYTES: usize = 64 * 1024;

/// Maximum nesting depth of an output schema.
pub const MAX_SCHEMA_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// OutputSchema
// ---------------------------------------------------------------------------

/// A validated, opaque output contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputSchema(serde_json::Value);

impl OutputSchema {
    /// Validate a client-supplied schema. `None` and `null` mean "no
    /// contract" and become an empty object.
    pub fn parse(value: Option<serde_json::Value>) -> Result<Self, CoreError> {
        let value = match value {
            None | Some(serde_json::Value::Null) => {
                return Ok(Self::empty());
            }
            Some(value) => value,
        };

        let serde_json::Value::Object(map) = &value else {
            return Err(CoreError::Validation(
                "output_schema must be a JSON object".to_string(),
            ));
        };

        if let Some(kind) = map.get("type") {
            if !kind.is_string() {
                return Err(CoreError::Validation(
                    "output_schema.type must be a string".to_string(),
                ));
            }
        }
        if let Some(properties) = map.get("properties") {
            if !properties.is_object() {
                return Err(CoreError::Validation(
                    "output_schema.properties must be an object".to_string(),
                ));
            }
        }

        let depth = json_depth(&value);
        if depth > MAX_SCHEMA_DEPTH {
            return Err(CoreError::Validation(format!(
                "output_schema nesting depth {depth} exceeds {MAX_SCHEMA_DEPTH}"
            )));
        }

        let size = value.to_string().len();
        if size > MAX_SCHEMA_BYTES {
            return Err(CoreError::Validation(format!(
                "output_schema is {size} bytes, limit is {MAX_SCHEMA_BYTES}"
            )));
        }

        Ok(Self(value))
    }

    pub fn empty() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl Default for OutputSchema {
    fn default() -> Self {
        Self::empty()
    }
}

fn json_depth(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        serde_json::Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
