//! Static schema data describing one API namespace.
//!
//! Schemas arrive as already-parsed JSON: a function list, an optional list
//! of shared type definitions, and an optional event list. This module only
//! models that input shape; [`crate::argument`] compiles it into executable
//! argument specs.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::SchemaError;

/// The full schema for one API namespace.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSchema {
    /// Namespace name, e.g. `"storage"`.
    pub name: String,
    /// Callable methods exposed by the namespace.
    #[serde(default)]
    pub functions: Vec<FunctionSchema>,
    /// Shared type definitions, registered for `$ref` resolution.
    #[serde(default)]
    pub types: Vec<TypeSchema>,
    /// Events exposed by the namespace.
    #[serde(default)]
    pub events: Vec<EventSchema>,
}

impl ApiSchema {
    /// Build from pre-parsed JSON.
    pub fn from_value(value: serde_json::Value) -> Result<Self, SchemaError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Build from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// One callable method: a name plus its expected parameters in order.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
}

/// A shared type definition, referenced from parameters via `$ref`.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeSchema {
    /// Identifier other schema nodes use to reference this type.
    pub id: String,
    #[serde(flatten)]
    pub definition: ParameterSchema,
}

/// One event exposed by the namespace.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSchema {
    pub name: String,
}

/// The raw description of one schema node.
///
/// Exactly one of `kind` and `ref_id` is expected; the type-specific fields
/// (`minimum`, `enum`, `properties`, `items`) only apply to the kinds that
/// use them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParameterSchema {
    /// Argument or property name. Absent for shared type definitions and
    /// list element nodes.
    pub name: Option<String>,
    /// Type token: `integer`, `number`, `boolean`, `string`, `object`,
    /// `array`, `function`, or `any`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Reference to a shared type definition, instead of an inline type.
    #[serde(rename = "$ref")]
    pub ref_id: Option<String>,
    /// Whether the value may be omitted (resolving to canonical null).
    pub optional: bool,
    /// Lower bound for numeric kinds.
    pub minimum: Option<i64>,
    /// Accepted members for string kinds; empty means unrestricted.
    #[serde(rename = "enum")]
    pub enum_values: Vec<String>,
    /// Declared properties for object kinds, in declaration order.
    pub properties: IndexMap<String, ParameterSchema>,
    /// Element node for array kinds.
    pub items: Option<Box<ParameterSchema>>,
}

impl ParameterSchema {
    /// The name used in diagnostics when the node is anonymous.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}
