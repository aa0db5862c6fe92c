//! Compiled argument specs and the shared `$ref` map.
//!
//! An [`ArgumentSpec`] is the executable form of one schema node: it knows
//! how to validate a caller-supplied [`ScriptValue`] and convert it into a
//! canonical [`Value`]. Specs are compiled once per API at binding
//! construction time and are immutable afterwards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::error::{ConversionError, SchemaError};
use crate::schema::ParameterSchema;
use crate::script::ScriptValue;
use crate::value::Value;

/// The kind-specific half of a spec.
#[derive(Debug, Clone)]
pub enum SpecKind {
    Integer { minimum: Option<i64> },
    Double { minimum: Option<f64> },
    Boolean,
    /// An empty `enum_values` means any string is accepted.
    String { enum_values: Vec<String> },
    /// Declared properties in declaration order. Input fields outside this
    /// set are dropped: the schema is a projection, not a passthrough.
    Object { properties: IndexMap<String, ArgumentSpec> },
    List { items: Box<ArgumentSpec> },
    /// Matched structurally by the signature walk; never converted.
    Function,
    /// Generic deep copy of any serializable input.
    Any,
    /// Lazily resolved against the owning [`RefMap`].
    Ref { id: String },
}

/// The compiled description of one argument or property.
#[derive(Debug, Clone)]
pub struct ArgumentSpec {
    name: String,
    optional: bool,
    kind: SpecKind,
}

impl ArgumentSpec {
    /// Compile a raw schema node.
    pub fn from_schema(schema: &ParameterSchema) -> Result<Self, SchemaError> {
        let name = schema.display_name().to_string();

        if let Some(ref_id) = &schema.ref_id {
            return Ok(Self {
                name,
                optional: schema.optional,
                kind: SpecKind::Ref {
                    id: ref_id.clone(),
                },
            });
        }

        let kind_token = schema
            .kind
            .as_deref()
            .ok_or_else(|| SchemaError::MissingKind(name.clone()))?;

        let kind = match kind_token {
            "integer" => SpecKind::Integer {
                minimum: schema.minimum,
            },
            "number" => SpecKind::Double {
                minimum: schema.minimum.map(|m| m as f64),
            },
            "boolean" => SpecKind::Boolean,
            "string" => SpecKind::String {
                enum_values: schema.enum_values.clone(),
            },
            "object" => {
                let mut properties = IndexMap::new();
                for (prop_name, prop_schema) in &schema.properties {
                    let mut spec = ArgumentSpec::from_schema(prop_schema)?;
                    spec.name = prop_name.clone();
                    properties.insert(prop_name.clone(), spec);
                }
                SpecKind::Object { properties }
            }
            "array" => {
                let items = schema
                    .items
                    .as_deref()
                    .ok_or_else(|| SchemaError::MissingKind(format!("{}.items", name)))?;
                SpecKind::List {
                    items: Box::new(ArgumentSpec::from_schema(items)?),
                }
            }
            "function" => SpecKind::Function,
            "any" => SpecKind::Any,
            other => {
                return Err(SchemaError::UnknownKind {
                    name,
                    kind: other.to_string(),
                })
            }
        };

        Ok(Self {
            name,
            optional: schema.optional,
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn optional(&self) -> bool {
        self.optional
    }

    pub fn kind(&self) -> &SpecKind {
        &self.kind
    }

    /// Whether this spec describes a callable (a signature's callback slot).
    pub fn is_function(&self) -> bool {
        matches!(self.kind, SpecKind::Function)
    }

    /// Validate `value` and convert it into canonical form.
    ///
    /// Conversion either produces a complete canonical value or fails with
    /// the first error encountered; no partial state is left behind. A
    /// [`ConversionError::Thrown`] (hostile accessor read) always propagates
    /// unchanged.
    pub fn convert(
        &self,
        value: &ScriptValue,
        refs: &RefMap,
    ) -> Result<Value, ConversionError> {
        match value {
            // Reading the value raised in the host environment.
            ScriptValue::ThrowingGetter(message) => {
                return Err(ConversionError::Thrown(message.clone()))
            }
            ScriptValue::Null => {
                return if self.optional {
                    Ok(Value::Null)
                } else {
                    Err(ConversionError::MissingRequired)
                };
            }
            _ => {}
        }

        match &self.kind {
            SpecKind::Integer { minimum } => {
                let int = match value {
                    ScriptValue::Int(i) => *i,
                    // The host models all numbers as doubles; accept exact
                    // integral values only.
                    ScriptValue::Number(n) if is_integral(*n) => *n as i64,
                    _ => return Err(self.type_mismatch("integer", value)),
                };
                if let Some(minimum) = minimum {
                    if int < *minimum {
                        return Err(ConversionError::BelowMinimum {
                            value: int as f64,
                            minimum: *minimum,
                        });
                    }
                }
                Ok(Value::Int(int))
            }
            SpecKind::Double { minimum } => {
                let double = match value {
                    ScriptValue::Int(i) => *i as f64,
                    ScriptValue::Number(n) => *n,
                    _ => return Err(self.type_mismatch("number", value)),
                };
                if let Some(minimum) = minimum {
                    if double < *minimum {
                        return Err(ConversionError::BelowMinimum {
                            value: double,
                            minimum: *minimum as i64,
                        });
                    }
                }
                Ok(Value::Double(double))
            }
            SpecKind::Boolean => match value {
                ScriptValue::Bool(b) => Ok(Value::Bool(*b)),
                _ => Err(self.type_mismatch("boolean", value)),
            },
            SpecKind::String { enum_values } => {
                let string = match value {
                    ScriptValue::String(s) => s,
                    _ => return Err(self.type_mismatch("string", value)),
                };
                if !enum_values.is_empty() && !enum_values.contains(string) {
                    return Err(ConversionError::InvalidEnumValue(string.clone()));
                }
                Ok(Value::String(string.clone()))
            }
            SpecKind::Object { properties } => {
                let input = match value {
                    ScriptValue::Object(map) => map,
                    _ => return Err(self.type_mismatch("object", value)),
                };
                let mut result = IndexMap::new();
                for (prop_name, prop_spec) in properties {
                    match input.get(prop_name) {
                        None => {
                            if !prop_spec.optional {
                                return Err(ConversionError::MissingProperty(
                                    prop_name.clone(),
                                ));
                            }
                            // Absent optional properties are skipped, not
                            // nulled.
                        }
                        Some(prop_value) => {
                            let converted = prop_spec.convert(prop_value, refs)?;
                            result.insert(prop_name.clone(), converted);
                        }
                    }
                }
                Ok(Value::Object(result))
            }
            SpecKind::List { items } => {
                let input = match value {
                    ScriptValue::List(elements) => elements,
                    _ => return Err(self.type_mismatch("array", value)),
                };
                let mut result = Vec::with_capacity(input.len());
                for element in input {
                    result.push(items.convert(element, refs)?);
                }
                Ok(Value::List(result))
            }
            // Callables are captured by the signature walk, not converted.
            SpecKind::Function => Err(ConversionError::UnserializableValue),
            SpecKind::Any => copy_any(value),
            SpecKind::Ref { id } => refs.resolve(id).convert(value, refs),
        }
    }

    fn type_mismatch(&self, expected: &'static str, found: &ScriptValue) -> ConversionError {
        ConversionError::UnexpectedType {
            expected,
            found: found.kind_name(),
        }
    }
}

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64
}

/// Deep structural copy for `any`-typed nodes.
fn copy_any(value: &ScriptValue) -> Result<Value, ConversionError> {
    match value {
        ScriptValue::ThrowingGetter(message) => Err(ConversionError::Thrown(message.clone())),
        ScriptValue::Null => Ok(Value::Null),
        ScriptValue::Bool(b) => Ok(Value::Bool(*b)),
        ScriptValue::Int(i) => Ok(Value::Int(*i)),
        ScriptValue::Number(n) => Ok(Value::Double(*n)),
        ScriptValue::String(s) => Ok(Value::String(s.clone())),
        ScriptValue::List(elements) => {
            let mut result = Vec::with_capacity(elements.len());
            for element in elements {
                result.push(copy_any(element)?);
            }
            Ok(Value::List(result))
        }
        ScriptValue::Object(map) => {
            let mut result = IndexMap::new();
            for (key, element) in map {
                result.insert(key.clone(), copy_any(element)?);
            }
            Ok(Value::Object(result))
        }
        ScriptValue::Function(_) => Err(ConversionError::UnserializableValue),
    }
}

/// Shared registry of named specs, the targets of `$ref` nodes.
///
/// The map is append-only: entries are registered when an API's types load
/// and live for the lifetime of the owning binding system. Resolution is
/// lazy, so mutually recursive type definitions register in any order.
#[derive(Debug, Default)]
pub struct RefMap {
    specs: RwLock<HashMap<String, Arc<ArgumentSpec>>>,
}

impl RefMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spec under `id`, replacing any previous definition.
    pub fn register(&self, id: impl Into<String>, spec: ArgumentSpec) {
        self.specs
            .write()
            .unwrap()
            .insert(id.into(), Arc::new(spec));
    }

    /// Resolve a `$ref` id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never registered. An unresolvable reference means
    /// the static schema data is malformed, which is a build-time bug, not a
    /// runtime input problem.
    pub fn resolve(&self, id: &str) -> Arc<ArgumentSpec> {
        self.specs
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("unresolved schema reference '{}'", id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.specs.read().unwrap().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.specs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ApiSchema;
    use serde_json::json;

    fn spec(schema: serde_json::Value) -> ArgumentSpec {
        let parameter: ParameterSchema = serde_json::from_value(schema).unwrap();
        ArgumentSpec::from_schema(&parameter).unwrap()
    }

    fn convert(schema: serde_json::Value, value: ScriptValue) -> Result<Value, ConversionError> {
        spec(schema).convert(&value, &RefMap::new())
    }

    #[test]
    fn test_integer_conversion() {
        assert_eq!(
            convert(json!({"type": "integer"}), ScriptValue::Int(42)),
            Ok(Value::Int(42))
        );
        // Integral doubles are accepted; fractional ones are not.
        assert_eq!(
            convert(json!({"type": "integer"}), ScriptValue::Number(7.0)),
            Ok(Value::Int(7))
        );
        assert!(convert(json!({"type": "integer"}), ScriptValue::Number(7.5)).is_err());
        // Strings are never silently coerced.
        assert!(convert(json!({"type": "integer"}), ScriptValue::from("42")).is_err());
        assert!(convert(json!({"type": "integer"}), ScriptValue::Bool(true)).is_err());
    }

    #[test]
    fn test_integer_minimum() {
        let schema = json!({"type": "integer", "minimum": 15});
        assert_eq!(
            convert(schema.clone(), ScriptValue::Int(15)),
            Ok(Value::Int(15))
        );
        assert_eq!(
            convert(schema, ScriptValue::Int(14)),
            Err(ConversionError::BelowMinimum {
                value: 14.0,
                minimum: 15
            })
        );
    }

    #[test]
    fn test_double_conversion() {
        assert_eq!(
            convert(json!({"type": "number"}), ScriptValue::Number(1.5)),
            Ok(Value::Double(1.5))
        );
        assert_eq!(
            convert(json!({"type": "number"}), ScriptValue::Int(2)),
            Ok(Value::Double(2.0))
        );
        assert!(convert(json!({"type": "number"}), ScriptValue::from("1.5")).is_err());
        assert!(
            convert(json!({"type": "number", "minimum": 0}), ScriptValue::Number(-0.5)).is_err()
        );
    }

    #[test]
    fn test_string_enum_membership() {
        let schema = json!({"type": "string", "enum": ["alpha", "beta"]});
        assert_eq!(
            convert(schema.clone(), ScriptValue::from("alpha")),
            Ok(Value::from("alpha"))
        );
        assert_eq!(
            convert(schema.clone(), ScriptValue::from("beta")),
            Ok(Value::from("beta"))
        );
        assert_eq!(
            convert(schema.clone(), ScriptValue::from("gamma")),
            Err(ConversionError::InvalidEnumValue("gamma".to_string()))
        );
        assert!(convert(schema, ScriptValue::from("")).is_err());
    }

    #[test]
    fn test_required_null_fails_optional_succeeds() {
        assert_eq!(
            convert(json!({"type": "string"}), ScriptValue::Null),
            Err(ConversionError::MissingRequired)
        );
        assert_eq!(
            convert(json!({"type": "string", "optional": true}), ScriptValue::Null),
            Ok(Value::Null)
        );
    }

    #[test]
    fn test_object_projection() {
        let schema = json!({
            "type": "object",
            "properties": {
                "prop1": {"type": "string"},
                "prop2": {"type": "integer", "optional": true}
            }
        });

        let full = convert(schema.clone(), ScriptValue::from(json!({"prop1": "foo", "prop2": 2})))
            .unwrap();
        assert_eq!(full, Value::from(json!({"prop1": "foo", "prop2": 2})));

        // Absent optional property is skipped, not nulled.
        let partial =
            convert(schema.clone(), ScriptValue::from(json!({"prop1": "foo"}))).unwrap();
        assert_eq!(partial, Value::from(json!({"prop1": "foo"})));

        // Undeclared input fields are dropped.
        let extra = convert(
            schema.clone(),
            ScriptValue::from(json!({"prop1": "foo", "prop3": "x"})),
        )
        .unwrap();
        assert_eq!(extra, Value::from(json!({"prop1": "foo"})));

        // Missing required property fails.
        assert_eq!(
            convert(schema.clone(), ScriptValue::from(json!({"prop2": 2}))),
            Err(ConversionError::MissingProperty("prop1".to_string()))
        );

        assert!(convert(schema, ScriptValue::Int(1)).is_err());
    }

    #[test]
    fn test_list_conversion() {
        let schema = json!({"type": "array", "items": {"type": "integer"}});
        assert_eq!(
            convert(schema.clone(), ScriptValue::from(json!([1, 2, 3]))),
            Ok(Value::from(json!([1, 2, 3])))
        );
        // The first failing element's error propagates.
        assert_eq!(
            convert(schema.clone(), ScriptValue::from(json!([1, "x", 3]))),
            Err(ConversionError::UnexpectedType {
                expected: "integer",
                found: "string"
            })
        );
        assert!(convert(schema, ScriptValue::from("not a list")).is_err());
    }

    #[test]
    fn test_any_deep_copy() {
        let input = json!({"a": [1, 2.5, "x", null], "b": {"c": true}});
        assert_eq!(
            convert(json!({"type": "any"}), ScriptValue::from(input.clone())),
            Ok(Value::from(input))
        );

        // Functions cannot cross via `any`.
        let mut map = IndexMap::new();
        map.insert(
            "fn".to_string(),
            ScriptValue::function(|_: crate::script::ContextId, _: &[Value]| {}),
        );
        assert_eq!(
            convert(json!({"type": "any"}), ScriptValue::Object(map)),
            Err(ConversionError::UnserializableValue)
        );
    }

    #[test]
    fn test_throwing_getter_propagates() {
        let schema = json!({
            "type": "object",
            "properties": {"prop": {"type": "string", "optional": true}}
        });
        let mut map = IndexMap::new();
        map.insert(
            "prop".to_string(),
            ScriptValue::ThrowingGetter("getter blew up".to_string()),
        );
        // Even though the property is optional, the raised exception must
        // surface rather than being treated as a validation failure.
        assert_eq!(
            convert(schema, ScriptValue::Object(map)),
            Err(ConversionError::Thrown("getter blew up".to_string()))
        );

        let list_schema = json!({"type": "array", "items": {"type": "any"}});
        let input = ScriptValue::List(vec![
            ScriptValue::Int(1),
            ScriptValue::ThrowingGetter("index trap".to_string()),
        ]);
        assert_eq!(
            convert(list_schema, input),
            Err(ConversionError::Thrown("index trap".to_string()))
        );
    }

    #[test]
    fn test_ref_resolution() {
        let refs = RefMap::new();
        refs.register(
            "Point",
            spec(json!({
                "type": "object",
                "properties": {"x": {"type": "integer"}, "y": {"type": "integer"}}
            })),
        );

        let node = spec(json!({"$ref": "Point"}));
        assert_eq!(
            node.convert(&ScriptValue::from(json!({"x": 1, "y": 2})), &refs),
            Ok(Value::from(json!({"x": 1, "y": 2})))
        );
    }

    #[test]
    fn test_self_referential_type() {
        // A linked-list style type that refers to itself through an
        // optional property.
        let refs = RefMap::new();
        refs.register(
            "Node",
            spec(json!({
                "type": "object",
                "properties": {
                    "value": {"type": "integer"},
                    "next": {"$ref": "Node", "optional": true}
                }
            })),
        );

        let node = spec(json!({"$ref": "Node"}));
        let input = ScriptValue::from(json!({"value": 1, "next": {"value": 2}}));
        assert_eq!(
            node.convert(&input, &refs),
            Ok(Value::from(json!({"value": 1, "next": {"value": 2}})))
        );
    }

    #[test]
    #[should_panic(expected = "unresolved schema reference 'Missing'")]
    fn test_unresolved_ref_panics() {
        let node = spec(json!({"$ref": "Missing"}));
        let _ = node.convert(&ScriptValue::Int(1), &RefMap::new());
    }

    #[test]
    fn test_unknown_kind_rejected_at_compile() {
        let parameter: ParameterSchema =
            serde_json::from_value(json!({"name": "x", "type": "blob"})).unwrap();
        assert!(matches!(
            ArgumentSpec::from_schema(&parameter),
            Err(SchemaError::UnknownKind { .. })
        ));

        let missing: ParameterSchema = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert!(matches!(
            ArgumentSpec::from_schema(&missing),
            Err(SchemaError::MissingKind(_))
        ));
    }

    #[test]
    fn test_compile_full_api_types() {
        let api = ApiSchema::from_value(json!({
            "name": "test",
            "types": [
                {"id": "A", "type": "object", "properties": {"b": {"$ref": "B"}}},
                {"id": "B", "type": "string"}
            ]
        }))
        .unwrap();

        let refs = RefMap::new();
        for type_schema in &api.types {
            refs.register(
                type_schema.id.clone(),
                ArgumentSpec::from_schema(&type_schema.definition).unwrap(),
            );
        }
        assert_eq!(refs.len(), 2);
        assert!(refs.contains("A"));

        let a = refs.resolve("A");
        let input = ScriptValue::from(json!({"b": "hello"}));
        assert_eq!(a.convert(&input, &refs), Ok(Value::from(json!({"b": "hello"}))));
    }
}
