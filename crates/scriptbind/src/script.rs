//! The host boundary: script-side values, callbacks, and contexts.
//!
//! The scripting engine itself is an external collaborator. What crosses the
//! boundary into this layer is a [`ScriptValue`] tree (the engine's
//! dynamically-typed view of caller-supplied arguments) plus opaque
//! [`ScriptCallback`] handles for callable values. Results flow back the
//! other way as canonical [`Value`]s handed to a callback inside its
//! originating [`ContextId`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

/// Opaque identity of one isolated execution context (a script realm).
///
/// All per-context state (pending requests, event listener registries) is
/// keyed by this id; the id itself keeps nothing alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Mint a fresh context identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A callable value owned by the scripting environment.
///
/// Identity matters: listener deduplication and removal compare handles by
/// `Arc` pointer identity, mirroring function-object identity in the engine.
pub trait ScriptCallback: Send + Sync {
    /// Invoke the callable inside `context` with already-converted arguments.
    fn invoke(&self, context: ContextId, args: &[Value]);
}

impl<F> ScriptCallback for F
where
    F: Fn(ContextId, &[Value]) + Send + Sync,
{
    fn invoke(&self, context: ContextId, args: &[Value]) {
        self(context, args)
    }
}

/// A dynamically-typed value as supplied by the scripting environment.
///
/// `ThrowingGetter` stands in for a property or element backed by a hostile
/// accessor: any attempt to read it during conversion raises a
/// host-environment exception that must propagate unwrapped.
#[derive(Clone)]
pub enum ScriptValue {
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    String(String),
    List(Vec<ScriptValue>),
    Object(IndexMap<String, ScriptValue>),
    Function(Arc<dyn ScriptCallback>),
    ThrowingGetter(String),
}

impl ScriptValue {
    /// Wrap a closure or other callable as a function value.
    pub fn function(callback: impl ScriptCallback + 'static) -> Self {
        ScriptValue::Function(Arc::new(callback))
    }

    /// The kind name used in conversion diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Int(_) | ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::List(_) => "array",
            ScriptValue::Object(_) => "object",
            ScriptValue::Function(_) => "function",
            ScriptValue::ThrowingGetter(_) => "accessor",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScriptValue::Null)
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Null => write!(f, "Null"),
            ScriptValue::Bool(b) => write!(f, "Bool({})", b),
            ScriptValue::Int(i) => write!(f, "Int({})", i),
            ScriptValue::Number(n) => write!(f, "Number({})", n),
            ScriptValue::String(s) => write!(f, "String({:?})", s),
            ScriptValue::List(items) => f.debug_tuple("List").field(items).finish(),
            ScriptValue::Object(map) => f.debug_tuple("Object").field(map).finish(),
            ScriptValue::Function(_) => write!(f, "Function(<callable>)"),
            ScriptValue::ThrowingGetter(msg) => write!(f, "ThrowingGetter({:?})", msg),
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

impl From<i64> for ScriptValue {
    fn from(i: i64) -> Self {
        ScriptValue::Int(i)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(s)
    }
}

impl From<Vec<ScriptValue>> for ScriptValue {
    fn from(items: Vec<ScriptValue>) -> Self {
        ScriptValue::List(items)
    }
}

/// Convenience for building test and fixture inputs from JSON literals.
impl From<serde_json::Value> for ScriptValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => ScriptValue::Null,
            serde_json::Value::Bool(b) => ScriptValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ScriptValue::Int(i)
                } else {
                    ScriptValue::Number(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => ScriptValue::String(s),
            serde_json::Value::Array(items) => {
                ScriptValue::List(items.into_iter().map(ScriptValue::from).collect())
            }
            serde_json::Value::Object(map) => ScriptValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, ScriptValue::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_context_ids_are_unique() {
        assert_ne!(ContextId::new(), ContextId::new());
    }

    #[test]
    fn test_from_json_literal() {
        let value = ScriptValue::from(json!({"a": 1, "b": [true, "x"]}));
        match value {
            ScriptValue::Object(map) => {
                assert!(matches!(map["a"], ScriptValue::Int(1)));
                assert!(matches!(&map["b"], ScriptValue::List(items) if items.len() == 2));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_closure_callback_invokes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback = ScriptValue::function(move |_ctx, args: &[Value]| {
            sink.lock().unwrap().extend_from_slice(args);
        });

        let context = ContextId::new();
        match callback {
            ScriptValue::Function(f) => f.invoke(context, &[Value::Int(1), Value::from("x")]),
            _ => unreachable!(),
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Value::Int(1), Value::from("x")]
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ScriptValue::Null.kind_name(), "null");
        assert_eq!(ScriptValue::Int(1).kind_name(), "number");
        assert_eq!(ScriptValue::Number(1.5).kind_name(), "number");
        assert_eq!(
            ScriptValue::ThrowingGetter("err".to_string()).kind_name(),
            "accessor"
        );
    }
}
