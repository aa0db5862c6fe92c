//! One API namespace: compiled method signatures and event names.
//!
//! An [`ApiBinding`] is built once per namespace from its schema and reused
//! across every context. Matching a call against a signature is positional:
//! expected nodes are walked left to right against the supplied values, with
//! optional slots resolving to null when their value is absent or does not
//! match. Every validation failure surfaces as the single generic
//! [`InvocationError::InvalidInvocation`]; the structured reason is only
//! logged.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::argument::{ArgumentSpec, RefMap};
use crate::error::{ConversionError, InvocationError, SchemaError};
use crate::schema::ApiSchema;
use crate::script::{ScriptCallback, ScriptValue};
use crate::value::Value;

/// The expected shape of one method call.
#[derive(Debug, Clone)]
pub(crate) struct MethodSignature {
    /// Expected arguments, excluding any trailing callback.
    params: Vec<ArgumentSpec>,
    /// Trailing callback slot, when the schema's last parameter is
    /// function-typed.
    callback: Option<CallbackSlot>,
}

#[derive(Debug, Clone)]
struct CallbackSlot {
    optional: bool,
}

/// A successfully matched invocation, ready for dispatch.
pub(crate) struct ParsedInvocation {
    pub(crate) arguments: Vec<Value>,
    pub(crate) callback: Option<Arc<dyn ScriptCallback>>,
}

impl std::fmt::Debug for ParsedInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedInvocation")
            .field("arguments", &self.arguments)
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

/// Compiled form of one API namespace's schema.
pub struct ApiBinding {
    api_name: String,
    methods: IndexMap<String, MethodSignature>,
    event_names: Vec<String>,
    refs: Arc<RefMap>,
}

impl ApiBinding {
    /// Compile `schema`, registering its shared types into `refs`.
    pub fn from_schema(schema: &ApiSchema, refs: Arc<RefMap>) -> Result<Self, SchemaError> {
        for type_schema in &schema.types {
            refs.register(
                type_schema.id.clone(),
                ArgumentSpec::from_schema(&type_schema.definition)?,
            );
        }

        let mut methods = IndexMap::new();
        for function in &schema.functions {
            let mut params = Vec::with_capacity(function.parameters.len());
            for parameter in &function.parameters {
                params.push(ArgumentSpec::from_schema(parameter)?);
            }

            // A trailing function-typed parameter is the callback slot.
            let trailing_callback = match params.last() {
                Some(last) if last.is_function() => Some(last.optional()),
                _ => None,
            };
            let callback = trailing_callback.map(|optional| {
                params.pop();
                CallbackSlot { optional }
            });

            methods.insert(
                function.name.clone(),
                MethodSignature { params, callback },
            );
        }

        Ok(Self {
            api_name: schema.name.clone(),
            methods,
            event_names: schema.events.iter().map(|e| e.name.clone()).collect(),
            refs,
        })
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    /// Method names declared by the schema, in declaration order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Event names declared by the schema.
    pub fn event_names(&self) -> &[String] {
        &self.event_names
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Fully-qualified name for availability checks and dispatch.
    pub fn full_name(&self, member: &str) -> String {
        format!("{}.{}", self.api_name, member)
    }

    /// Match `args` against `method`'s signature and convert them.
    ///
    /// On success the canonical argument list and the captured trailing
    /// callback (if any) are returned; dispatch and callback registration
    /// are the caller's concern, so nothing here has side effects beyond
    /// reading the inputs.
    pub(crate) fn parse_invocation(
        &self,
        method: &str,
        args: &[ScriptValue],
    ) -> Result<ParsedInvocation, InvocationError> {
        let signature = self
            .methods
            .get(method)
            .ok_or_else(|| InvocationError::NoSuchMethod(self.full_name(method)))?;

        let mut arguments = Vec::with_capacity(signature.params.len());
        let mut index = 0;

        for param in &signature.params {
            match args.get(index) {
                // Ran out of supplied values.
                None => {
                    if !param.optional() {
                        return Err(self.reject(method, &ConversionError::MissingRequired));
                    }
                    arguments.push(Value::Null);
                }
                // An explicit null fills an optional slot.
                Some(ScriptValue::Null) => {
                    if !param.optional() {
                        return Err(self.reject(method, &ConversionError::MissingRequired));
                    }
                    arguments.push(Value::Null);
                    index += 1;
                }
                Some(value) => match param.convert(value, &self.refs) {
                    Ok(converted) => {
                        arguments.push(converted);
                        index += 1;
                    }
                    // Host exceptions re-raise verbatim, never collapsed.
                    Err(ConversionError::Thrown(message)) => {
                        return Err(InvocationError::Thrown(message))
                    }
                    Err(error) => {
                        if !param.optional() {
                            return Err(self.reject(method, &error));
                        }
                        // The value may belong to a later slot: resolve this
                        // optional to null without consuming it.
                        arguments.push(Value::Null);
                    }
                },
            }
        }

        let mut callback = None;
        if let Some(slot) = &signature.callback {
            match args.get(index) {
                None => {
                    if !slot.optional {
                        return Err(self.reject(method, &ConversionError::MissingRequired));
                    }
                }
                Some(ScriptValue::Null) => {
                    if !slot.optional {
                        return Err(self.reject(method, &ConversionError::MissingRequired));
                    }
                    index += 1;
                }
                Some(ScriptValue::Function(handle)) => {
                    callback = Some(handle.clone());
                    index += 1;
                }
                Some(other) => {
                    return Err(self.reject(
                        method,
                        &ConversionError::UnexpectedType {
                            expected: "function",
                            found: other.kind_name(),
                        },
                    ));
                }
            }
        }

        // Anything left over invalidates the whole call.
        if index != args.len() {
            return Err(self.reject(
                method,
                &ConversionError::UnexpectedType {
                    expected: "end of arguments",
                    found: args[index].kind_name(),
                },
            ));
        }

        Ok(ParsedInvocation { arguments, callback })
    }

    /// Collapse a structured failure into the generic rejection, keeping
    /// the detail for internal diagnostics only.
    fn reject(&self, method: &str, reason: &ConversionError) -> InvocationError {
        debug!(
            method = %self.full_name(method),
            %reason,
            "argument validation failed"
        );
        InvocationError::InvalidInvocation
    }
}
