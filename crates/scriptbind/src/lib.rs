//! Schema-driven bindings between an embedded scripting environment and
//! native host APIs.
//!
//! The host describes each API namespace as data: a list of functions with
//! typed parameters, optional shared type definitions, and event names.
//! This crate compiles those descriptions and, per execution context,
//! exposes callable entry points that validate and convert caller-supplied
//! dynamic values, dispatch to a native handler, correlate asynchronous
//! responses back to their callbacks, and fan events out to per-context
//! listeners.
//!
//! # Quick start
//!
//! ```
//! use scriptbind::{
//!     AllowAll, ApiSchema, BindingSystem, ContextId, ScriptValue,
//!     StaticSchemaSource, Value,
//! };
//!
//! let schema = ApiSchema::from_json_str(r#"{
//!     "name": "greeter",
//!     "functions": [{
//!         "name": "greet",
//!         "parameters": [{"name": "who", "type": "string"}]
//!     }]
//! }"#).unwrap();
//!
//! let system = BindingSystem::new(
//!     StaticSchemaSource::new().with(schema),
//!     |method: &str, args: Vec<Value>, _ctx: ContextId, _req: Option<String>| {
//!         assert_eq!(method, "greeter.greet");
//!         assert_eq!(args, vec![Value::from("world")]);
//!     },
//! );
//!
//! let context = ContextId::new();
//! let greeter = system.create_api_instance("greeter", context, &AllowAll).unwrap();
//! greeter.call("greet", &[ScriptValue::from("world")]).unwrap();
//! system.on_context_destroyed(context);
//! ```
//!
//! All operations are synchronous; "asynchrony" only means that a call and
//! its completion happen on different turns of the host's own event loop.
//! Tearing a context down via [`BindingSystem::on_context_destroyed`] is a
//! hard contract: it is the only thing that releases the context's pending
//! callbacks and event listeners.

pub mod argument;
pub mod binding;
pub mod error;
pub mod events;
pub mod request;
pub mod schema;
pub mod script;
pub mod system;
pub mod value;

pub use argument::{ArgumentSpec, RefMap, SpecKind};
pub use binding::ApiBinding;
pub use error::{ConversionError, InvocationError, Result, SchemaError, SystemError};
pub use events::{EventHandler, EventObject};
pub use request::{RequestHandler, RequestId};
pub use schema::{ApiSchema, EventSchema, FunctionSchema, ParameterSchema, TypeSchema};
pub use script::{ContextId, ScriptCallback, ScriptValue};
pub use system::{
    AllowAll, ApiInstance, AvailabilityChecker, BindingSystem, MethodHandler, SchemaSource,
    StaticSchemaSource,
};
pub use value::Value;
