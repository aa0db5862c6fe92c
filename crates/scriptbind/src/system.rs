//! The binding-system facade.
//!
//! A [`BindingSystem`] owns the shared ref map, the request handler, and the
//! event handler, and lazily compiles one [`ApiBinding`] per namespace from
//! a [`SchemaSource`]. It is the single entry point hosts use to create
//! context-bound API objects, deliver responses, fire events, and tear
//! contexts down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::argument::RefMap;
use crate::binding::ApiBinding;
use crate::error::{InvocationError, Result, SystemError};
use crate::events::{EventHandler, EventObject};
use crate::request::{RequestHandler, RequestId};
use crate::schema::ApiSchema;
use crate::script::{ContextId, ScriptValue};
use crate::value::Value;

/// The native side of the call boundary.
///
/// Receives every validated call with its canonical arguments. When
/// `request_id` is present, the handler (or whatever it forwards to) is
/// expected to eventually pass the id to [`BindingSystem::complete_request`].
pub trait MethodHandler: Send + Sync {
    fn on_call(
        &self,
        method: &str,
        arguments: Vec<Value>,
        context: ContextId,
        request_id: Option<RequestId>,
    );
}

impl<F> MethodHandler for F
where
    F: Fn(&str, Vec<Value>, ContextId, Option<RequestId>) + Send + Sync,
{
    fn on_call(
        &self,
        method: &str,
        arguments: Vec<Value>,
        context: ContextId,
        request_id: Option<RequestId>,
    ) {
        self(method, arguments, context, request_id)
    }
}

/// Per-context feature gating, consulted once per method or event when an
/// API instance is built.
pub trait AvailabilityChecker: Send + Sync {
    fn is_available(&self, full_name: &str) -> bool;
}

impl<F> AvailabilityChecker for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_available(&self, full_name: &str) -> bool {
        self(full_name)
    }
}

/// Everything is available; the common default.
pub struct AllowAll;

impl AvailabilityChecker for AllowAll {
    fn is_available(&self, _full_name: &str) -> bool {
        true
    }
}

/// Supplier of schema data, keyed by API name.
pub trait SchemaSource: Send + Sync {
    fn schema(&self, api_name: &str) -> Option<ApiSchema>;
}

/// In-memory schema source.
#[derive(Default)]
pub struct StaticSchemaSource {
    schemas: HashMap<String, ApiSchema>,
}

impl StaticSchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one API's schema, replacing any previous one of that name.
    pub fn add(&mut self, schema: ApiSchema) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    pub fn with(mut self, schema: ApiSchema) -> Self {
        self.add(schema);
        self
    }
}

impl SchemaSource for StaticSchemaSource {
    fn schema(&self, api_name: &str) -> Option<ApiSchema> {
        self.schemas.get(api_name).cloned()
    }
}

/// Owns all binding state and serves as the host's single facade.
pub struct BindingSystem {
    source: Box<dyn SchemaSource>,
    handler: Arc<dyn MethodHandler>,
    refs: Arc<RefMap>,
    requests: Arc<Mutex<RequestHandler>>,
    events: Arc<Mutex<EventHandler>>,
    bindings: Mutex<HashMap<String, Arc<ApiBinding>>>,
}

impl BindingSystem {
    pub fn new(
        source: impl SchemaSource + 'static,
        handler: impl MethodHandler + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            handler: Arc::new(handler),
            refs: Arc::new(RefMap::new()),
            requests: Arc::new(Mutex::new(RequestHandler::new())),
            events: Arc::new(Mutex::new(EventHandler::new())),
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Look up or lazily compile the binding for `api_name`.
    fn binding_for(&self, api_name: &str) -> Result<Arc<ApiBinding>> {
        let mut bindings = self.bindings.lock().unwrap();
        if let Some(binding) = bindings.get(api_name) {
            return Ok(binding.clone());
        }

        let schema = self
            .source
            .schema(api_name)
            .ok_or_else(|| SystemError::UnknownApi(api_name.to_string()))?;
        debug!(api = %api_name, "compiling API binding");
        let binding = Arc::new(ApiBinding::from_schema(&schema, self.refs.clone())?);
        bindings.insert(api_name.to_string(), binding.clone());
        Ok(binding)
    }

    /// Build a context-bound API object.
    ///
    /// Methods and events for which `availability` returns false on their
    /// fully-qualified name are absent from the instance; other contexts are
    /// unaffected. Create each API at most once per context: event objects
    /// are created here, and duplicating a (name, context) pair panics.
    pub fn create_api_instance(
        &self,
        api_name: &str,
        context: ContextId,
        availability: &dyn AvailabilityChecker,
    ) -> Result<ApiInstance> {
        let binding = self.binding_for(api_name)?;

        let methods: Vec<String> = binding
            .method_names()
            .filter(|name| availability.is_available(&binding.full_name(name)))
            .map(String::from)
            .collect();

        let mut events = IndexMap::new();
        {
            let mut event_handler = self.events.lock().unwrap();
            for event_name in binding.event_names() {
                if availability.is_available(&binding.full_name(event_name)) {
                    let instance = event_handler.create_event_instance(event_name.clone(), context);
                    events.insert(event_name.clone(), instance);
                }
            }
        }

        trace!(api = %api_name, %context, methods = methods.len(), events = events.len(),
               "created API instance");
        Ok(ApiInstance {
            binding,
            context,
            methods,
            events,
            requests: self.requests.clone(),
            handler: self.handler.clone(),
        })
    }

    /// Deliver a response for a pending request.
    ///
    /// Unknown ids are silently ignored; the originating context may already
    /// be gone. A given id is consumed at most once.
    pub fn complete_request(&self, request_id: &str, args: &[Value]) {
        // Take the entry first so the callback runs without the handler
        // lock held; a completing callback may issue another call.
        let request = self.requests.lock().unwrap().take_request(request_id);
        if let Some(request) = request {
            request.callback.invoke(request.context, args);
        }
    }

    /// Fire `event_name` for listeners registered in `context` only.
    pub fn fire_event_in_context(&self, event_name: &str, context: ContextId, args: &[Value]) {
        // Same lock discipline as completion: listeners run unlocked.
        let instance = self.events.lock().unwrap().instance(event_name, context);
        match instance {
            Some(instance) => instance.fire(args),
            None => trace!(event = %event_name, %context, "no listeners registered; fire ignored"),
        }
    }

    /// Hard-contract teardown hook: hosts MUST call this when a context is
    /// destroyed. Abandons the context's pending requests and releases its
    /// event listeners; nothing else will.
    pub fn on_context_destroyed(&self, context: ContextId) {
        debug!(%context, "context destroyed; purging binding state");
        self.requests.lock().unwrap().invalidate_context(context);
        self.events.lock().unwrap().invalidate_context(context);
    }

    /// Requests still awaiting completion, across all contexts.
    pub fn pending_request_count(&self) -> usize {
        self.requests.lock().unwrap().pending_count()
    }

    /// Live event objects, across all contexts.
    pub fn event_instance_count(&self) -> usize {
        self.events.lock().unwrap().instance_count()
    }
}

/// A context-bound view of one API namespace.
pub struct ApiInstance {
    binding: Arc<ApiBinding>,
    context: ContextId,
    methods: Vec<String>,
    events: IndexMap<String, Arc<EventObject>>,
    requests: Arc<Mutex<RequestHandler>>,
    handler: Arc<dyn MethodHandler>,
}

impl std::fmt::Debug for ApiInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiInstance")
            .field("context", &self.context)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

impl ApiInstance {
    pub fn api_name(&self) -> &str {
        self.binding.api_name()
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Methods exposed to this context, in declaration order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(String::as_str)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m == name)
    }

    /// Event objects exposed to this context.
    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    pub fn event(&self, name: &str) -> Option<&Arc<EventObject>> {
        self.events.get(name)
    }

    /// Invoke `method` with caller-supplied arguments.
    ///
    /// On a successful match the call is forwarded to the method handler,
    /// with a fresh request id when a trailing callback was captured.
    /// Validation failures reject the call before any native side effect.
    pub fn call(&self, method: &str, args: &[ScriptValue]) -> std::result::Result<(), InvocationError> {
        if !self.has_method(method) {
            return Err(InvocationError::NoSuchMethod(self.binding.full_name(method)));
        }

        let parsed = self.binding.parse_invocation(method, args)?;
        let request_id = parsed.callback.map(|callback| {
            self.requests
                .lock()
                .unwrap()
                .add_pending_request(self.context, callback)
        });

        self.handler.on_call(
            &self.binding.full_name(method),
            parsed.arguments,
            self.context,
            request_id,
        );
        Ok(())
    }
}
