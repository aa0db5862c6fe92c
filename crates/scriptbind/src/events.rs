//! Per-context event objects and the registry that owns them.
//!
//! Each (event name, context) pair gets exactly one [`EventObject`], the
//! listener registry script code sees as `addListener` / `removeListener` /
//! `hasListener` / `hasListeners`. Firing an event touches one context only;
//! tearing a context down clears every listener list it owns before the
//! entries are dropped, so a listener closure that captured its own event
//! object cannot keep the context alive through a reference cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::script::{ContextId, ScriptCallback};
use crate::value::Value;

/// The listener registry for one (event name, context) pair.
pub struct EventObject {
    name: String,
    context: ContextId,
    listeners: Mutex<Vec<Arc<dyn ScriptCallback>>>,
}

impl EventObject {
    fn new(name: impl Into<String>, context: ContextId) -> Self {
        Self {
            name: name.into(),
            context,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Register a listener. Adding a handle already present (same pointer
    /// identity) is a no-op.
    pub fn add_listener(&self, listener: Arc<dyn ScriptCallback>) {
        let mut listeners = self.listeners.lock().unwrap();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Remove a listener by identity; absent handles are ignored.
    pub fn remove_listener(&self, listener: &Arc<dyn ScriptCallback>) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn has_listener(&self, listener: &Arc<dyn ScriptCallback>) -> bool {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .any(|l| Arc::ptr_eq(l, listener))
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.lock().unwrap().is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Invoke every currently-registered listener with the same converted
    /// arguments, in registration order.
    ///
    /// The set iterated is a snapshot taken at fire time: a listener adding
    /// or removing listeners affects later fires, not this one.
    pub fn fire(&self, args: &[Value]) {
        let snapshot: Vec<Arc<dyn ScriptCallback>> = self.listeners.lock().unwrap().clone();
        trace!(event = %self.name, context = %self.context, listeners = snapshot.len(), "firing event");
        for listener in snapshot {
            listener.invoke(self.context, args);
        }
    }

    fn clear_listeners(&self) {
        self.listeners.lock().unwrap().clear();
    }
}

/// Owns every event object, keyed by (event name, context).
#[derive(Default)]
pub struct EventHandler {
    instances: HashMap<(String, ContextId), Arc<EventObject>>,
}

impl EventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the event object for a (name, context) pair.
    ///
    /// # Panics
    ///
    /// Panics if the pair already has an instance; callers create each
    /// event at most once per context.
    pub fn create_event_instance(
        &mut self,
        name: impl Into<String>,
        context: ContextId,
    ) -> Arc<EventObject> {
        let name = name.into();
        let key = (name.clone(), context);
        assert!(
            !self.instances.contains_key(&key),
            "event instance for '{}' already exists in this context",
            name
        );
        let instance = Arc::new(EventObject::new(name, context));
        self.instances.insert(key, instance.clone());
        instance
    }

    /// Look up the event object for a pair, if one exists.
    pub fn instance(&self, name: &str, context: ContextId) -> Option<Arc<EventObject>> {
        self.instances.get(&(name.to_string(), context)).cloned()
    }

    /// Fire `name` in `context`. Unknown pairs are a no-op.
    pub fn fire_event_in_context(&self, name: &str, context: ContextId, args: &[Value]) {
        match self.instance(name, context) {
            Some(instance) => instance.fire(args),
            None => trace!(event = %name, %context, "no event instance; fire ignored"),
        }
    }

    /// Drop every event object owned by `context`.
    ///
    /// Listener lists are cleared before the entries go away; a listener
    /// closure holding its own event object would otherwise pin the
    /// registry entry's contents forever.
    pub fn invalidate_context(&mut self, context: ContextId) {
        let keys: Vec<(String, ContextId)> = self
            .instances
            .keys()
            .filter(|(_, c)| *c == context)
            .cloned()
            .collect();
        if !keys.is_empty() {
            debug!(%context, events = keys.len(), "releasing event instances for destroyed context");
        }
        for key in keys {
            if let Some(instance) = self.instances.remove(&key) {
                instance.clear_listeners();
            }
        }
    }

    /// Number of live event objects across all contexts.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::Weak;

    fn listener(log: &Arc<StdMutex<Vec<String>>>, tag: &str) -> Arc<dyn ScriptCallback> {
        let log = log.clone();
        let tag = tag.to_string();
        Arc::new(move |_: ContextId, _: &[Value]| {
            log.lock().unwrap().push(tag.clone());
        })
    }

    #[test]
    fn test_add_remove_has() {
        let mut handler = EventHandler::new();
        let context = ContextId::new();
        let event = handler.create_event_instance("onChanged", context);
        let log = Arc::new(StdMutex::new(Vec::new()));
        let first = listener(&log, "first");

        assert!(!event.has_listeners());
        event.add_listener(first.clone());
        assert!(event.has_listener(&first));
        assert!(event.has_listeners());
        assert_eq!(event.listener_count(), 1);

        // Re-adding the same handle is a no-op.
        event.add_listener(first.clone());
        assert_eq!(event.listener_count(), 1);

        event.remove_listener(&first);
        assert!(!event.has_listener(&first));
        assert!(!event.has_listeners());
    }

    #[test]
    fn test_fire_in_registration_order() {
        let mut handler = EventHandler::new();
        let context = ContextId::new();
        let event = handler.create_event_instance("onChanged", context);
        let log = Arc::new(StdMutex::new(Vec::new()));

        event.add_listener(listener(&log, "first"));
        event.add_listener(listener(&log, "second"));
        handler.fire_event_in_context("onChanged", context, &[Value::Int(1)]);

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_fire_unknown_event_is_noop() {
        let handler = EventHandler::new();
        handler.fire_event_in_context("onNothing", ContextId::new(), &[]);
    }

    #[test]
    fn test_context_isolation() {
        let mut handler = EventHandler::new();
        let context_a = ContextId::new();
        let context_b = ContextId::new();
        let event_a = handler.create_event_instance("onChanged", context_a);
        handler.create_event_instance("onChanged", context_b);

        let log = Arc::new(StdMutex::new(Vec::new()));
        event_a.add_listener(listener(&log, "a"));

        handler.fire_event_in_context("onChanged", context_b, &[]);
        assert!(log.lock().unwrap().is_empty());

        handler.fire_event_in_context("onChanged", context_a, &[]);
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn test_duplicate_instance_panics() {
        let mut handler = EventHandler::new();
        let context = ContextId::new();
        handler.create_event_instance("onChanged", context);
        handler.create_event_instance("onChanged", context);
    }

    #[test]
    fn test_mutation_during_fire_uses_snapshot() {
        let mut handler = EventHandler::new();
        let context = ContextId::new();
        let event = handler.create_event_instance("onChanged", context);
        let log = Arc::new(StdMutex::new(Vec::new()));

        // The first listener registers a new listener while firing; the new
        // one must not run during the current pass.
        let event_handle = event.clone();
        let late = listener(&log, "late");
        let log_clone = log.clone();
        let adder: Arc<dyn ScriptCallback> = {
            let late = late.clone();
            Arc::new(move |_: ContextId, _: &[Value]| {
                log_clone.lock().unwrap().push("adder".to_string());
                event_handle.add_listener(late.clone());
            })
        };
        event.add_listener(adder);

        event.fire(&[]);
        assert_eq!(*log.lock().unwrap(), vec!["adder"]);

        event.fire(&[]);
        assert_eq!(*log.lock().unwrap(), vec!["adder", "adder", "late"]);
    }

    #[test]
    fn test_teardown_breaks_listener_cycle() {
        let mut handler = EventHandler::new();
        let context = ContextId::new();
        let event = handler.create_event_instance("onChanged", context);
        let weak: Weak<EventObject> = Arc::downgrade(&event);

        // Listener closure captures the event object it is registered on.
        let cycle_handle = event.clone();
        event.add_listener(Arc::new(move |_: ContextId, _: &[Value]| {
            let _ = cycle_handle.has_listeners();
        }));

        drop(event);
        assert!(weak.upgrade().is_some());

        handler.invalidate_context(context);
        assert_eq!(handler.instance_count(), 0);
        assert!(
            weak.upgrade().is_none(),
            "listener cycle kept the event object alive after teardown"
        );
    }
}
