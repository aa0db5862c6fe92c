//! Correlation of in-flight asynchronous calls with their callbacks.
//!
//! When a validated method call carries a trailing callback, the callback is
//! parked here under a fresh opaque request id. The native side completes
//! the call later by id; a context being torn down abandons every request it
//! still owns.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::script::{ContextId, ScriptCallback};
use crate::value::Value;

/// Opaque identifier of one pending request.
pub type RequestId = String;

/// One parked callback awaiting its response.
pub(crate) struct PendingRequest {
    pub(crate) context: ContextId,
    pub(crate) callback: Arc<dyn ScriptCallback>,
}

/// Generates request ids and tracks pending callbacks per context.
#[derive(Default)]
pub struct RequestHandler {
    pending: HashMap<RequestId, PendingRequest>,
}

impl RequestHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `callback` for `context` and return the new request id.
    pub fn add_pending_request(
        &mut self,
        context: ContextId,
        callback: Arc<dyn ScriptCallback>,
    ) -> RequestId {
        let id = Uuid::new_v4().to_string();
        trace!(request_id = %id, %context, "adding pending request");
        self.pending.insert(id.clone(), PendingRequest { context, callback });
        id
    }

    /// Complete a request: remove it and invoke its callback with `args`
    /// inside the originating context.
    ///
    /// An unknown id is a silent no-op; the owning context may have been
    /// torn down between the call and the response. A given id therefore
    /// completes at most once.
    pub fn complete_request(&mut self, id: &str, args: &[Value]) {
        if let Some(request) = self.take_request(id) {
            request.callback.invoke(request.context, args);
        }
    }

    /// Remove and return a pending request, if present.
    ///
    /// Split out from [`complete_request`](Self::complete_request) so the
    /// facade can invoke the callback without holding its lock on this
    /// handler (a completing callback may immediately issue another call).
    pub(crate) fn take_request(&mut self, id: &str) -> Option<PendingRequest> {
        let request = self.pending.remove(id);
        if request.is_none() {
            debug!(request_id = %id, "ignoring completion of unknown request");
        }
        request
    }

    /// Abandon every pending request owned by `context` without invoking
    /// its callback.
    pub fn invalidate_context(&mut self, context: ContextId) {
        let before = self.pending.len();
        self.pending.retain(|_, request| request.context != context);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            debug!(%context, dropped, "abandoned pending requests for destroyed context");
        }
    }

    /// Number of requests still awaiting completion.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `id` is still pending.
    pub fn has_request(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn counting_callback() -> (Arc<dyn ScriptCallback>, Arc<Mutex<Vec<Vec<Value>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let callback: Arc<dyn ScriptCallback> = Arc::new(move |_: ContextId, args: &[Value]| {
            sink.lock().unwrap().push(args.to_vec());
        });
        (callback, calls)
    }

    #[test]
    fn test_complete_invokes_callback_once() {
        let mut handler = RequestHandler::new();
        let (callback, calls) = counting_callback();

        let id = handler.add_pending_request(ContextId::new(), callback);
        assert!(handler.has_request(&id));
        assert_eq!(handler.pending_count(), 1);

        handler.complete_request(&id, &[Value::Int(1), Value::from("ok")]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![vec![Value::Int(1), Value::from("ok")]]
        );
        assert_eq!(handler.pending_count(), 0);

        // Idempotent: the second completion is a no-op.
        handler.complete_request(&id, &[Value::Int(2)]);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_id_is_silent() {
        let mut handler = RequestHandler::new();
        handler.complete_request("no-such-id", &[]);
        assert_eq!(handler.pending_count(), 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let mut handler = RequestHandler::new();
        let (callback, _) = counting_callback();
        let context = ContextId::new();
        let a = handler.add_pending_request(context, callback.clone());
        let b = handler.add_pending_request(context, callback);
        assert_ne!(a, b);
        assert_eq!(handler.pending_count(), 2);
    }

    #[test]
    fn test_invalidate_context_abandons_without_invoking() {
        let mut handler = RequestHandler::new();
        let context_a = ContextId::new();
        let context_b = ContextId::new();
        let (callback_a, calls_a) = counting_callback();
        let (callback_b, calls_b) = counting_callback();

        let id_a = handler.add_pending_request(context_a, callback_a);
        let id_b = handler.add_pending_request(context_b, callback_b);

        handler.invalidate_context(context_a);
        assert!(!handler.has_request(&id_a));
        assert!(handler.has_request(&id_b));

        // The abandoned callback never fires, even on late completion.
        handler.complete_request(&id_a, &[Value::Int(1)]);
        assert!(calls_a.lock().unwrap().is_empty());

        handler.complete_request(&id_b, &[Value::Int(2)]);
        assert_eq!(*calls_b.lock().unwrap(), vec![vec![Value::Int(2)]]);
    }
}
