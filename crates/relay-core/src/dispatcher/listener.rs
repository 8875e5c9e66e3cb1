//! Listener and middleware registrations

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Listener identifier, unique per dispatcher
pub type ListenerId = String;

/// Return value of a listener: an optional result, or an error that is isolated and reported
pub type ListenerResult = anyhow::Result<Option<Value>>;

pub(crate) type ListenerFn = Arc<dyn Fn(&Value, &str) -> ListenerResult + Send + Sync>;

pub(crate) type MiddlewareFn = Arc<dyn Fn(&str, &Value) -> MiddlewareAction + Send + Sync>;

/// Verdict of a middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareAction {
    /// Let the event through
    Continue,
    /// Stop the emission; no listener runs
    Block,
}

impl From<bool> for MiddlewareAction {
    fn from(allow: bool) -> Self {
        if allow {
            Self::Continue
        } else {
            Self::Block
        }
    }
}

/// A registered listener
pub(crate) struct ListenerRegistration {
    pub(crate) id: ListenerId,
    pub(crate) event: String,
    pub(crate) priority: i32,
    pub(crate) once: bool,
    callback: ListenerFn,
    fired: AtomicBool,
}

impl ListenerRegistration {
    pub(crate) fn new(
        id: ListenerId,
        event: String,
        priority: i32,
        once: bool,
        callback: ListenerFn,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            event,
            priority,
            once,
            callback,
            fired: AtomicBool::new(false),
        })
    }

    /// Claim the single invocation of a once-listener
    ///
    /// Always true for regular listeners.
    pub(crate) fn claim(&self) -> bool {
        !self.once || !self.fired.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn call(&self, payload: &Value, event: &str) -> ListenerResult {
        (self.callback)(payload, event)
    }

    pub(crate) fn info(&self) -> ListenerInfo {
        ListenerInfo {
            id: self.id.clone(),
            event: self.event.clone(),
            priority: self.priority,
            once: self.once,
        }
    }
}

/// Insert keeping descending priority; equal priorities keep registration order
pub(crate) fn insert_sorted(bucket: &mut Vec<Arc<ListenerRegistration>>, entry: Arc<ListenerRegistration>) {
    let position = bucket.partition_point(|existing| existing.priority >= entry.priority);
    bucket.insert(position, entry);
}

/// Read-only view of a registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerInfo {
    pub id: ListenerId,
    pub event: String,
    pub priority: i32,
    pub once: bool,
}
