//! Event dispatcher
//!
//! A prioritized listener registry with a middleware pipeline, acknowledgement
//! correlation and forwarding between dispatchers.
//!
//! Emission is synchronous: listeners run to completion on the caller's thread,
//! iterating over a snapshot of the registry taken before the first listener runs.
//! Only the deadlines of [`EventDispatcher::wait_for`] and
//! [`EventDispatcher::emit_with_ack`] are scheduled on the tokio runtime.

use super::ack::{PendingAcknowledgement, Waiter};
use super::error::DispatchError;
use super::listener::{
    insert_sorted, ListenerFn, ListenerId, ListenerInfo, ListenerRegistration, ListenerResult,
    MiddlewareAction, MiddlewareFn,
};
use super::{ACK_ID_KEY, LISTENER_ERROR_EVENT, WILDCARD_EVENT};
use crate::events::{ClientEvent, Event};
use crate::promise::Promise;
use parking_lot::Mutex;
use relay_common::DispatcherSettings;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use uuid::Uuid;

/// Forwarding rule towards another dispatcher
struct Pipe {
    target: Weak<Inner>,
    target_id: Uuid,
    /// `None` forwards every event
    events: Option<HashSet<String>>,
}

impl Pipe {
    fn forwards(&self, event: &str) -> bool {
        self.events
            .as_ref()
            .map_or(true, |events| events.contains(event))
    }
}

struct Registry {
    listeners: HashMap<String, Vec<Arc<ListenerRegistration>>>,
    listener_count: usize,
    max_listeners: usize,
    global_middlewares: Vec<MiddlewareFn>,
    event_middlewares: HashMap<String, Vec<MiddlewareFn>>,
    pipes: Vec<Pipe>,
}

impl Registry {
    /// Remove one registration; frees the bucket when it becomes empty
    fn remove(&mut self, event: &str, listener_id: &str) -> bool {
        let Some(bucket) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|l| l.id != listener_id);
        let removed = before - bucket.len();
        if bucket.is_empty() {
            self.listeners.remove(event);
        }
        self.listener_count -= removed;
        removed > 0
    }

    fn remove_bucket(&mut self, event: &str) -> usize {
        let removed = self.listeners.remove(event).map_or(0, |bucket| bucket.len());
        self.listener_count -= removed;
        removed
    }
}

/// Everything an emission needs, copied out of the registry
struct Snapshot {
    middlewares: Vec<MiddlewareFn>,
    listeners: Vec<Arc<ListenerRegistration>>,
    wildcards: Vec<Arc<ListenerRegistration>>,
    pipes: Vec<(Arc<Inner>, Uuid)>,
}

struct Inner {
    id: Uuid,
    default_timeout: Duration,
    next_listener: AtomicU64,
    next_waiter: AtomicU64,
    registry: Mutex<Registry>,
    pending_acks: Mutex<HashMap<String, PendingAcknowledgement>>,
    waiters: Mutex<HashMap<u64, Waiter>>,
}

impl Inner {
    fn snapshot(&self, event: &str) -> Snapshot {
        let registry = self.registry.lock();

        let mut middlewares = registry.global_middlewares.clone();
        if let Some(scoped) = registry.event_middlewares.get(event) {
            middlewares.extend(scoped.iter().cloned());
        }

        let listeners = registry.listeners.get(event).cloned().unwrap_or_default();
        let wildcards = if event == WILDCARD_EVENT {
            Vec::new()
        } else {
            registry
                .listeners
                .get(WILDCARD_EVENT)
                .cloned()
                .unwrap_or_default()
        };

        let pipes = registry
            .pipes
            .iter()
            .filter(|pipe| pipe.forwards(event))
            .filter_map(|pipe| pipe.target.upgrade().map(|t| (t, pipe.target_id)))
            .collect();

        Snapshot {
            middlewares,
            listeners,
            wildcards,
            pipes,
        }
    }

    /// Emit along a forwarding route
    ///
    /// `route` holds the ids of the dispatchers the event already passed through.
    fn emit_routed(&self, event: &str, payload: &Value, route: &[Uuid]) -> Vec<Value> {
        let snapshot = self.snapshot(event);

        if snapshot
            .middlewares
            .iter()
            .any(|middleware| middleware(event, payload) == MiddlewareAction::Block)
        {
            tracing::debug!(event, dispatcher = %self.id, "Event blocked by middleware");
            return Vec::new();
        }

        let mut results = Vec::new();
        for listener in snapshot.listeners.iter().chain(snapshot.wildcards.iter()) {
            if !listener.claim() {
                continue;
            }
            if listener.once {
                self.registry.lock().remove(&listener.event, &listener.id);
            }

            match listener.call(payload, event) {
                Ok(Some(value)) if !value.is_null() => results.push(value),
                Ok(_) => {}
                Err(err) => self.report_listener_error(event, &listener.id, &err),
            }
        }

        if !snapshot.pipes.is_empty() {
            let mut next_route = route.to_vec();
            next_route.push(self.id);
            for (target, target_id) in snapshot.pipes {
                if next_route.contains(&target_id) {
                    continue;
                }
                tracing::trace!(event, from = %self.id, to = %target_id, "Forwarding event");
                target.emit_routed(event, payload, &next_route);
            }
        }

        results
    }

    fn report_listener_error(&self, event: &str, listener_id: &str, err: &anyhow::Error) {
        tracing::warn!(event, listener_id, error = %err, "Listener failed");

        // Failures while reporting a failure are only logged
        if event == LISTENER_ERROR_EVENT {
            return;
        }
        self.emit_routed(
            LISTENER_ERROR_EVENT,
            &json!({
                "event": event,
                "listenerId": listener_id,
                "error": err.to_string(),
            }),
            &[],
        );
    }

    fn register(
        &self,
        event: &str,
        callback: ListenerFn,
        priority: i32,
        once: bool,
    ) -> Result<ListenerId, DispatchError> {
        let mut registry = self.registry.lock();
        if registry.listener_count >= registry.max_listeners {
            tracing::warn!(event, max = registry.max_listeners, "Listener limit reached");
            return Err(DispatchError::TooManyListeners {
                max: registry.max_listeners,
            });
        }

        let id = format!(
            "listener_{}",
            self.next_listener.fetch_add(1, Ordering::SeqCst) + 1
        );
        let entry = ListenerRegistration::new(id.clone(), event.to_string(), priority, once, callback);
        insert_sorted(registry.listeners.entry(event.to_string()).or_default(), entry);
        registry.listener_count += 1;

        tracing::trace!(event, listener_id = %id, priority, once, "Listener registered");
        Ok(id)
    }

    fn settle_waiter(&self, waiter_id: u64, outcome: Result<Value, DispatchError>) -> bool {
        let Some(waiter) = self.waiters.lock().remove(&waiter_id) else {
            return false;
        };
        waiter.timer.abort();
        self.registry.lock().remove(&waiter.event, &waiter.listener_id);

        match outcome {
            Ok(value) => waiter.resolver.resolve(value),
            Err(err) => waiter.resolver.reject(err),
        }
    }

    fn expire_ack(&self, ack_id: &str) {
        let Some(pending) = self.pending_acks.lock().remove(ack_id) else {
            return;
        };
        tracing::debug!(ack_id, event = %pending.event, "Acknowledgement timed out");
        pending.resolver.reject(DispatchError::AckTimeout {
            event: pending.event.clone(),
            ack_id: pending.ack_id.clone(),
        });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for (_, pending) in self.pending_acks.get_mut().drain() {
            pending.cancel_timer();
        }
        for (_, waiter) in self.waiters.get_mut().drain() {
            waiter.timer.abort();
        }
    }
}

/// Event dispatcher
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Inner>,
}

impl EventDispatcher {
    /// Create a dispatcher with a listener cap and a default deadline
    #[must_use]
    pub fn new(max_listeners: usize, default_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                default_timeout,
                next_listener: AtomicU64::new(0),
                next_waiter: AtomicU64::new(0),
                registry: Mutex::new(Registry {
                    listeners: HashMap::new(),
                    listener_count: 0,
                    max_listeners,
                    global_middlewares: Vec::new(),
                    event_middlewares: HashMap::new(),
                    pipes: Vec::new(),
                }),
                pending_acks: Mutex::new(HashMap::new()),
                waiters: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a dispatcher from configuration
    #[must_use]
    pub fn from_settings(settings: &DispatcherSettings) -> Self {
        Self::new(settings.max_listeners, settings.default_timeout())
    }

    /// Unique id of this dispatcher
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Deadline used when `None` is passed to `wait_for` or `emit_with_ack`
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Register a listener
    ///
    /// Listeners of an event run in descending priority; equal priorities run in
    /// registration order.
    pub fn on<F>(&self, event: &str, callback: F, priority: i32) -> Result<ListenerId, DispatchError>
    where
        F: Fn(&Value, &str) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.register(event, Arc::new(callback), priority, false)
    }

    /// Register a listener that fires at most once
    ///
    /// The registration is removed right before its single invocation, so a
    /// recursive emission from inside the listener does not reach it again.
    pub fn once<F>(&self, event: &str, callback: F, priority: i32) -> Result<ListenerId, DispatchError>
    where
        F: Fn(&Value, &str) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.register(event, Arc::new(callback), priority, true)
    }

    /// Register a listener for every event
    pub fn add_global_listener<F>(&self, callback: F, priority: i32) -> Result<ListenerId, DispatchError>
    where
        F: Fn(&Value, &str) -> ListenerResult + Send + Sync + 'static,
    {
        self.on(WILDCARD_EVENT, callback, priority)
    }

    /// Remove one listener, or every listener of `event` when `listener_id` is `None`
    ///
    /// Returns the number of listeners removed.
    pub fn off(&self, event: &str, listener_id: Option<&str>) -> usize {
        let mut registry = self.inner.registry.lock();
        match listener_id {
            Some(id) => usize::from(registry.remove(event, id)),
            None => registry.remove_bucket(event),
        }
    }

    /// Add a middleware, scoped to `event` or global when `None`
    ///
    /// Global middlewares run before scoped ones, each group in registration order.
    pub fn add_middleware<F>(&self, middleware: F, event: Option<&str>)
    where
        F: Fn(&str, &Value) -> MiddlewareAction + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.lock();
        match event {
            Some(event) => registry
                .event_middlewares
                .entry(event.to_string())
                .or_default()
                .push(Arc::new(middleware)),
            None => registry.global_middlewares.push(Arc::new(middleware)),
        }
    }

    /// Remove listeners and scoped middlewares of one event, or of every event
    ///
    /// Global middlewares are kept. Returns the number of listeners removed.
    pub fn remove_all_listeners(&self, event: Option<&str>) -> usize {
        let mut registry = self.inner.registry.lock();
        match event {
            Some(event) => {
                registry.event_middlewares.remove(event);
                registry.remove_bucket(event)
            }
            None => {
                let removed = registry.listener_count;
                registry.listeners.clear();
                registry.event_middlewares.clear();
                registry.listener_count = 0;
                removed
            }
        }
    }

    /// Change the listener cap; existing registrations are kept
    pub fn set_max_listeners(&self, max: usize) {
        self.inner.registry.lock().max_listeners = max;
    }

    /// Current listener cap
    pub fn max_listeners(&self) -> usize {
        self.inner.registry.lock().max_listeners
    }

    /// Listeners of one event in invocation order, or of all events grouped by name
    pub fn get_listeners(&self, event: Option<&str>) -> Vec<ListenerInfo> {
        let registry = self.inner.registry.lock();
        match event {
            Some(event) => registry
                .listeners
                .get(event)
                .map(|bucket| bucket.iter().map(|l| l.info()).collect())
                .unwrap_or_default(),
            None => {
                let mut events: Vec<&String> = registry.listeners.keys().collect();
                events.sort();
                events
                    .into_iter()
                    .flat_map(|event| registry.listeners[event].iter().map(|l| l.info()))
                    .collect()
            }
        }
    }

    /// Number of listeners for one event, or in total
    pub fn get_listener_count(&self, event: Option<&str>) -> usize {
        let registry = self.inner.registry.lock();
        match event {
            Some(event) => registry.listeners.get(event).map_or(0, Vec::len),
            None => registry.listener_count,
        }
    }

    /// Check if an emission of `event` would reach at least one listener
    ///
    /// Wildcard listeners count for every event.
    pub fn has_listeners(&self, event: &str) -> bool {
        let registry = self.inner.registry.lock();
        registry.listeners.contains_key(event) || registry.listeners.contains_key(WILDCARD_EVENT)
    }

    // ---------------------------------------------------------------------
    // Emission
    // ---------------------------------------------------------------------

    /// Emit an event and collect the non-null listener results in invocation order
    ///
    /// Middlewares run first; a [`MiddlewareAction::Block`] verdict returns an empty
    /// result without running any listener. Event listeners run before wildcard
    /// listeners. A failing listener is logged and reported as a
    /// [`LISTENER_ERROR_EVENT`](super::LISTENER_ERROR_EVENT) emission; the remaining
    /// listeners still run.
    pub fn emit(&self, event: &str, payload: Value) -> Vec<Value> {
        self.inner.emit_routed(event, &payload, &[])
    }

    /// Emit without blocking the caller
    ///
    /// Inside a tokio runtime the emission runs as a spawned task. Outside of one it
    /// falls back to a synchronous [`emit`](Self::emit) with identical semantics.
    pub fn emit_async(&self, event: &str, payload: Value) {
        match Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                let event = event.to_string();
                handle.spawn(async move {
                    inner.emit_routed(&event, &payload, &[]);
                });
            }
            Err(_) => {
                tracing::debug!(event, "No async runtime available, emitting synchronously");
                self.inner.emit_routed(event, &payload, &[]);
            }
        }
    }

    /// Emit an [`Event`] under its own name
    pub fn dispatch_event(&self, event: &Event) -> Vec<Value> {
        self.emit(event.name(), Value::Object(event.data().clone()))
    }

    /// Emit a [`ClientEvent`] under its own name
    ///
    /// If the event requires an acknowledgement and no listener acknowledged it, it is
    /// acknowledged with the collected results.
    pub fn dispatch_client_event(&self, event: &ClientEvent) -> Vec<Value> {
        let results = self.emit(event.name(), Value::Object(event.data().clone()));
        if event.requires_ack() && !event.is_acknowledged() {
            event.acknowledge(Value::Array(results.clone()));
        }
        results
    }

    /// Wait for the next emission of `event`
    pub fn wait_for(&self, event: &str, timeout: Option<Duration>) -> Promise<Value> {
        self.wait_for_match(event, timeout, |_| true)
    }

    /// Wait for the next emission of `event` whose payload satisfies `predicate`
    ///
    /// Resolves with the payload, or rejects with [`DispatchError::WaitTimeout`].
    /// Payloads failing the predicate leave the wait in place.
    pub fn wait_for_match<P>(&self, event: &str, timeout: Option<Duration>, predicate: P) -> Promise<Value>
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let Ok(handle) = Handle::try_current() else {
            return Promise::rejected(DispatchError::RuntimeUnavailable);
        };
        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        let waiter_id = self.inner.next_waiter.fetch_add(1, Ordering::SeqCst);
        let (resolver, promise) = Promise::pending();

        // Held until the waiter is stored so a concurrent emission cannot miss it
        let mut waiters = self.inner.waiters.lock();

        let weak = Arc::downgrade(&self.inner);
        let listener = move |payload: &Value, _: &str| -> ListenerResult {
            if predicate(payload) {
                if let Some(inner) = weak.upgrade() {
                    inner.settle_waiter(waiter_id, Ok(payload.clone()));
                }
            }
            Ok(None)
        };
        let listener_id = match self.inner.register(event, Arc::new(listener), 0, false) {
            Ok(id) => id,
            Err(err) => return Promise::rejected(err),
        };

        let weak = Arc::downgrade(&self.inner);
        let event_name = event.to_string();
        let timer = handle
            .spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(inner) = weak.upgrade() {
                    inner.settle_waiter(waiter_id, Err(DispatchError::WaitTimeout { event: event_name }));
                }
            })
            .abort_handle();

        waiters.insert(
            waiter_id,
            Waiter {
                event: event.to_string(),
                listener_id,
                resolver,
                timer,
            },
        );
        promise
    }

    // ---------------------------------------------------------------------
    // Acknowledgements
    // ---------------------------------------------------------------------

    /// Register a pending acknowledgement for `event`
    ///
    /// Returns the generated ack id and the promise settled by
    /// [`handle_ack`](Self::handle_ack) or by the deadline.
    pub fn register_ack(
        &self,
        event: &str,
        timeout: Option<Duration>,
    ) -> Result<(String, Promise<Value>), DispatchError> {
        let handle = Handle::try_current().map_err(|_| DispatchError::RuntimeUnavailable)?;
        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        let ack_id = format!("ack_{}", Uuid::new_v4().simple());
        let (resolver, promise) = Promise::pending();

        let mut pending = self.inner.pending_acks.lock();

        let weak = Arc::downgrade(&self.inner);
        let expiring = ack_id.clone();
        let timer = handle
            .spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(inner) = weak.upgrade() {
                    inner.expire_ack(&expiring);
                }
            })
            .abort_handle();

        pending.insert(
            ack_id.clone(),
            PendingAcknowledgement {
                ack_id: ack_id.clone(),
                event: event.to_string(),
                resolver,
                timer,
                created_at: Instant::now(),
            },
        );

        tracing::trace!(event, ack_id = %ack_id, ?timeout, "Acknowledgement registered");
        Ok((ack_id, promise))
    }

    /// Emit an event that expects an acknowledgement
    ///
    /// The ack id is attached to the payload under `_ackId`; non-object payloads are
    /// wrapped as `{"payload": ..., "_ackId": ...}`.
    pub fn emit_with_ack(&self, event: &str, payload: Value, timeout: Option<Duration>) -> Promise<Value> {
        let (ack_id, promise) = match self.register_ack(event, timeout) {
            Ok(registered) => registered,
            Err(err) => return Promise::rejected(err),
        };

        let payload = match payload {
            Value::Object(mut map) => {
                map.insert(ACK_ID_KEY.to_string(), Value::String(ack_id));
                Value::Object(map)
            }
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other);
                map.insert(ACK_ID_KEY.to_string(), Value::String(ack_id));
                Value::Object(map)
            }
        };

        self.emit(event, payload);
        promise
    }

    /// Resolve a pending acknowledgement
    ///
    /// Returns `false` when the id is unknown, already resolved or timed out.
    pub fn handle_ack(&self, ack_id: &str, response: Value) -> bool {
        let Some(pending) = self.inner.pending_acks.lock().remove(ack_id) else {
            tracing::debug!(ack_id, "Ignoring acknowledgement for unknown id");
            return false;
        };
        pending.cancel_timer();
        tracing::trace!(ack_id, event = %pending.event, elapsed = ?pending.age(), "Acknowledgement received");
        pending.resolver.resolve(response)
    }

    /// Reject a pending acknowledgement before its deadline
    pub fn reject_ack(&self, ack_id: &str, error: DispatchError) -> bool {
        let Some(pending) = self.inner.pending_acks.lock().remove(ack_id) else {
            return false;
        };
        pending.cancel_timer();
        pending.resolver.reject(error)
    }

    /// Number of acknowledgements still pending
    pub fn pending_ack_count(&self) -> usize {
        self.inner.pending_acks.lock().len()
    }

    /// Cancel every pending acknowledgement and waiter
    ///
    /// Their promises reject with [`DispatchError::Cancelled`]. Listeners and pipes
    /// are left in place.
    pub fn shutdown(&self) {
        let acks: Vec<PendingAcknowledgement> =
            self.inner.pending_acks.lock().drain().map(|(_, p)| p).collect();
        for pending in &acks {
            pending.cancel_timer();
            pending.resolver.reject(DispatchError::Cancelled);
        }

        let ids: Vec<u64> = self.inner.waiters.lock().keys().copied().collect();
        for id in &ids {
            self.inner.settle_waiter(*id, Err(DispatchError::Cancelled));
        }

        if !acks.is_empty() || !ids.is_empty() {
            tracing::debug!(
                acks = acks.len(),
                waiters = ids.len(),
                "Cancelled pending operations"
            );
        }
    }

    // ---------------------------------------------------------------------
    // Forwarding
    // ---------------------------------------------------------------------

    /// Forward events to `target`
    ///
    /// An empty `events` list forwards everything. With `bidirectional` the reverse
    /// pipe is installed as well. An event is never forwarded to a dispatcher it
    /// already passed through, so cycles stop after one hop per dispatcher.
    /// Piping to the same target again replaces the event selection.
    pub fn pipe_to(&self, target: &EventDispatcher, events: &[&str], bidirectional: bool) {
        if target.id() == self.id() {
            tracing::debug!(dispatcher = %self.id(), "Ignoring pipe to self");
            return;
        }

        let selection = if events.is_empty() {
            None
        } else {
            Some(events.iter().map(|e| (*e).to_string()).collect())
        };

        {
            let mut registry = self.inner.registry.lock();
            registry.pipes.retain(|pipe| pipe.target_id != target.id() && pipe.target.strong_count() > 0);
            registry.pipes.push(Pipe {
                target: Arc::downgrade(&target.inner),
                target_id: target.id(),
                events: selection,
            });
        }

        if bidirectional {
            target.pipe_to(self, events, false);
        }
    }

    /// Stop forwarding to `target`
    pub fn unpipe(&self, target: &EventDispatcher) -> bool {
        let mut registry = self.inner.registry.lock();
        let before = registry.pipes.len();
        registry.pipes.retain(|pipe| pipe.target_id != target.id());
        registry.pipes.len() != before
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::from_settings(&DispatcherSettings::default())
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("id", &self.inner.id)
            .field("listeners", &self.get_listener_count(None))
            .field("pending_acks", &self.pending_ack_count())
            .finish()
    }
}
