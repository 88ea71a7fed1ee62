//! Inbound frame routing and subscriber fan-out
//!
//! Classification is pure: a text frame becomes a [`FrameRoute`]. Fan-out runs
//! every handler registered for an event type against a snapshot of the
//! registry, isolating each invocation so one failing subscriber cannot starve
//! the others.

use crate::protocol::BusEvent;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

/// Outcome of a subscriber invocation
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Subscriber callback; receives the event payload only
pub type EventHandler = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

/// Opaque handle identifying one registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Wrap a handler that wants the payload decoded into `T`.
///
/// A payload that does not match `T` is reported as a handler failure.
pub fn typed_handler<T, F>(handler: F) -> EventHandler
where
    T: DeserializeOwned + 'static,
    F: Fn(T) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(move |payload: &Value| -> HandlerResult {
        let typed = T::deserialize(payload)?;
        handler(typed)
    })
}

/// Event type → handlers, in subscription order
pub struct SubscriptionRegistry {
    handlers: Mutex<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, event_type: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(event_type.to_string())
            .or_default()
            .push((id, handler));
        debug!(event_type, subscription = %id, "Handler subscribed");
        id
    }

    /// Remove one handler, or every handler for `event_type` when `id` is None.
    ///
    /// Returns the number of handlers removed. The (possibly empty) entry for
    /// the event type is kept.
    pub fn unsubscribe(&self, event_type: &str, id: Option<SubscriptionId>) -> usize {
        let mut handlers = self.lock();
        let Some(entry) = handlers.get_mut(event_type) else {
            return 0;
        };

        let before = entry.len();
        match id {
            Some(id) => entry.retain(|(existing, _)| *existing != id),
            None => entry.clear(),
        }
        let removed = before - entry.len();
        debug!(event_type, removed, "Handlers unsubscribed");
        removed
    }

    /// Copy of the current handler list for `event_type`
    pub fn snapshot(&self, event_type: &str) -> Vec<(SubscriptionId, EventHandler)> {
        self.lock().get(event_type).cloned().unwrap_or_default()
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.lock().get(event_type).map_or(0, Vec::len)
    }

    /// Event types with at least one handler, sorted
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_empty())
            .map(|(event_type, _)| event_type.clone())
            .collect();
        types.sort();
        types
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // Handlers never run under this lock, so a poisoned guard still holds a
    // consistent map.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<(SubscriptionId, EventHandler)>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<String, usize> = self
            .lock()
            .iter()
            .map(|(event_type, entry)| (event_type.clone(), entry.len()))
            .collect();
        f.debug_struct("SubscriptionRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

/// Routing decision for one inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRoute {
    /// Heartbeat acknowledgement; consumed by the heartbeat monitor
    Pong,
    /// Business event to fan out
    Event(BusEvent),
    /// Valid JSON without a usable `event_type`
    NonEvent,
    /// Not JSON, or an event whose fields have the wrong types
    Malformed(String),
}

/// Per-event fan-out summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that returned `Ok`
    pub delivered: usize,
    /// Handlers that returned `Err` or panicked
    pub failed: usize,
    /// Handlers not run because the connection was torn down mid fan-out
    pub skipped: usize,
}

/// Pure frame classification and isolated handler invocation
pub struct EventDispatcher;

impl EventDispatcher {
    /// Classify an inbound text frame (pure function)
    pub fn classify(text: &str) -> FrameRoute {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return FrameRoute::Malformed(e.to_string()),
        };

        if value.get("type").and_then(Value::as_str) == Some("pong") {
            return FrameRoute::Pong;
        }

        match value.get("event_type").and_then(Value::as_str) {
            Some(event_type) if !event_type.is_empty() => {}
            _ => return FrameRoute::NonEvent,
        }

        match serde_json::from_value::<BusEvent>(value) {
            Ok(event) => FrameRoute::Event(event),
            Err(e) => FrameRoute::Malformed(e.to_string()),
        }
    }

    /// Invoke every handler registered for the event, in subscription order.
    ///
    /// `is_live` is checked before each invocation; once it returns false the
    /// remaining handlers are skipped. A handler that already passed the check
    /// runs to completion even if `is_live` flips on another thread meanwhile.
    pub fn dispatch(
        registry: &SubscriptionRegistry,
        event: &BusEvent,
        is_live: impl Fn() -> bool,
    ) -> DispatchReport {
        let handlers = registry.snapshot(&event.event_type);
        let mut report = DispatchReport::default();

        if handlers.is_empty() {
            debug!(event_type = %event.event_type, "No subscribers for event");
            return report;
        }

        for (index, (id, handler)) in handlers.iter().enumerate() {
            if !is_live() {
                report.skipped = handlers.len() - index;
                debug!(
                    event_type = %event.event_type,
                    skipped = report.skipped,
                    "Connection torn down during dispatch, skipping remaining handlers"
                );
                break;
            }

            match catch_unwind(AssertUnwindSafe(|| handler(&event.payload))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!(
                        event_type = %event.event_type,
                        trace_id = %event.trace_id,
                        subscription = %id,
                        "Event handler failed: {}",
                        e
                    );
                }
                Err(panic) => {
                    report.failed += 1;
                    error!(
                        event_type = %event.event_type,
                        trace_id = %event.trace_id,
                        subscription = %id,
                        "Event handler panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
