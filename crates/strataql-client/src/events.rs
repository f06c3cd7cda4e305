//! Observability events.
//!
//! The orchestrator emits a typed event at every externally observable
//! point: request admission, fetch dispatch, cache hits and misses,
//! subscription messages, and errors. Listeners are in-process callbacks;
//! `on` returns a [`ListenerId`] and `off` removes by id: closures are not
//! comparable in Rust, so identity is the handle.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tracing::debug;

/// The observable event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A request entered the pipeline.
    Request,
    /// An external fetch was dispatched.
    Fetch,
    /// A subscription started or delivered a message.
    Subscription,
    /// A request was served from cache.
    CacheHit,
    /// A request missed the cache (fully or partially).
    CacheMiss,
    /// A request failed.
    Error,
}

impl EventKind {
    /// Wire name of the event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Fetch => "fetch",
            Self::Subscription => "subscription",
            Self::CacheHit => "cache-hit",
            Self::CacheMiss => "cache-miss",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emitted event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event kind.
    pub kind: EventKind,
    /// Structured payload (request id, fingerprint, operation, ...).
    pub payload: JsonValue,
}

/// Handle identifying one registered listener.
pub type ListenerId = u64;

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Listener registry.
#[derive(Default)]
pub struct EventEmitter {
    listeners: DashMap<EventKind, Vec<(ListenerId, Callback)>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    /// Fresh emitter with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for an event kind.
    pub fn on(&self, kind: EventKind, callback: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a listener by the id `on` returned. Returns whether a
    /// listener was removed.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        match self.listeners.get_mut(&kind) {
            Some(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(listener_id, _)| *listener_id != id);
                listeners.len() != before
            }
            None => false,
        }
    }

    /// Deliver an event to every listener of its kind.
    pub fn emit(&self, kind: EventKind, payload: JsonValue) {
        let Some(listeners) = self.listeners.get(&kind) else {
            return;
        };
        if listeners.is_empty() {
            return;
        }
        debug!(event = %kind, listeners = listeners.len(), "emitting event");
        let event = Event { kind, payload };
        for (_, callback) in listeners.iter() {
            callback(&event);
        }
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("kinds", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_listeners_receive_matching_events() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        emitter.on(EventKind::CacheHit, move |event| {
            assert_eq!(event.kind, EventKind::CacheHit);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(EventKind::CacheHit, json!({"hash": "h1"}));
        emitter.emit(EventKind::CacheMiss, json!({"hash": "h1"}));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_by_id() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = emitter.on(EventKind::Request, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(emitter.off(EventKind::Request, id));
        assert!(!emitter.off(EventKind::Request, id));
        emitter.emit(EventKind::Request, json!({}));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_multiple_listeners_all_fire() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&seen);
            emitter.on(EventKind::Error, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        emitter.emit(EventKind::Error, json!({"code": "EXECUTOR"}));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(EventKind::CacheHit.as_str(), "cache-hit");
        assert_eq!(EventKind::Subscription.to_string(), "subscription");
    }
}
