//! Synchronous event dispatch: handlers registered per [`EventKind`], plus a
//! catch-all `"any"` list, invoked in the reader thread's own context.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use cloudsock_proto::{Event, EventKind};

type Handler = Box<dyn Fn(&Event) + Send + Sync>;

/// Registry of event handlers, shared between the caller and the reader
/// thread.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    by_kind: HashMap<EventKind, Vec<Handler>>,
    any: Vec<Handler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.inner.lock().expect("event bus mutex poisoned").by_kind.entry(kind).or_default().push(Box::new(handler));
    }

    /// Register a handler invoked for every event, regardless of kind.
    pub fn on_any(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.inner.lock().expect("event bus mutex poisoned").any.push(Box::new(handler));
    }

    /// Dispatch `event` to its kind-specific handlers and the `"any"`
    /// handlers, in registration order. A handler that panics is caught and
    /// logged as a warning rather than killing the caller (the reader
    /// thread, in normal operation): an event-handler exception must never
    /// kill the reader.
    pub fn emit(&self, event: &Event) {
        let inner = self.inner.lock().expect("event bus mutex poisoned");
        if let Some(handlers) = inner.by_kind.get(&event.kind) {
            for handler in handlers {
                Self::invoke(handler, event);
            }
        }
        for handler in &inner.any {
            Self::invoke(handler, event);
        }
    }

    fn invoke(handler: &Handler, event: &Event) {
        if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            log::warn!("event handler for {:?} panicked; continuing", event.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatches_to_kind_and_any_handlers() {
        let bus = EventBus::new();
        let kind_hits = Arc::new(AtomicUsize::new(0));
        let any_hits = Arc::new(AtomicUsize::new(0));

        let k = kind_hits.clone();
        bus.on(EventKind::Set, move |_| {
            k.fetch_add(1, Ordering::SeqCst);
        });
        let a = any_hits.clone();
        bus.on_any(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&Event::new(EventKind::Set, "x", "x", "1"));
        bus.emit(&Event::new(EventKind::Delete, "x", "x", "1"));

        assert_eq!(kind_hits.load(Ordering::SeqCst), 1);
        assert_eq!(any_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn a_panicking_handler_does_not_stop_the_rest() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.on(EventKind::Set, |_| panic!("boom"));
        let h = hits.clone();
        bus.on(EventKind::Set, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(&Event::new(EventKind::Set, "x", "x", "1"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
