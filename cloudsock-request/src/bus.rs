//! Observable surface for dispatch failures that never reach the client as
//! anything richer than one of the fixed response phrases: a sub-request
//! that didn't parse (or named nothing registered), and a handler error with
//! no `on_error` hook to absorb it. Mirrors `cloudsock_link`'s event bus —
//! handlers keyed by kind plus a catch-all list, invoked synchronously on the
//! dispatch thread, with a panicking handler caught and logged rather than
//! taking the dispatcher down.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Which kind of dispatch failure occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchEventKind {
    /// A sub-request didn't parse under either accepted syntax, used
    /// function-call syntax against a handler that disallows it, or named a
    /// handler nothing is registered under.
    InvalidSyntax,
    /// A registered handler raised something other than `ErrorMessage`, and
    /// no `on_error` hook recovered it.
    ErrorInRequest,
}

/// One dispatch-failure record.
#[derive(Clone, Debug)]
pub struct DispatchEvent {
    pub kind: DispatchEventKind,
    pub client_id: String,
    pub detail: String,
}

impl DispatchEvent {
    pub fn new(kind: DispatchEventKind, client_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { kind, client_id: client_id.into(), detail: detail.into() }
    }
}

type Handler = Box<dyn Fn(&DispatchEvent) + Send + Sync>;

/// Registry of dispatch-event handlers, shared between the caller and the
/// dispatch thread.
#[derive(Clone, Default)]
pub struct DispatchEventBus {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    by_kind: HashMap<DispatchEventKind, Vec<Handler>>,
    any: Vec<Handler>,
}

impl DispatchEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind.
    pub fn on(&self, kind: DispatchEventKind, handler: impl Fn(&DispatchEvent) + Send + Sync + 'static) {
        self.inner.lock().expect("dispatch event bus mutex poisoned").by_kind.entry(kind).or_default().push(Box::new(handler));
    }

    /// Register a handler invoked for every dispatch event, regardless of kind.
    pub fn on_any(&self, handler: impl Fn(&DispatchEvent) + Send + Sync + 'static) {
        self.inner.lock().expect("dispatch event bus mutex poisoned").any.push(Box::new(handler));
    }

    pub fn emit(&self, event: &DispatchEvent) {
        let inner = self.inner.lock().expect("dispatch event bus mutex poisoned");
        if let Some(handlers) = inner.by_kind.get(&event.kind) {
            for handler in handlers {
                Self::invoke(handler, event);
            }
        }
        for handler in &inner.any {
            Self::invoke(handler, event);
        }
    }

    fn invoke(handler: &Handler, event: &DispatchEvent) {
        if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            log::warn!("dispatch event handler for {:?} panicked; continuing", event.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatches_to_kind_and_any_handlers() {
        let bus = DispatchEventBus::new();
        let kind_hits = Arc::new(AtomicUsize::new(0));
        let any_hits = Arc::new(AtomicUsize::new(0));

        let k = kind_hits.clone();
        bus.on(DispatchEventKind::InvalidSyntax, move |_| {
            k.fetch_add(1, Ordering::SeqCst);
        });
        let a = any_hits.clone();
        bus.on_any(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&DispatchEvent::new(DispatchEventKind::InvalidSyntax, "c1", "bad syntax"));
        bus.emit(&DispatchEvent::new(DispatchEventKind::ErrorInRequest, "c1", "boom"));

        assert_eq!(kind_hits.load(Ordering::SeqCst), 1);
        assert_eq!(any_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn a_panicking_handler_does_not_stop_the_rest() {
        let bus = DispatchEventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.on(DispatchEventKind::ErrorInRequest, |_| panic!("boom"));
        let h = hits.clone();
        bus.on(DispatchEventKind::ErrorInRequest, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(&DispatchEvent::new(DispatchEventKind::ErrorInRequest, "c1", "boom"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
