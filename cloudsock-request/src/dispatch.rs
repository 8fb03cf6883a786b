//! The accept/dispatch loop: pulls newly accepted clients and their
//! messages off a [`CloudSocket`], parses each sub-request, coerces its
//! arguments, runs the matching handler, and sends back the last
//! sub-request's response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cloudsock_socket::CloudSocket;

use crate::arg::Arg;
use crate::bus::{DispatchEvent, DispatchEventBus, DispatchEventKind};
use crate::coerce::coerce;
use crate::errors::RequestError;
use crate::handler::Registration;
use crate::syntax;

/// A handler's own retry trigger, passed to the `on_error` hook. Calling it
/// reruns the handler with the arguments it was originally invoked with.
pub type RetryFn<'a> = dyn FnMut() -> Result<Arg, RequestError> + 'a;

/// Invoked once per non-`ErrorMessage` handler failure. Returning `Some`
/// (typically from calling the retry closure) replaces the failed result;
/// returning `None` keeps the original error.
type ErrorHook = dyn Fn(&RequestError, &mut RetryFn) -> Option<Result<Arg, RequestError>> + Send + Sync;

/// Registers request callables and runs the accept/dispatch loop over a
/// [`CloudSocket`].
pub struct RequestHandler {
    socket: Arc<CloudSocket>,
    registry: Mutex<HashMap<String, Arc<Registration>>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    on_error: Mutex<Option<Box<ErrorHook>>>,
    activity_cursor: AtomicU64,
    events: DispatchEventBus,
}

impl RequestHandler {
    pub fn new(socket: Arc<CloudSocket>) -> Arc<Self> {
        Arc::new(Self {
            socket,
            registry: Mutex::new(HashMap::new()),
            running: Arc::new(AtomicBool::new(true)),
            worker: Mutex::new(None),
            on_error: Mutex::new(None),
            activity_cursor: AtomicU64::new(0),
            events: DispatchEventBus::new(),
        })
    }

    /// Register a handler for one dispatch-event kind (`invalid_syntax` or
    /// `error_in_request`).
    pub fn on_event(&self, kind: DispatchEventKind, handler: impl Fn(&DispatchEvent) + Send + Sync + 'static) {
        self.events.on(kind, handler);
    }

    /// Register a handler invoked for every dispatch event, regardless of kind.
    pub fn on_any_event(&self, handler: impl Fn(&DispatchEvent) + Send + Sync + 'static) {
        self.events.on_any(handler);
    }

    pub fn register(&self, registration: Registration) {
        self.registry
            .lock()
            .expect("request registry mutex poisoned")
            .insert(registration.name.clone(), Arc::new(registration));
    }

    /// Sets the hook invoked exactly once per handler failure that is not a
    /// deliberate [`RequestError::ErrorMessage`].
    pub fn on_error(&self, hook: impl Fn(&RequestError, &mut RetryFn) -> Option<Result<Arg, RequestError>> + Send + Sync + 'static) {
        *self.on_error.lock().expect("on_error hook mutex poisoned") = Some(Box::new(hook));
    }

    /// Runs the accept/dispatch loop on the caller's thread until [`Self::stop`]
    /// is called. Blocks in 30 s slices on `any_update` between polls, the
    /// same cadence the reference dispatcher uses.
    pub fn run(self: &Arc<Self>) {
        let mut active: Vec<String> = Vec::new();
        while self.running.load(Ordering::SeqCst) {
            let since = self.activity_cursor.load(Ordering::SeqCst);
            let now = self.socket.wait_for_activity(since, Duration::from_secs(30));
            self.activity_cursor.store(now, Ordering::SeqCst);
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            while let Ok((client_id, _username)) = self.socket.accept(Some(Duration::ZERO)) {
                if !active.iter().any(|c| c == &client_id) {
                    active.push(client_id);
                }
            }

            for client_id in active.clone() {
                match self.socket.recv_from_client(&client_id, Some(Duration::ZERO)) {
                    Ok(msg) => self.process_message(&client_id, &msg),
                    Err(_) => continue,
                }
            }
        }
    }

    /// Spawns [`Self::run`] on a fresh worker thread instead of blocking the
    /// caller.
    pub fn spawn(self: &Arc<Self>) {
        let this = self.clone();
        let handle = std::thread::spawn(move || this.run());
        *self.worker.lock().expect("worker handle mutex poisoned") = Some(handle);
    }

    /// Stops the dispatch loop, cascades to the underlying `CloudSocket`
    /// (and its `CloudLink`), and wakes every thread blocked in `accept`,
    /// `recv_from_client`, or the activity wait.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.socket.stop(true);
        if let Some(handle) = self.worker.lock().expect("worker handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }

    fn process_message(self: &Arc<Self>, client_id: &str, msg: &str) {
        let subrequests = syntax::split_subrequests(msg);
        let Some(last_index) = subrequests.len().checked_sub(1) else {
            return;
        };
        for (i, raw) in subrequests.iter().enumerate() {
            self.dispatch_one(client_id, raw, i == last_index);
        }
    }

    fn dispatch_one(self: &Arc<Self>, client_id: &str, raw: &str, is_last: bool) {
        let name = syntax::peek_name(raw);
        let registration = name.and_then(|n| self.registry.lock().expect("request registry mutex poisoned").get(n).cloned());

        let registration = match registration {
            Some(r) => r,
            None => {
                let err = RequestError::UnknownRequest(name.unwrap_or_default().to_string());
                log::warn!("received a request with an invalid syntax: {err}");
                self.events.emit(&DispatchEvent::new(DispatchEventKind::InvalidSyntax, client_id, err.to_string()));
                if is_last {
                    self.respond(client_id, &err.response_text());
                }
                return;
            }
        };

        let parsed = match syntax::parse_subrequest(raw, registration.allow_python_syntax) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!("received a request with an invalid syntax: {err}");
                self.events.emit(&DispatchEvent::new(DispatchEventKind::InvalidSyntax, client_id, err.to_string()));
                if is_last {
                    self.respond(client_id, &err.response_text());
                }
                return;
            }
        };

        let (args, kwargs) = Self::coerce_args(&registration, parsed);

        if registration.thread {
            let this = self.clone();
            let client_id = client_id.to_string();
            std::thread::spawn(move || this.finish(&client_id, registration, args, kwargs, is_last));
        } else {
            self.finish(client_id, registration, args, kwargs, is_last);
        }
    }

    fn coerce_args(registration: &Registration, parsed: syntax::ParsedRequest) -> (Vec<Arg>, HashMap<String, Arg>) {
        let mut args = Vec::with_capacity(parsed.args.len());
        for (idx, arg) in parsed.args.into_iter().enumerate() {
            let kind = registration.params.get(idx).copied().unwrap_or(registration.variadic);
            args.push(coerce(arg, kind));
        }
        let mut kwargs = HashMap::with_capacity(parsed.kwargs.len());
        for (key, value) in parsed.kwargs {
            let kind = registration.kwargs.get(&key).copied().unwrap_or(registration.kwargs_variadic);
            kwargs.insert(key, coerce(value, kind));
        }
        (args, kwargs)
    }

    fn finish(self: &Arc<Self>, client_id: &str, registration: Arc<Registration>, args: Vec<Arg>, kwargs: HashMap<String, Arg>, is_last: bool) {
        let result = self.invoke(client_id, &registration, args, kwargs);
        if is_last {
            let text = match result {
                Ok(value) => coerce(value, registration.return_kind).to_string(),
                Err(err) => err.response_text(),
            };
            self.respond(client_id, &text);
        }
    }

    fn invoke(self: &Arc<Self>, client_id: &str, registration: &Arc<Registration>, args: Vec<Arg>, kwargs: HashMap<String, Arg>) -> Result<Arg, RequestError> {
        match (registration.handler)(&args, &kwargs) {
            Ok(value) => Ok(value),
            Err(RequestError::ErrorMessage(msg)) => Err(RequestError::ErrorMessage(msg)),
            Err(other) => {
                let hook = self.on_error.lock().expect("on_error hook mutex poisoned");
                match hook.as_ref() {
                    Some(hook) => {
                        let handler = registration.handler.clone();
                        let mut retry = move || (handler)(&args, &kwargs);
                        match hook(&other, &mut retry) {
                            Some(retried) => retried,
                            None => Err(other),
                        }
                    }
                    None => {
                        log::warn!("there was an uncaught error in the request handler: {other}");
                        self.events.emit(&DispatchEvent::new(DispatchEventKind::ErrorInRequest, client_id, other.to_string()));
                        Err(other)
                    }
                }
            }
        }
    }

    fn respond(&self, client_id: &str, text: &str) {
        if let Err(e) = self.socket.send(client_id, text) {
            log::warn!("failed to send response to {client_id}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::CoerceKind;
    use std::sync::atomic::AtomicUsize;

    fn registration_calling(counter: Arc<AtomicUsize>) -> Registration {
        Registration::new("bump", move |_args, _kwargs| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arg::Int(0))
        })
    }

    #[test]
    fn coerce_args_applies_declared_param_kinds_in_order() {
        let registration = Registration::new("echo", |_a, _k| Ok(Arg::Int(0)))
            .param(CoerceKind::Str)
            .param(CoerceKind::Int);
        let parsed = syntax::parse_subrequest("echo \"hi\" \"3\"", false).unwrap();
        let (args, _) = RequestHandler::coerce_args(&registration, parsed);
        assert_eq!(args, vec![Arg::Str("hi".to_string()), Arg::Int(3)]);
    }

    #[test]
    fn unregistered_handlers_are_counted_but_not_invoked() {
        let counter = Arc::new(AtomicUsize::new(0));
        let _ = registration_calling(counter.clone());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
