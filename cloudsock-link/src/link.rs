//! The WebSocket session itself.

use std::net::TcpStream;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use http::header::{COOKIE, ORIGIN, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use tungstenite::client::IntoClientRequest;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use cloudsock_proto::{Event, EventKind};

use crate::bus::EventBus;
use crate::cache::VariableCache;
use crate::config::{Flavor, LinkConfig};
use crate::errors::LinkError;
use crate::retry::RetryPolicy;
use crate::session::PlatformSession;

const NAME_PREFIX: &str = "\u{2601} ";

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// One cloud-variable WebSocket session: handshake, reconnect, event
/// fan-out, and rate-limited writes. Owns exactly one reader thread.
pub struct CloudLink {
    config: LinkConfig,
    project_id: u64,
    username: String,
    session: Option<PlatformSession>,
    bus: EventBus,
    cache: VariableCache,
    socket: Arc<Mutex<Socket>>,
    last_write: Arc<Mutex<Instant>>,
    running: Arc<AtomicBool>,
    retry: Arc<dyn RetryPolicy>,
    reader: Mutex<Option<JoinHandle<()>>>,
    quickaccess: AtomicBool,
}

#[derive(Deserialize)]
struct ServerFrame {
    method: String,
    name: String,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

impl CloudLink {
    /// Open a platform-flavored connection authenticated by a session
    /// cookie. `retry` also governs every reconnect the reader thread makes
    /// after this call returns, not just the initial dial.
    pub fn connect_platform(
        config: LinkConfig,
        project_id: u64,
        session: PlatformSession,
        retry: impl RetryPolicy,
    ) -> Result<Self, LinkError> {
        let username = session.username.clone();
        let mut link = Self::open(config, project_id, username, Some(session), retry)?;
        link.handshake()?;
        link.spawn_reader();
        Ok(link)
    }

    /// Open a TurboWarp-flavored connection (no cookie; identified by
    /// `User-Agent` instead). `retry` also governs every reconnect the
    /// reader thread makes after this call returns, not just the initial
    /// dial.
    pub fn connect_turbowarp(
        config: LinkConfig,
        project_id: u64,
        username: impl Into<String>,
        retry: impl RetryPolicy,
    ) -> Result<Self, LinkError> {
        let mut link = Self::open(config, project_id, username.into(), None, retry)?;
        link.handshake()?;
        link.spawn_reader();
        Ok(link)
    }

    fn open(
        config: LinkConfig,
        project_id: u64,
        username: String,
        session: Option<PlatformSession>,
        retry: impl RetryPolicy,
    ) -> Result<Self, LinkError> {
        let retry: Arc<dyn RetryPolicy> = Arc::new(retry);
        let socket = Self::connect_with_retry(&config, session.as_ref(), retry.as_ref())?;
        let quickaccess = AtomicBool::new(config.quickaccess);
        Ok(Self {
            config,
            project_id,
            username,
            session,
            bus: EventBus::new(),
            cache: VariableCache::new(),
            socket: Arc::new(Mutex::new(socket)),
            last_write: Arc::new(Mutex::new(Instant::now() - Duration::from_secs(1))),
            running: Arc::new(AtomicBool::new(true)),
            retry,
            reader: Mutex::new(None),
            quickaccess,
        })
    }

    fn connect_with_retry(
        config: &LinkConfig,
        session: Option<&PlatformSession>,
        retry: &dyn RetryPolicy,
    ) -> Result<Socket, LinkError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match Self::dial(config, session) {
                Ok(socket) => return Ok(socket),
                Err(e) => {
                    log::warn!("cloud link connect attempt {attempt} failed: {e}");
                    match retry.should_retry(attempt, &e) {
                        ControlFlow::Continue(backoff) => std::thread::sleep(backoff),
                        ControlFlow::Break(()) => return Err(e),
                    }
                }
            }
        }
    }

    fn dial(config: &LinkConfig, session: Option<&PlatformSession>) -> Result<Socket, LinkError> {
        let mut request = config.endpoint.as_str().into_client_request()?;
        match config.flavor {
            Flavor::Platform => {
                let session = session.expect("platform flavor always supplies a session");
                request.headers_mut().insert(
                    COOKIE,
                    format!("scratchsessionsid={};", session.session_id)
                        .parse()
                        .map_err(|_| LinkError::Protocol("invalid session cookie".to_string()))?,
                );
                request.headers_mut().insert(ORIGIN, "https://scratch.mit.edu".parse().unwrap());
            }
            Flavor::TurboWarp => {
                let agent = config.user_agent.as_deref().unwrap_or("cloudsock");
                request.headers_mut().insert(
                    USER_AGENT,
                    agent.parse().map_err(|_| LinkError::Protocol("invalid user agent".to_string()))?,
                );
            }
        }
        let (socket, _response) = tungstenite::connect(request)?;
        apply_socket_timeout(&socket, config.socket_timeout);
        Ok(socket)
    }

    fn reconnect(
        socket: &Arc<Mutex<Socket>>,
        config: &LinkConfig,
        session: Option<&PlatformSession>,
        username: &str,
        project_id: u64,
        retry: &dyn RetryPolicy,
        bus: &EventBus,
        attempt: &mut u32,
    ) -> bool {
        loop {
            *attempt += 1;
            match Self::dial(config, session) {
                Ok(new_socket) => {
                    *socket.lock().expect("socket mutex poisoned") = new_socket;
                    if let Err(e) = send_handshake_frame(socket, username, project_id) {
                        log::warn!("post-reconnect handshake failed: {e}");
                        continue;
                    }
                    bus.emit(&Event::new(EventKind::Connect, "connect", "", ""));
                    *attempt = 0;
                    return true;
                }
                Err(e) => {
                    log::warn!("cloud link reconnect attempt {attempt} failed: {e}");
                    match retry.should_retry(*attempt, &e) {
                        ControlFlow::Continue(backoff) => std::thread::sleep(backoff),
                        ControlFlow::Break(()) => return false,
                    }
                }
            }
        }
    }

    fn handshake(&mut self) -> Result<(), LinkError> {
        self.send_frame(&json!({
            "method": "handshake",
            "user": self.username,
            "project_id": self.project_id,
        }))?;
        self.bus.emit(&Event::new(EventKind::Connect, "connect", "", ""));
        Ok(())
    }

    fn send_frame(&self, value: &serde_json::Value) -> Result<(), LinkError> {
        let mut last_write = self.last_write.lock().expect("pacing mutex poisoned");
        let due = *last_write + self.config.write_pacing;
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
        let mut socket = self.socket.lock().expect("socket mutex poisoned");
        socket.send(Message::Text(format!("{value}\n")))?;
        *last_write = Instant::now();
        Ok(())
    }

    /// Write a cloud variable. `literal` disables the `☁ ` name prefix.
    pub fn set(&self, name: &str, value: &str, literal: bool) -> Result<(), LinkError> {
        self.verify_value(value)?;
        let full_name = prefixed_name(name, literal);
        self.send_frame(&json!({
            "method": "set",
            "name": full_name,
            "value": value,
            "user": self.username,
            "project_id": self.project_id,
        }))?;
        self.cache.set(full_name.clone(), value.to_string());
        self.bus.emit(&Event::new(EventKind::Set, bare_name(&full_name), full_name, value));
        Ok(())
    }

    fn verify_value(&self, value: &str) -> Result<(), LinkError> {
        if value.parse::<f64>().is_ok() {
            if value.len() > 256 {
                return Err(LinkError::BadValue(value.to_string()));
            }
            return Ok(());
        }
        if self.config.accept_strs && self.config.flavor == Flavor::TurboWarp {
            return Ok(());
        }
        Err(LinkError::BadValue(value.to_string()))
    }

    /// Read the last cached value of a cloud variable (from the most recent
    /// `set` event observed, by this link or echoed back by the server).
    pub fn get(&self, name: &str, literal: bool) -> Option<String> {
        self.cache.get(&prefixed_name(name, literal))
    }

    /// Turn on `quick_get`/`quick_set` access to cloud variables by name.
    pub fn enable_quickaccess(&self) {
        self.quickaccess.store(true, Ordering::SeqCst);
    }

    /// Turn off `quick_get`/`quick_set` access.
    pub fn disable_quickaccess(&self) {
        self.quickaccess.store(false, Ordering::SeqCst);
    }

    /// `get` gated on [`Self::enable_quickaccess`] having been called.
    pub fn quick_get(&self, name: &str) -> Result<Option<String>, LinkError> {
        if !self.quickaccess.load(Ordering::SeqCst) {
            return Err(LinkError::QuickAccessDisabled);
        }
        Ok(self.get(name, false))
    }

    /// `set` gated on [`Self::enable_quickaccess`] having been called.
    pub fn quick_set(&self, name: &str, value: &str) -> Result<(), LinkError> {
        if !self.quickaccess.load(Ordering::SeqCst) {
            return Err(LinkError::QuickAccessDisabled);
        }
        self.set(name, value, false)
    }

    /// Fetching the platform's cloud-log HTTP history is out of scope; this
    /// always fails, matching the TurboWarp flavor's own behavior exactly
    /// and the platform flavor's behavior by this implementation's choice.
    pub fn get_cloud_logs(&self) -> Result<Vec<()>, LinkError> {
        Err(LinkError::NotSupported("cloud log retrieval"))
    }

    /// Which flavor this link was opened as. Consulted by layers built on
    /// top (e.g. `cloudsock-socket`'s per-flavor packet size) that don't
    /// otherwise see the link's configuration.
    pub fn flavor(&self) -> Flavor {
        self.config.flavor
    }

    /// The effective packet size this link writes with: the configured
    /// override, or the flavor's default.
    pub fn packet_size(&self) -> usize {
        self.config.packet_size()
    }

    pub fn on(&self, kind: EventKind, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.bus.on(kind, handler);
    }

    pub fn on_any(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.bus.on_any(handler);
    }

    fn spawn_reader(&mut self) {
        let socket = self.socket.clone();
        let bus = self.bus.clone();
        let cache = self.cache.clone();
        let running = self.running.clone();
        let retry = self.retry.clone();
        let config = self.config.clone();
        let session = self.session.clone();
        let username = self.username.clone();
        let project_id = self.project_id;
        let handle = std::thread::spawn(move || {
            reader_loop(socket, bus, cache, running, retry, config, session, username, project_id)
        });
        *self.reader.lock().expect("reader handle mutex poisoned") = Some(handle);
    }

    /// Stop the reader and release any threads blocked waiting on this link.
    /// `cascade` is accepted for API symmetry with [`crate::CloudLink`]'s
    /// downstream callers (a `CloudSocket`/`RequestHandler` layered on top
    /// propagate their own `stop(cascade)` here); this link itself has
    /// nothing further to cascade to.
    pub fn stop(&self, cascade: bool) {
        let _ = cascade;
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut socket) = self.socket.lock() {
            let _ = socket.close(None);
        }
        if let Some(handle) = self.reader.lock().expect("reader handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

/// One iteration locks `socket` only for the duration of a single `read()`,
/// which `apply_socket_timeout` bounds to `config.socket_timeout` — so a
/// concurrent `send_frame` is never starved for longer than that, even while
/// the link is otherwise idle. A closed/errored connection triggers
/// `CloudLink::reconnect` rather than ending the thread; the reader only
/// exits once `retry` gives up or `stop` flips `running` off.
#[allow(clippy::too_many_arguments)]
fn reader_loop(
    socket: Arc<Mutex<Socket>>,
    bus: EventBus,
    cache: VariableCache,
    running: Arc<AtomicBool>,
    retry: Arc<dyn RetryPolicy>,
    config: LinkConfig,
    session: Option<PlatformSession>,
    username: String,
    project_id: u64,
) {
    let mut attempt = 0u32;
    while running.load(Ordering::SeqCst) {
        let message = {
            let mut guard = socket.lock().expect("socket mutex poisoned");
            guard.read()
        };
        let message = match message {
            Ok(m) => {
                attempt = 0;
                m
            }
            Err(tungstenite::Error::Io(ref io_err))
                if matches!(io_err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(e) => {
                log::warn!("cloud link read error: {e}");
                let reconnected = CloudLink::reconnect(
                    &socket,
                    &config,
                    session.as_ref(),
                    &username,
                    project_id,
                    retry.as_ref(),
                    &bus,
                    &mut attempt,
                );
                if !reconnected {
                    running.store(false, Ordering::SeqCst);
                    break;
                }
                continue;
            }
        };
        let Message::Text(text) = message else { continue };
        for line in text.lines().filter(|l| !l.is_empty()) {
            match serde_json::from_str::<ServerFrame>(line) {
                Ok(frame) => dispatch_frame(&bus, &cache, frame),
                Err(e) => log::warn!("malformed server frame {line:?}: {e}"),
            }
        }
    }
}

fn send_handshake_frame(socket: &Arc<Mutex<Socket>>, username: &str, project_id: u64) -> Result<(), LinkError> {
    let value = json!({
        "method": "handshake",
        "user": username,
        "project_id": project_id,
    });
    let mut guard = socket.lock().expect("socket mutex poisoned");
    guard.send(Message::Text(format!("{value}\n")))?;
    Ok(())
}

/// Bound every blocking read/write on `socket` to `timeout`, so the reader
/// thread never holds its connection lock indefinitely: a read that finds
/// nothing pending returns (and releases the lock) within `timeout` instead
/// of blocking forever. Falls back to a logged no-op for any non-plain
/// stream variant this build doesn't construct.
fn apply_socket_timeout(socket: &Socket, timeout: Duration) {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => {
            if let Err(e) = stream.set_read_timeout(Some(timeout)) {
                log::warn!("failed to set cloud link read timeout: {e}");
            }
            if let Err(e) = stream.set_write_timeout(Some(timeout)) {
                log::warn!("failed to set cloud link write timeout: {e}");
            }
        }
        _ => log::warn!("cloud link socket_timeout not applied: unsupported stream variant"),
    }
}

fn dispatch_frame(bus: &EventBus, cache: &VariableCache, frame: ServerFrame) {
    let kind = match frame.method.as_str() {
        "set" => EventKind::Set,
        "delete" => EventKind::Delete,
        "create" => EventKind::Create,
        other => {
            log::debug!("ignoring unrecognized method {other:?}");
            return;
        }
    };
    let value = frame.value.map(value_to_text).unwrap_or_default();
    if kind == EventKind::Set {
        cache.set(frame.name.clone(), value.clone());
    }
    let bare = bare_name(&frame.name);
    bus.emit(&Event::new(kind, bare, frame.name, value));
}

fn prefixed_name(name: &str, literal: bool) -> String {
    if literal {
        name.to_string()
    } else {
        format!("{NAME_PREFIX}{}", bare_name(name))
    }
}

fn bare_name(name: &str) -> String {
    name.strip_prefix(NAME_PREFIX).unwrap_or(name).to_string()
}

/// Render a server-sent JSON value the way cloud variables actually carry
/// it: a bare string keeps its text, everything else is its JSON form.
fn value_to_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_name_adds_and_strips_the_marker() {
        assert_eq!(prefixed_name("score", false), "\u{2601} score");
        assert_eq!(prefixed_name("\u{2601} score", false), "\u{2601} score");
        assert_eq!(prefixed_name("score", true), "score");
    }

    #[test]
    fn bare_name_strips_the_marker_once() {
        assert_eq!(bare_name("\u{2601} score"), "score");
        assert_eq!(bare_name("score"), "score");
    }
}
