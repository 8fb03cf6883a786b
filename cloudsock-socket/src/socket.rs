//! The connection acceptor and per-client send/receive path built on top of
//! the framing decision engine.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use cloudsock_crypto::cipher::Cipher;
use cloudsock_crypto::codec;
use cloudsock_crypto::material::SecurityMaterial;
use cloudsock_link::CloudLink;
use cloudsock_proto::{framing, ClientState, Decision, Event, EventKind, FragmentTable, SaltWatermark};

use crate::client::ClientEntry;
use crate::config::SocketConfig;
use crate::errors::SocketError;
use crate::table::TableView;

const FROM_CLIENT: &str = "FROM_CLIENT";
const TO_CLIENT_VARS: usize = 4;
/// Digits of salt kept in the clear after a secure packet's ciphertext.
const SALT_DIGITS: usize = 15;
/// `ciphertext || salt` plus the `.{client_id}{nonce}{seq}` tail the framing
/// layer strips back off; kept as slack when sizing secure chunks.
const SECURE_OVERHEAD: usize = 28;

/// What a freshly accepted (or freshly key-exchanged) client looks like to
/// an observer registered via [`CloudSocket::on_new_client`].
#[derive(Clone, Debug)]
pub struct NewClientEvent {
    pub client_id: String,
    pub username: Option<String>,
    pub is_secure: bool,
}

type NewClientHook = Box<dyn Fn(&NewClientEvent) + Send + Sync>;

/// Accepts clients over a [`CloudLink`] and exposes a byte-stream send/recv
/// API per client, built on the framing protocol's decision engine.
pub struct CloudSocket {
    link: Arc<CloudLink>,
    config: SocketConfig,
    security: Option<SecurityMaterial>,
    clients: Mutex<HashMap<String, ClientEntry>>,
    fragments: Mutex<FragmentTable>,
    watermark: Mutex<SaltWatermark>,
    new_clients: Mutex<VecDeque<(String, Option<String>)>>,
    accepted: Condvar,
    update: Mutex<u64>,
    any_update: Condvar,
    hooks: Mutex<Vec<NewClientHook>>,
}

impl CloudSocket {
    /// Build a socket over an already-handshaken link. `security` is the
    /// server's own key-exchange material, used to decrypt secure-connect
    /// fragments; `None` means every `_safe_connect:` attempt is rejected.
    pub fn new(link: Arc<CloudLink>, security: Option<SecurityMaterial>, config: SocketConfig) -> Arc<Self> {
        Arc::new(Self {
            link,
            config,
            security,
            clients: Mutex::new(HashMap::new()),
            fragments: Mutex::new(FragmentTable::new()),
            watermark: Mutex::new(SaltWatermark::new()),
            new_clients: Mutex::new(VecDeque::new()),
            accepted: Condvar::new(),
            update: Mutex::new(0),
            any_update: Condvar::new(),
            hooks: Mutex::new(Vec::new()),
        })
    }

    /// Start accepting clients: installs the `FROM_CLIENT` handler on the
    /// underlying link. Returns `self` so construction can chain, matching
    /// the reference dispatcher's own `listen()`.
    pub fn listen(self: &Arc<Self>) -> Arc<Self> {
        let socket = Arc::clone(self);
        self.link.on(EventKind::Set, move |event| socket.handle_packet(event));
        Arc::clone(self)
    }

    /// Register a callback invoked (from the link's reader thread) whenever
    /// a new client finishes connecting, secure or not.
    pub fn on_new_client(&self, hook: impl Fn(&NewClientEvent) + Send + Sync + 'static) {
        self.hooks.lock().expect("new-client hook list mutex poisoned").push(Box::new(hook));
    }

    fn handle_packet(&self, event: &Event) {
        if event.kind != EventKind::Set || event.name != FROM_CLIENT {
            return;
        }
        let now = wall_clock_centiseconds();
        let decision = {
            let mut clients = self.clients.lock().expect("client table mutex poisoned");
            let mut fragments = self.fragments.lock().expect("fragment table mutex poisoned");
            let mut watermark = self.watermark.lock().expect("salt watermark mutex poisoned");
            let mut view = TableView(&mut clients);
            framing::decide(&event.value, &mut fragments, &mut view, self.security.as_ref(), &mut watermark, now)
        };
        self.apply_decision(decision, event);
    }

    fn apply_decision(&self, decision: Decision, event: &Event) {
        match decision {
            Decision::FragmentStored | Decision::Buffered => {}
            Decision::Rejected(e) => log::debug!("dropped malformed FROM_CLIENT packet: {e}"),
            Decision::MessageReady { client_id, message } => {
                let channel = {
                    let clients = self.clients.lock().expect("client table mutex poisoned");
                    clients.get(&client_id).map(|c| c.channel.clone())
                };
                if let Some(channel) = channel {
                    channel.push(message);
                    self.bump_update();
                } else {
                    log::debug!("message ready for unknown client {client_id}");
                }
            }
            Decision::NewClient { client_id } => {
                let username = event.user().ok();
                let is_turbowarp = self.link.flavor() == cloudsock_link::Flavor::TurboWarp;
                let entry = ClientEntry::insecure(client_id.clone(), username.clone(), is_turbowarp);
                self.clients.lock().expect("client table mutex poisoned").insert(client_id.clone(), entry);
                self.accept_new(client_id, username, false);
            }
            Decision::NewSecureClient { client_id, session_key } => {
                let username = event.user().ok();
                let is_turbowarp = self.link.flavor() == cloudsock_link::Flavor::TurboWarp;
                let cipher = Cipher::new(&session_key);
                let entry = ClientEntry::secure(client_id.clone(), username.clone(), is_turbowarp, cipher);
                self.clients.lock().expect("client table mutex poisoned").insert(client_id.clone(), entry);
                self.accept_new(client_id, username, true);
            }
        }
    }

    fn accept_new(&self, client_id: String, username: Option<String>, is_secure: bool) {
        self.new_clients
            .lock()
            .expect("new-client queue mutex poisoned")
            .push_back((client_id.clone(), username.clone()));
        self.accepted.notify_all();
        self.bump_update();

        let event = NewClientEvent { client_id, username, is_secure };
        for hook in self.hooks.lock().expect("new-client hook list mutex poisoned").iter() {
            hook(&event);
        }
    }

    fn bump_update(&self) {
        *self.update.lock().expect("activity counter mutex poisoned") += 1;
        self.any_update.notify_all();
    }

    /// Block until a new client has connected, or `timeout` elapses.
    pub fn accept(&self, timeout: Option<Duration>) -> Result<(String, Option<String>), SocketError> {
        let mut queue = self.new_clients.lock().expect("new-client queue mutex poisoned");
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(entry) = queue.pop_front() {
                return Ok(entry);
            }
            match deadline {
                None => queue = self.accepted.wait(queue).expect("new-client queue mutex poisoned"),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(SocketError::Timeout);
                    }
                    let (next, result) =
                        self.accepted.wait_timeout(queue, deadline - now).expect("new-client queue mutex poisoned");
                    queue = next;
                    if result.timed_out() && queue.is_empty() {
                        return Err(SocketError::Timeout);
                    }
                }
            }
        }
    }

    /// Block until `client_id` has a complete message waiting, or `timeout`
    /// elapses.
    pub fn recv_from_client(&self, client_id: &str, timeout: Option<Duration>) -> Result<String, SocketError> {
        let channel = self.channel_for(client_id)?;
        channel.recv(timeout).ok_or(SocketError::Timeout)
    }

    /// Block (with a 30 s default poll period, matching the reference
    /// dispatcher's loop) until any client activity has occurred since the
    /// last call observed `since`, returning the new counter value.
    pub fn wait_for_activity(&self, since: u64, timeout: Duration) -> u64 {
        let guard = self.update.lock().expect("activity counter mutex poisoned");
        if *guard != since {
            return *guard;
        }
        let (guard, _) = self.any_update.wait_timeout(guard, timeout).expect("activity counter mutex poisoned");
        *guard
    }

    fn channel_for(&self, client_id: &str) -> Result<Arc<crate::client::ClientChannel>, SocketError> {
        let clients = self.clients.lock().expect("client table mutex poisoned");
        clients
            .get(client_id)
            .map(|c| c.channel.clone())
            .ok_or_else(|| SocketError::UnknownClient(client_id.to_string()))
    }

    /// Split, frame, and (for secure clients) encrypt `data`, then write it
    /// to `client_id` over a rotating `TO_CLIENT_1..4` variable.
    pub fn send(&self, client_id: &str, data: &str) -> Result<(), SocketError> {
        let (channel, is_secure, cipher, is_turbowarp) = {
            let clients = self.clients.lock().expect("client table mutex poisoned");
            let client = clients.get(client_id).ok_or_else(|| SocketError::UnknownClient(client_id.to_string()))?;
            (client.channel.clone(), client.is_secure(), client.cipher().cloned(), client.is_turbowarp)
        };
        let _send_guard = channel.send_lock.lock().expect("client send mutex poisoned");

        let packet_size =
            self.config.packet_size.unwrap_or_else(|| if is_turbowarp { 98_800 } else { self.link.packet_size() });

        if is_secure {
            let cipher = cipher.ok_or_else(|| SocketError::NotSecure(client_id.to_string()))?;
            self.send_secure(client_id, data, packet_size, &cipher)
        } else {
            self.send_insecure(client_id, data, packet_size)
        }
    }

    fn send_insecure(&self, client_id: &str, data: &str, packet_size: usize) -> Result<(), SocketError> {
        let digits = codec::encode(data);
        let chunks = chunk_chars(&digits, packet_size.max(1));
        let last = chunks.len().saturating_sub(1);
        let mut var = 1usize;
        for (idx, chunk) in chunks.iter().enumerate() {
            let terminal = idx == last;
            let value = build_insecure_packet(chunk, client_id, random_nonce(), idx, terminal);
            let dest = if terminal { random_to_client_var() } else { var };
            self.write_to_client(dest, &value)?;
            var = var % TO_CLIENT_VARS + 1;
        }
        Ok(())
    }

    fn send_secure(&self, client_id: &str, data: &str, packet_size: usize, cipher: &Cipher) -> Result<(), SocketError> {
        let unit = (packet_size / 2).saturating_sub(SECURE_OVERHEAD).max(1);
        let chunks = chunk_chars(data, unit);
        let last = chunks.len().saturating_sub(1);
        let mut var = 1usize;
        for (idx, chunk) in chunks.iter().enumerate() {
            let terminal = idx == last;
            let salt = wall_clock_centiseconds();
            let value = build_secure_packet(cipher, chunk, salt, client_id, random_nonce(), idx, terminal);
            let dest = if terminal { random_to_client_var() } else { var };
            self.write_to_client(dest, &value)?;
            var = var % TO_CLIENT_VARS + 1;
        }
        Ok(())
    }

    fn write_to_client(&self, var: usize, value: &str) -> Result<(), SocketError> {
        self.link.set(&format!("TO_CLIENT_{var}"), value, true).map_err(SocketError::from)
    }

    /// Stop accepting/delivering: releases every thread blocked in `accept`
    /// or `recv_from_client`, then cascades to the underlying link.
    pub fn stop(&self, cascade: bool) {
        self.accepted.notify_all();
        self.any_update.notify_all();
        for client in self.clients.lock().expect("client table mutex poisoned").values() {
            client.channel.wake_all();
        }
        if cascade {
            self.link.stop(cascade);
        }
    }
}

fn chunk_chars(s: &str, size: usize) -> Vec<String> {
    if s.is_empty() {
        return vec![String::new()];
    }
    let chars: Vec<char> = s.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

/// One insecure wire packet: `[-]1{digits}.{client_id}{nonce:03}{idx}`. The
/// leading `-` marks "more parts follow"; its absence marks this as the
/// terminal part of the message. The `1` right after the sign is the normal-
/// message type digit every packet on the wire carries, matching the
/// receive side's `packet::parse`, which always consumes one type digit
/// before the payload.
fn build_insecure_packet(digit_chunk: &str, client_id: &str, nonce: u32, idx: usize, terminal: bool) -> String {
    let sign = if terminal { "" } else { "-" };
    format!("{sign}1{digit_chunk}.{client_id}{nonce:03}{idx}")
}

/// One secure wire packet: the plaintext chunk encrypted under `salt`, codec
/// encoded, with the salt's own digits appended in the clear (`framing`'s
/// `secure_message_part` splits the last 15 digits back off) and the normal-
/// message type digit `1` prepended, same as the insecure packet above.
fn build_secure_packet(
    cipher: &Cipher,
    plaintext_chunk: &str,
    salt: u64,
    client_id: &str,
    nonce: u32,
    idx: usize,
    terminal: bool,
) -> String {
    let ciphertext = cipher.encrypt(plaintext_chunk, salt);
    let digits = codec::encode(&ciphertext);
    let sign = if terminal { "" } else { "-" };
    format!("{sign}1{digits}{salt:0width$}.{client_id}{nonce:03}{idx}", width = SALT_DIGITS)
}

fn random_nonce() -> u32 {
    let mut buf = [0u8; 2];
    getrandom::getrandom(&mut buf).expect("getrandom failed");
    u16::from_le_bytes(buf) as u32 % 1000
}

fn random_to_client_var() -> usize {
    let mut buf = [0u8; 1];
    getrandom::getrandom(&mut buf).expect("getrandom failed");
    1 + (buf[0] as usize % TO_CLIENT_VARS)
}

fn wall_clock_centiseconds() -> u64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch");
    now.as_secs() * 100 + u64::from(now.subsec_millis()) / 10
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn chunk_chars_splits_by_char_count_and_handles_empty() {
        assert_eq!(chunk_chars("abcdef", 2), vec!["ab", "cd", "ef"]);
        assert_eq!(chunk_chars("", 10), vec![""]);
        assert_eq!(chunk_chars("abc", 10), vec!["abc"]);
    }

    #[test]
    fn insecure_packet_marks_continuation_with_a_leading_dash() {
        let digits = codec::encode("hi");
        let continuation = build_insecure_packet(&digits, "12345", 7, 0, false);
        assert_eq!(continuation, format!("-1{digits}.123450070"));
        let terminal = build_insecure_packet(&digits, "12345", 7, 1, true);
        assert_eq!(terminal, format!("1{digits}.123450071"));
    }

    #[test]
    fn secure_packet_decrypts_back_to_the_original_chunk() {
        let cipher = Cipher::new(&BigUint::from(424242u64));
        let salt = 170_000_000_000u64;
        let value = build_secure_packet(&cipher, "hi there", salt, "54321", 3, 0, true);

        assert!(!value.starts_with('-'));
        let body = value.split('.').next().unwrap();
        assert_eq!(&body[..1], "1");
        let body = &body[1..];
        assert!(body.len() > SALT_DIGITS);
        let (ciphertext_digits, salt_digits) = body.split_at(body.len() - SALT_DIGITS);
        assert_eq!(salt_digits.parse::<u64>().unwrap(), salt);

        let ciphertext = codec::decode(ciphertext_digits);
        assert_eq!(cipher.decrypt(&ciphertext, salt).unwrap(), "hi there");
    }

    #[test]
    fn nonce_and_var_choice_stay_in_range() {
        for _ in 0..50 {
            assert!(random_nonce() < 1000);
            let v = random_to_client_var();
            assert!((1..=TO_CLIENT_VARS).contains(&v));
        }
    }

    #[test]
    fn wall_clock_centiseconds_does_not_go_backwards() {
        let a = wall_clock_centiseconds();
        let b = wall_clock_centiseconds();
        assert!(b >= a);
    }
}
