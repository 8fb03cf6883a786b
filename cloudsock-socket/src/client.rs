//! One accepted client: its framing state (touched only by the reader) and
//! its send/receive channel (touched by any application thread).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use cloudsock_crypto::cipher::Cipher;
use cloudsock_proto::ClientState;

/// Inbound messages waiting to be picked up by `recv_from_client`, plus the
/// mutex that serializes concurrent `send`s to this client.
pub struct ClientChannel {
    inbox: Mutex<VecDeque<String>>,
    inbox_ready: Condvar,
    pub(crate) send_lock: Mutex<()>,
}

impl Default for ClientChannel {
    fn default() -> Self {
        Self { inbox: Mutex::new(VecDeque::new()), inbox_ready: Condvar::new(), send_lock: Mutex::new(()) }
    }
}

impl ClientChannel {
    pub(crate) fn push(&self, message: String) {
        self.inbox.lock().expect("client inbox mutex poisoned").push_back(message);
        self.inbox_ready.notify_all();
    }

    /// Wake everyone blocked in `recv` without delivering anything, used by
    /// `CloudSocket::stop` so no thread is stranded.
    pub(crate) fn wake_all(&self) {
        self.inbox_ready.notify_all();
    }

    pub(crate) fn recv(&self, timeout: Option<Duration>) -> Option<String> {
        let mut inbox = self.inbox.lock().expect("client inbox mutex poisoned");
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(message) = inbox.pop_front() {
                return Some(message);
            }
            match deadline {
                None => inbox = self.inbox_ready.wait(inbox).expect("client inbox mutex poisoned"),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let (next, result) =
                        self.inbox_ready.wait_timeout(inbox, deadline - now).expect("client inbox mutex poisoned");
                    inbox = next;
                    if result.timed_out() && inbox.is_empty() {
                        return None;
                    }
                }
            }
        }
    }
}

/// One accepted client, as held by the socket's client table.
pub struct ClientEntry {
    pub client_id: String,
    pub username: Option<String>,
    pub is_turbowarp: bool,
    is_secure: bool,
    cipher: Option<Cipher>,
    partial: String,
    pub(crate) channel: std::sync::Arc<ClientChannel>,
}

impl ClientEntry {
    pub fn insecure(client_id: String, username: Option<String>, is_turbowarp: bool) -> Self {
        Self {
            client_id,
            username,
            is_turbowarp,
            is_secure: false,
            cipher: None,
            partial: String::new(),
            channel: Default::default(),
        }
    }

    pub fn secure(client_id: String, username: Option<String>, is_turbowarp: bool, cipher: Cipher) -> Self {
        Self {
            client_id,
            username,
            is_turbowarp,
            is_secure: true,
            cipher: Some(cipher),
            partial: String::new(),
            channel: Default::default(),
        }
    }
}

impl ClientState for ClientEntry {
    fn is_secure(&self) -> bool {
        self.is_secure
    }

    fn cipher(&self) -> Option<&Cipher> {
        self.cipher.as_ref()
    }

    fn push_chunk(&mut self, chunk: &str) {
        self.partial.push_str(chunk);
    }

    fn take_buffer(&mut self) -> String {
        std::mem::take(&mut self.partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_returns_an_already_queued_message_without_blocking() {
        let channel = ClientChannel::default();
        channel.push("hello".to_string());
        assert_eq!(channel.recv(Some(Duration::from_millis(50))), Some("hello".to_string()));
    }

    #[test]
    fn recv_times_out_on_an_empty_queue() {
        let channel = ClientChannel::default();
        assert_eq!(channel.recv(Some(Duration::from_millis(10))), None);
    }

    #[test]
    fn recv_wakes_up_when_another_thread_pushes() {
        use std::sync::Arc;
        use std::thread;

        let channel = Arc::new(ClientChannel::default());
        let writer = channel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.push("delayed".to_string());
        });
        assert_eq!(channel.recv(Some(Duration::from_secs(2))), Some("delayed".to_string()));
        handle.join().unwrap();
    }

    #[test]
    fn client_state_buffers_chunks_until_drained() {
        let mut client = ClientEntry::insecure("12345".to_string(), None, false);
        assert!(!client.is_secure());
        client.push_chunk("hel");
        client.push_chunk("lo");
        assert_eq!(client.take_buffer(), "hello");
        assert_eq!(client.take_buffer(), "");
    }
}
