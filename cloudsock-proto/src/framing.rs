//! The framing decision engine: given one parsed packet, the fragment table,
//! a salt watermark, and a view onto the client table, decide what happened
//! and what the caller (the owner of the actual client table, mutexes, and
//! sockets) should do about it.
//!
//! This module does no I/O and owns no threads; it is handed closures/trait
//! objects for the state it needs to read or mutate, so the whole decision
//! tree is exercised by plain unit tests.

use cloudsock_crypto::{cipher::Cipher, codec, material::SecurityMaterial};
use num_bigint::BigUint;

use crate::fragments::FragmentTable;
use crate::handshake;
use crate::packet::{self, RawPacket};
use crate::salt::SaltWatermark;
use crate::FramingError;

/// The framing-relevant state of one already-known client.
pub trait ClientState {
    fn is_secure(&self) -> bool;
    fn cipher(&self) -> Option<&Cipher>;
    /// Append a chunk to the in-progress message buffer. For an insecure
    /// client this is the raw, not-yet-decoded digit chunk; for a secure
    /// client this is already-decrypted plaintext.
    fn push_chunk(&mut self, chunk: &str);
    /// Drain the message buffer, returning everything pushed since the last
    /// drain.
    fn take_buffer(&mut self) -> String;
}

/// Read/write access to the set of already-connected clients. Creating a new
/// client is left to the caller (it owns the concrete client type, its
/// mutexes, and its queues); this trait only exposes lookups against
/// clients that already exist.
pub trait ClientTable {
    type Client: ClientState;
    fn get_mut(&mut self, client_id: &str) -> Option<&mut Self::Client>;
    fn contains(&self, client_id: &str) -> bool;
}

/// What the framing layer decided to do with one inbound packet.
#[derive(Debug)]
pub enum Decision {
    /// Stored a key-exchange fragment; nothing further to do.
    FragmentStored,
    /// A complete, ready-to-deliver message for an existing client.
    MessageReady { client_id: String, message: String },
    /// More parts of a message are still expected.
    Buffered,
    /// A brand-new, unauthenticated client connected.
    NewClient { client_id: String },
    /// A brand-new client completed a key exchange.
    NewSecureClient { client_id: String, session_key: BigUint },
    /// The packet was malformed, hostile, or failed an invariant; dropped
    /// silently by design (see module docs on failure containment).
    Rejected(FramingError),
}

/// Decide what one `FROM_CLIENT` write means, given the current framing
/// state. `now_centiseconds` is the caller's wall clock in the same unit as
/// salts (hundredths of a second), passed in rather than read here so this
/// function stays pure.
pub fn decide<T: ClientTable>(
    raw_value: &str,
    fragments: &mut FragmentTable,
    clients: &mut T,
    security: Option<&SecurityMaterial>,
    watermark: &mut SaltWatermark,
    now_centiseconds: u64,
) -> Decision {
    let parsed = match packet::parse(raw_value) {
        Ok(p) => p,
        Err(e) => return Decision::Rejected(e),
    };

    if parsed.kind == 0 {
        return match split_fragment(&parsed.body) {
            Ok((id, data)) => match fragments.insert(id, data) {
                Ok(()) => Decision::FragmentStored,
                Err(e) => Decision::Rejected(e),
            },
            Err(e) => Decision::Rejected(e),
        };
    }

    let is_connect = handshake::is_safe_connect(&parsed.body) || handshake::is_plain_connect(&parsed.body);

    if !is_connect && clients.contains(&parsed.client_id) {
        let client = clients.get_mut(&parsed.client_id).expect("just checked contains");
        return if client.is_secure() {
            secure_message_part(client, &parsed, watermark, now_centiseconds)
        } else {
            insecure_message_part(client, &parsed)
        };
    }

    if handshake::is_safe_connect(&parsed.body) {
        return new_secure_client(&parsed, fragments, security, watermark, now_centiseconds);
    }

    Decision::NewClient { client_id: parsed.client_id }
}

fn split_fragment(body: &str) -> Result<(String, String), FramingError> {
    if body.len() < 5 {
        return Err(FramingError::Malformed);
    }
    Ok((body[..5].to_string(), body[5..].to_string()))
}

fn insecure_message_part<C: ClientState>(client: &mut C, packet: &RawPacket) -> Decision {
    client.push_chunk(&packet.body);
    if !packet.terminal {
        return Decision::Buffered;
    }
    let buffered = client.take_buffer();
    Decision::MessageReady { client_id: packet.client_id.clone(), message: codec::decode(&buffered) }
}

fn secure_message_part<C: ClientState>(
    client: &mut C,
    packet: &RawPacket,
    watermark: &mut SaltWatermark,
    now_centiseconds: u64,
) -> Decision {
    const SALT_DIGITS: usize = 15;
    if packet.body.len() < SALT_DIGITS {
        return Decision::Rejected(FramingError::Malformed);
    }
    let split_at = packet.body.len() - SALT_DIGITS;
    let (ciphertext_digits, salt_digits) = packet.body.split_at(split_at);

    let salt: u64 = match salt_digits.parse() {
        Ok(n) => n,
        Err(_) => return Decision::Rejected(FramingError::Malformed),
    };
    if let Err(e) = watermark.accept(salt, now_centiseconds) {
        return Decision::Rejected(e);
    }

    let cipher = match client.cipher() {
        Some(c) => c.clone(),
        None => return Decision::Rejected(FramingError::Malformed),
    };
    let ciphertext = codec::decode(ciphertext_digits);
    let plaintext = match cipher.decrypt(&ciphertext, salt) {
        Ok(text) => text,
        Err(_) => return Decision::Rejected(FramingError::Malformed),
    };

    client.push_chunk(&plaintext);
    if !packet.terminal {
        return Decision::Buffered;
    }
    Decision::MessageReady { client_id: packet.client_id.clone(), message: client.take_buffer() }
}

fn new_secure_client(
    packet: &RawPacket,
    fragments: &FragmentTable,
    security: Option<&SecurityMaterial>,
    watermark: &mut SaltWatermark,
    now_centiseconds: u64,
) -> Decision {
    let material = match security {
        Some(m) => m,
        None => return Decision::Rejected(FramingError::HandshakeRejected),
    };

    let parsed = match handshake::parse_safe_connect(&packet.body) {
        Ok(p) => p,
        Err(e) => return Decision::Rejected(e),
    };

    let outer_salt: u64 = match parsed.salt_digits.parse() {
        Ok(n) => n,
        Err(_) => return Decision::Rejected(FramingError::Malformed),
    };
    if let Err(e) = watermark.accept(outer_salt, now_centiseconds) {
        return Decision::Rejected(e);
    }

    let reassembled = match fragments.reassemble(&parsed.fragment_ids) {
        Ok(s) => s,
        Err(e) => return Decision::Rejected(e),
    };

    let session_key = match handshake::derive_session_key(material, &reassembled, &parsed.salt_digits) {
        Ok(k) => k,
        Err(e) => return Decision::Rejected(e),
    };

    if !handshake::salt_binds(&session_key, &parsed.salt_digits) {
        return Decision::Rejected(FramingError::HandshakeRejected);
    }

    Decision::NewSecureClient { client_id: packet.client_id.clone(), session_key }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeClient {
        secure: bool,
        cipher: Option<Cipher>,
        buffer: String,
    }

    impl ClientState for FakeClient {
        fn is_secure(&self) -> bool {
            self.secure
        }
        fn cipher(&self) -> Option<&Cipher> {
            self.cipher.as_ref()
        }
        fn push_chunk(&mut self, chunk: &str) {
            self.buffer.push_str(chunk);
        }
        fn take_buffer(&mut self) -> String {
            std::mem::take(&mut self.buffer)
        }
    }

    #[derive(Default)]
    struct FakeTable(HashMap<String, FakeClient>);

    impl ClientTable for FakeTable {
        type Client = FakeClient;
        fn get_mut(&mut self, client_id: &str) -> Option<&mut FakeClient> {
            self.0.get_mut(client_id)
        }
        fn contains(&self, client_id: &str) -> bool {
            self.0.contains_key(client_id)
        }
    }

    #[test]
    fn unknown_client_plain_connect_becomes_new_client() {
        let mut fragments = FragmentTable::new();
        let mut clients = FakeTable::default();
        let mut watermark = SaltWatermark::new();
        let body = codec::encode("_connect");
        let raw = format!("1{body}.1234500101");
        match decide(&raw, &mut fragments, &mut clients, None, &mut watermark, 0) {
            Decision::NewClient { client_id } => assert_eq!(client_id, "12345"),
            other => panic!("expected NewClient, got {other:?}"),
        }
    }

    #[test]
    fn insecure_round_trip_delivers_on_terminal_packet() {
        let mut fragments = FragmentTable::new();
        let mut clients = FakeTable::default();
        clients.0.insert("12345".to_string(), FakeClient::default());
        let mut watermark = SaltWatermark::new();

        let digits = codec::encode("hello");
        let raw = format!("1{digits}.1234500101");
        match decide(&raw, &mut fragments, &mut clients, None, &mut watermark, 0) {
            Decision::MessageReady { client_id, message } => {
                assert_eq!(client_id, "12345");
                assert_eq!(message, "hello");
            }
            other => panic!("expected MessageReady, got {other:?}"),
        }
    }

    #[test]
    fn insecure_continuation_buffers_until_terminal() {
        let mut fragments = FragmentTable::new();
        let mut clients = FakeTable::default();
        clients.0.insert("12345".to_string(), FakeClient::default());
        let mut watermark = SaltWatermark::new();

        let digits = codec::encode("hel");
        let raw = format!("-1{digits}.1234500101");
        match decide(&raw, &mut fragments, &mut clients, None, &mut watermark, 0) {
            Decision::Buffered => {}
            other => panic!("expected Buffered, got {other:?}"),
        }

        let digits2 = codec::encode("lo");
        let raw2 = format!("1{digits2}.1234500102");
        match decide(&raw2, &mut fragments, &mut clients, None, &mut watermark, 0) {
            Decision::MessageReady { message, .. } => assert_eq!(message, "hello"),
            other => panic!("expected MessageReady, got {other:?}"),
        }
    }

    #[test]
    fn key_fragment_is_stored_and_duplicates_rejected() {
        let mut fragments = FragmentTable::new();
        let mut clients = FakeTable::default();
        let mut watermark = SaltWatermark::new();

        let raw = "000001hello.1234500101";
        assert!(matches!(
            decide(raw, &mut fragments, &mut clients, None, &mut watermark, 0),
            Decision::FragmentStored
        ));
        assert!(matches!(
            decide(raw, &mut fragments, &mut clients, None, &mut watermark, 0),
            Decision::Rejected(FramingError::DuplicateFragment)
        ));
    }

    #[test]
    fn secure_handshake_without_configured_security_is_rejected() {
        let mut fragments = FragmentTable::new();
        let mut clients = FakeTable::default();
        let mut watermark = SaltWatermark::new();
        let marker = codec::encode("_safe_connect:");
        let raw = format!("1{marker}0000100002170000000000001.1234500101");
        assert!(matches!(
            decide(&raw, &mut fragments, &mut clients, None, &mut watermark, 170_000_000_030),
            Decision::Rejected(FramingError::HandshakeRejected)
        ));
    }
}
