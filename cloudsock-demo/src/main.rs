//! Secure handshake + one encrypted request/response round trip over an
//! in-process mock cloud-variable channel.
//!
//! There is no reachable `wss://clouddata.scratch.mit.edu` in this
//! environment, so this demo plays both ends of the wire itself: a single
//! `CloudLink` connects to a local mock server that echoes every frame it
//! receives, which lets the demo's own outbound `TO_CLIENT_n` writes and a
//! hand-built `FROM_CLIENT` handshake loop back through the same
//! `CloudSocket` instance.
//!
//! # What this does
//!
//! 1. Start a mock cloud-variable server (TCP + a `tungstenite` echo loop)
//! 2. Connect a `CloudLink`, wrap it in a `CloudSocket` configured with EC
//!    key-exchange material, and start the request dispatch loop
//! 3. Register `echo` and `add` request handlers
//! 4. Hand-build the client side of an EC `_safe_connect:` handshake: a key
//!    fragment packet, then the safe-connect packet referencing it
//! 5. Derive the same session key independently and send one encrypted,
//!    multi-part request
//! 6. Read back and decrypt the response
//!
//! # Run
//! ```
//! cargo run -p cloudsock-demo
//! ```

use std::net::TcpListener;
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use num_bigint::BigUint;
use tungstenite::Message;

use cloudsock_crypto::cipher::Cipher;
use cloudsock_crypto::codec;
use cloudsock_crypto::ec;
use cloudsock_crypto::material::SecurityMaterial;
use cloudsock_link::{CloudLink, EventKind, LinkConfig, NoRetries};
use cloudsock_request::{Arg, CoerceKind, Registration, RequestError, RequestHandler};
use cloudsock_socket::{CloudSocket, SocketConfig};

const FRAGMENT_ID: &str = "00001";
const CLIENT_ID: &str = "99999";

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "cloudsock_socket=info,cloudsock_request=info,cloudsock_demo=info");
        }
    }
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("✗ {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    // ── 1. Mock server ───────────────────────────────────────────────────
    println!("🔌 Starting mock cloud-variable server…");
    let endpoint = spawn_mock_cloud_server()?;

    // ── 2. Server-side link + socket ─────────────────────────────────────
    let server_keys = ec::KeyPair::generate();
    let security = SecurityMaterial::Ec { scalar: server_keys.scalar_bytes() };

    let config = LinkConfig::turbowarp(endpoint, "cloudsock-demo");
    let link = Arc::new(CloudLink::connect_turbowarp(config, 1, "cloudsock-demo", NoRetries)?);
    println!("✓ link connected");

    let (echo_tx, echo_rx) = mpsc::channel::<String>();
    let echo_tx = Mutex::new(echo_tx);
    link.on(EventKind::Set, move |event| {
        if event.name.starts_with("TO_CLIENT_") {
            let _ = echo_tx.lock().expect("echo channel mutex poisoned").send(event.value.clone());
        }
    });

    let socket = CloudSocket::new(link.clone(), Some(security), SocketConfig::default());
    socket.listen();

    // ── 3. Request handlers ──────────────────────────────────────────────
    let handler = RequestHandler::new(socket);
    handler.register(
        Registration::new("echo", |args, _kwargs| {
            let text = args
                .first()
                .and_then(Arg::as_str)
                .ok_or_else(|| RequestError::Handler("echo needs a string".to_string()))?;
            let times = args.get(1).and_then(Arg::as_int).unwrap_or(1).max(0) as usize;
            log::info!("echo handler ran with {text:?} x{times}");
            Ok(Arg::Str(text.repeat(times)))
        })
        .param(CoerceKind::Str)
        .param(CoerceKind::Int),
    );
    handler.register(
        Registration::new("add", |args, _kwargs| {
            let a = args.first().and_then(Arg::as_int).unwrap_or(0);
            let b = args.get(1).and_then(Arg::as_int).unwrap_or(0);
            Ok(Arg::Int(a + b))
        })
        .param(CoerceKind::Int)
        .param(CoerceKind::Int)
        .allow_python_syntax(true),
    );
    handler.spawn();
    println!("✓ handlers registered: echo, add");

    // ── 4. Hand-built client-side EC handshake ───────────────────────────
    let client_keys = ec::KeyPair::generate();
    let public_hex = hex_encode(&client_keys.public_bytes());
    link.set("FROM_CLIENT", &fragment_packet(&public_hex), true)?;
    std::thread::sleep(Duration::from_millis(300));

    let handshake_salt = centiseconds_now();
    link.set("FROM_CLIENT", &safe_connect_packet(handshake_salt), true)?;
    std::thread::sleep(Duration::from_millis(300));
    println!("✓ secure handshake sent (salt {handshake_salt})");

    // ── 5. Derive the session key and send one encrypted request ────────
    let session_key = derive_client_session_key(&client_keys, &server_keys, handshake_salt);
    let cipher = Cipher::new(&session_key);

    let request_salt = centiseconds_now().max(handshake_salt + 1);
    let request = "echo \"demo\" 2;add(2, 3)";
    link.set("FROM_CLIENT", &secure_request_packet(&cipher, request, request_salt), true)?;
    println!("✓ encrypted request sent: {request}");

    // ── 6. Read back and decrypt the response ────────────────────────────
    let raw_response = echo_rx.recv_timeout(Duration::from_secs(2))?;
    let response = decrypt_response(&cipher, &raw_response)?;
    println!("✓ decrypted response: {response}");

    handler.stop();
    Ok(())
}

/// Binds a loopback listener and echoes every text frame it receives back
/// verbatim, simulating the role the real cloud-variable backend plays for
/// both directions of this single connection.
fn spawn_mock_cloud_server() -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    std::thread::spawn(move || {
        let (stream, _) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("mock server accept failed: {e}");
                return;
            }
        };
        let mut ws = match tungstenite::accept(stream) {
            Ok(ws) => ws,
            Err(e) => {
                log::warn!("mock server handshake failed: {e}");
                return;
            }
        };
        loop {
            match ws.read() {
                Ok(Message::Text(text)) => {
                    if ws.send(Message::Text(text)).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });
    Ok(format!("ws://{addr}"))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// The same wall-clock-in-hundredths-of-a-second formula `cloudsock-socket`
/// uses internally; duplicated here since that helper isn't public.
fn centiseconds_now() -> u64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch");
    now.as_secs() * 100 + u64::from(now.subsec_millis()) / 10
}

/// A kind-0 key-fragment packet carrying the client's ephemeral public key,
/// codec-encoded hex digits.
fn fragment_packet(public_hex: &str) -> String {
    let payload = codec::encode(public_hex);
    format!("0{FRAGMENT_ID}{payload}.{CLIENT_ID}00000")
}

/// The `_safe_connect:` packet referencing the one fragment above, salted
/// with the current wall clock.
fn safe_connect_packet(salt: u64) -> String {
    let marker = codec::encode("_safe_connect:");
    format!("1{marker}{FRAGMENT_ID}{salt:015}.{CLIENT_ID}00001")
}

/// The session key both sides independently derive from the EC shared
/// secret and the handshake's own salt, matching
/// `cloudsock_proto::handshake::derive_session_key`'s EC branch exactly.
fn derive_client_session_key(client_keys: &ec::KeyPair, server_keys: &ec::KeyPair, handshake_salt: u64) -> BigUint {
    let shared = client_keys.shared_secret(&server_keys.public_bytes());
    let combined = format!("{}{:015}", BigUint::from_bytes_be(&shared), handshake_salt);
    combined.parse().expect("decimal digits always parse as a BigUint")
}

/// One encrypted, single-chunk request packet.
fn secure_request_packet(cipher: &Cipher, plaintext: &str, salt: u64) -> String {
    let ciphertext = cipher.encrypt(plaintext, salt);
    let digits = codec::encode(&ciphertext);
    format!("1{digits}{salt:015}.{CLIENT_ID}00002")
}

/// Reverses `CloudSocket::send`'s secure wire format: strip the
/// continuation sign and the leading normal-message type digit, split the
/// trailing 15 salt digits back off the body, codec-decode, then decrypt.
fn decrypt_response(cipher: &Cipher, raw: &str) -> Result<String, Box<dyn std::error::Error>> {
    let body = raw.trim_start_matches('-');
    let head = body.split('.').next().ok_or("malformed response packet")?;
    let head = head.strip_prefix('1').ok_or("missing type digit")?;
    if head.len() < 15 {
        return Err("response packet too short".into());
    }
    let (ciphertext_digits, salt_digits) = head.split_at(head.len() - 15);
    let salt: u64 = salt_digits.parse()?;
    let ciphertext = codec::decode(ciphertext_digits);
    Ok(cipher.decrypt(&ciphertext, salt)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_packet_embeds_the_client_id_in_its_tail() {
        let packet = fragment_packet("aa");
        assert!(packet.ends_with(&format!(".{CLIENT_ID}00000")));
        assert!(packet.starts_with('0'));
    }

    #[test]
    fn secure_request_packet_round_trips_through_decrypt_response() {
        let cipher = Cipher::new(&BigUint::from(123456789u64));
        let packet = secure_request_packet(&cipher, "hello", 170_000_000_000_01);
        let decrypted = decrypt_response(&cipher, &packet).unwrap();
        assert_eq!(decrypted, "hello");
    }

    #[test]
    fn both_sides_of_the_handshake_derive_the_same_session_key() {
        let server = ec::KeyPair::generate();
        let client = ec::KeyPair::generate();
        let salt = 170_000_000_000_01u64;
        let client_key = derive_client_session_key(&client, &server, salt);

        let shared = server.shared_secret(&client.public_bytes());
        let server_key: BigUint =
            format!("{}{salt:015}", BigUint::from_bytes_be(&shared)).parse().unwrap();
        assert_eq!(client_key, server_key);
    }
}
