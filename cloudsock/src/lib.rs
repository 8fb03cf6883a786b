//! # cloudsock — a cloud-variable transport
//!
//! `cloudsock` turns a block-based hobbyist platform's "cloud variables"
//! channel into a framed, multiplexed, optionally end-to-end encrypted
//! request/response transport. It is a thin re-export over five focused
//! sub-crates wired together here for convenience:
//!
//! | Sub-crate           | Role                                                |
//! |----------------------|------------------------------------------------------|
//! | `cloudsock-crypto`  | Codec, cipher, RSA/EC key exchange, security material |
//! | `cloudsock-proto`   | Sans-IO packet framing and connect-handshake decision |
//! | `cloudsock-link`    | WebSocket session, reconnect, rate-limited writes     |
//! | `cloudsock-socket`  | Client table, accept/send/recv                       |
//! | `cloudsock-request` | Request parsing, type coercion, dispatch              |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cloudsock::link::{CloudLink, LinkConfig, NoRetries};
//! use cloudsock::socket::{CloudSocket, SocketConfig};
//! use cloudsock::request::{RequestHandler, Registration};
//!
//! let link = CloudLink::connect_turbowarp(LinkConfig::default(), 1, "cloudsock-demo", NoRetries)?;
//! let socket = CloudSocket::new(Arc::new(link), None, SocketConfig::default());
//! socket.listen();
//!
//! let handler = RequestHandler::new(socket);
//! handler.register(Registration::new("ping", |_args, _kwargs| {
//!     Ok(cloudsock::request::Arg::Str("pong".to_string()))
//! }));
//! handler.run();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`cloudsock_crypto`] — codec, cipher, RSA/EC key exchange,
/// and serialized security material.
pub use cloudsock_crypto as crypto;

/// Re-export of [`cloudsock_proto`] — packet framing, fragments, events,
/// the salt watermark, and the connect-decision engine.
pub use cloudsock_proto as proto;

/// Re-export of [`cloudsock_link`] — the WebSocket session.
pub use cloudsock_link as link;

/// Re-export of [`cloudsock_socket`] — the client table and accept/send/recv API.
pub use cloudsock_socket as socket;

/// Re-export of [`cloudsock_request`] — request parsing, coercion, and dispatch.
pub use cloudsock_request as request;

// ─── Convenience re-exports ────────────────────────────────────────────────

pub use cloudsock_link::{BoundedRetries, CloudLink, Event, EventKind, Flavor, LinkConfig, NoRetries, PlatformSession, RetryPolicy};
pub use cloudsock_request::{Arg, CoerceKind, DispatchEvent, DispatchEventKind, Registration, RequestError, RequestHandler};
pub use cloudsock_socket::{CloudSocket, SocketConfig, SocketError};
