//! A blocking WebSocket session that maintains one platform cloud-variable
//! connection: handshake, reconnect, rate-limited writes, and a small
//! synchronous event bus that normalizes server frames into
//! [`cloudsock_proto::Event`]s.
//!
//! This crate owns the wire (newline-delimited JSON over a WebSocket); the
//! numeric framing protocol layered on top of cloud-variable writes lives in
//! `cloudsock-proto`.

#![deny(unsafe_code)]

mod bus;
mod cache;
mod config;
mod errors;
mod link;
mod retry;
mod session;

pub use bus::EventBus;
pub use cache::VariableCache;
pub use config::{Flavor, LinkConfig};
pub use errors::LinkError;
pub use link::CloudLink;
pub use retry::{BoundedRetries, NoRetries, RetryPolicy};
pub use session::PlatformSession;

pub use cloudsock_proto::{Event, EventKind};
