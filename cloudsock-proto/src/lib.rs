//! Packet-level framing and multiplexing for the cloud-socket transport.
//!
//! Turns the numeric values carried by a single cloud variable into a
//! per-client byte stream: packet decomposition ([`packet`]), key-exchange
//! fragment reassembly ([`fragments`]), the secure/insecure connect
//! handshakes ([`handshake`]), replay protection ([`salt`]), event records
//! ([`event`]), and the decision engine that ties them together
//! ([`framing`]).
//!
//! Nothing here touches a socket or spawns a thread — every operation is a
//! pure function or a small struct mutated by its caller, so the framing
//! decision tree is exercised directly by unit tests rather than through an
//! end-to-end harness.

pub mod event;
pub mod framing;
pub mod fragments;
pub mod handshake;
pub mod packet;
pub mod salt;

pub use event::{Event, EventExpired, EventKind};
pub use framing::{ClientState, ClientTable, Decision};
pub use fragments::FragmentTable;
pub use packet::RawPacket;
pub use salt::SaltWatermark;

/// Failures from packet parsing and the framing decision engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramingError {
    /// The packet's field layout did not parse.
    Malformed,
    /// A key fragment id was already present in the table.
    DuplicateFragment,
    /// A handshake referenced a fragment id the table does not hold.
    MissingFragment,
    /// A salt was non-monotonic or outside the replay window.
    SaltViolation,
    /// A secure handshake failed the channel-binding check, or no key
    /// exchange material is configured on this server.
    HandshakeRejected,
}

impl std::fmt::Display for FramingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed packet"),
            Self::DuplicateFragment => write!(f, "duplicate key fragment id"),
            Self::MissingFragment => write!(f, "handshake referenced an unknown fragment id"),
            Self::SaltViolation => write!(f, "salt is non-monotonic or outside the replay window"),
            Self::HandshakeRejected => write!(f, "secure handshake rejected"),
        }
    }
}
impl std::error::Error for FramingError {}
