use cloudsock_link::LinkError;
use cloudsock_proto::FramingError;

/// Errors surfaced by [`crate::CloudSocket`]'s public operations.
#[derive(Debug)]
pub enum SocketError {
    /// `accept`/`recv_from_client` hit their deadline with nothing ready.
    Timeout,
    /// No client with this id is known to the socket.
    UnknownClient(String),
    /// The client's security state does not match the requested operation.
    NotSecure(String),
    /// The underlying link rejected a write.
    Transport(LinkError),
    /// A framing-layer error surfaced synchronously (used by tests driving
    /// `decide` through the socket rather than off the wire).
    Framing(FramingError),
}

impl std::fmt::Display for SocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "the timeout expired"),
            Self::UnknownClient(id) => write!(f, "no such client: {id}"),
            Self::NotSecure(id) => write!(f, "client {id} has no secure session"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Framing(e) => write!(f, "framing error: {e}"),
        }
    }
}
impl std::error::Error for SocketError {}

impl From<LinkError> for SocketError {
    fn from(e: LinkError) -> Self {
        Self::Transport(e)
    }
}

impl From<FramingError> for SocketError {
    fn from(e: FramingError) -> Self {
        Self::Framing(e)
    }
}
