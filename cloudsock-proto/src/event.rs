//! Events dispatched to CloudLink subscribers.

/// What changed on the platform's cloud-variable channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Set,
    Delete,
    Connect,
    Create,
}

impl EventKind {
    /// The bus subscription key ("any" is handled separately by the caller).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Connect => "connect",
            Self::Create => "create",
        }
    }
}

/// Raised by [`Event::user`]/[`Event::timestamp`]: resolving either requires
/// the platform's cloud-log HTTP history, which this implementation does not
/// fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventExpired;

impl std::fmt::Display for EventExpired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "event log entry is unavailable (cloud-log lookup is out of scope)")
    }
}
impl std::error::Error for EventExpired {}

/// An immutable record of one cloud-variable change.
#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventKind,
    pub name: String,
    pub var: String,
    pub value: String,
    /// A 16-bit random tag, used for equality in ordering bookkeeping rather
    /// than content identity.
    pub id: u16,
}

impl Event {
    pub fn new(kind: EventKind, name: impl Into<String>, var: impl Into<String>, value: impl Into<String>) -> Self {
        let mut buf = [0u8; 2];
        getrandom::getrandom(&mut buf).expect("getrandom failed");
        Self { kind, name: name.into(), var: var.into(), value: value.into(), id: u16::from_le_bytes(buf) }
    }

    /// The user who made this change. Always [`EventExpired`] here; see
    /// module docs.
    pub fn user(&self) -> Result<String, EventExpired> {
        Err(EventExpired)
    }

    /// The server-side timestamp of this change. Always [`EventExpired`].
    pub fn timestamp(&self) -> Result<u64, EventExpired> {
        Err(EventExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_fields_always_expire() {
        let e = Event::new(EventKind::Set, "\u{2601} score", "score", "42");
        assert_eq!(e.user(), Err(EventExpired));
        assert_eq!(e.timestamp(), Err(EventExpired));
    }

    #[test]
    fn kind_as_str_matches_wire_method() {
        assert_eq!(EventKind::Set.as_str(), "set");
    }
}
