use std::fmt;

/// Errors surfaced by [`crate::CloudLink`].
#[derive(Debug)]
pub enum LinkError {
    /// The WebSocket failed to open, read, or write after exhausting the
    /// configured retry bound.
    Transport(tungstenite::Error),
    /// A value rejected by the pre-send validator: not representable as a
    /// number within the platform's JSON length ceiling (and the flavor
    /// does not accept string values).
    BadValue(String),
    /// A server frame did not parse as the expected `{method, name, value}`
    /// JSON shape.
    Protocol(String),
    /// Called on the TurboWarp flavor, which has no backing cloud-log
    /// history to fetch.
    NotSupported(&'static str),
    /// `quick_get`/`quick_set` called without `enable_quickaccess` first.
    QuickAccessDisabled,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "cloud link transport error: {e}"),
            Self::BadValue(v) => write!(f, "value rejected by pre-send validation: {v}"),
            Self::Protocol(s) => write!(f, "malformed server frame: {s}"),
            Self::NotSupported(what) => write!(f, "{what} is not supported on this flavor"),
            Self::QuickAccessDisabled => write!(f, "quickaccess is disabled"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<tungstenite::Error> for LinkError {
    fn from(e: tungstenite::Error) -> Self {
        Self::Transport(e)
    }
}
