use std::time::Duration;

/// Which flavor of cloud-variable backend a [`crate::CloudLink`] talks to.
///
/// The platform flavor authenticates via a session cookie and caps packet
/// size to the platform's numeric-variable length ceiling; the TurboWarp
/// flavor skips the cookie, requires an identifying `User-Agent`, allows a
/// much larger effective packet size, and (optionally) plain string values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flavor {
    Platform,
    TurboWarp,
}

impl Flavor {
    /// The default cloud-write packet size for this flavor, absent an
    /// explicit override in [`LinkConfig::packet_size`].
    pub fn default_packet_size(self) -> usize {
        match self {
            Self::Platform => 220,
            Self::TurboWarp => 98_800,
        }
    }
}

/// Configuration for a [`crate::CloudLink`].
#[derive(Clone)]
pub struct LinkConfig {
    pub flavor: Flavor,
    pub endpoint: String,
    pub user_agent: Option<String>,
    /// Accept plain string cloud-variable values (TurboWarp-only; framed
    /// messaging is always numeric regardless of this flag).
    pub accept_strs: bool,
    /// Minimum spacing between consecutive outbound writes.
    pub write_pacing: Duration,
    /// Socket read/write timeout.
    pub socket_timeout: Duration,
    /// How many consecutive connect attempts to make before surfacing a
    /// fatal [`crate::LinkError::Transport`].
    pub max_connect_attempts: u32,
    /// Explicit packet size override; `None` defers to
    /// [`Flavor::default_packet_size`].
    pub packet_size: Option<usize>,
    /// Skip TLS certificate verification on connect failure. Off by
    /// default; only meaningful for the platform flavor's `wss://` endpoint.
    pub allow_insecure_tls_fallback: bool,
    /// Whether `CloudLink::quick_get`/`quick_set` are permitted at
    /// construction time. Off by default; toggle at runtime with
    /// `CloudLink::enable_quickaccess`/`disable_quickaccess`.
    pub quickaccess: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            flavor: Flavor::Platform,
            endpoint: "wss://clouddata.scratch.mit.edu".to_string(),
            user_agent: None,
            accept_strs: false,
            write_pacing: Duration::from_millis(100),
            socket_timeout: Duration::from_secs(5),
            max_connect_attempts: 3,
            packet_size: None,
            allow_insecure_tls_fallback: false,
            quickaccess: false,
        }
    }
}

impl LinkConfig {
    /// A config preset for the TurboWarp flavor: no cookie, a larger packet
    /// size, and a higher default retry bound (the original comments note
    /// TurboWarp's cloud backend is flakier than the platform's).
    pub fn turbowarp(endpoint: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            flavor: Flavor::TurboWarp,
            endpoint: endpoint.into(),
            user_agent: Some(user_agent.into()),
            max_connect_attempts: 10,
            ..Self::default()
        }
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size.unwrap_or_else(|| self.flavor.default_packet_size())
    }
}
