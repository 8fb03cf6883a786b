/// Server-side socket configuration. Mirrors [`cloudsock_link::LinkConfig`]'s
/// `Default`-plus-override shape.
#[derive(Clone, Debug)]
pub struct SocketConfig {
    /// Override the per-flavor default packet size (220 platform / 98 800
    /// TurboWarp). `None` means "ask each client's flavor".
    pub packet_size: Option<usize>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self { packet_size: None }
    }
}
