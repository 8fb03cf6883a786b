//! X25519 key exchange.
//!
//! Scalar multiplication itself is treated as a black box (delegated to
//! `x25519-dalek`); this module only wires key generation and the
//! shared-secret computation into the shapes the transport needs.

use x25519_dalek::{PublicKey, StaticSecret};

/// The canonical X25519 base point (`u = 9`), published alongside a
/// server's public point so a client can perform its half of the exchange.
pub const BASE_POINT: [u8; 32] = {
    let mut b = [0u8; 32];
    b[0] = 9;
    b
};

/// A local X25519 key pair.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh ephemeral (or long-lived server) key pair.
    pub fn generate() -> Self {
        let mut scalar = [0u8; 32];
        getrandom::getrandom(&mut scalar).expect("getrandom failed");
        Self::from_scalar(scalar)
    }

    /// Reconstruct a key pair from a saved 32-byte scalar.
    pub fn from_scalar(scalar: [u8; 32]) -> Self {
        let secret = StaticSecret::from(scalar);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn scalar_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// `scalarmult(priv, peer_pub)`.
    pub fn shared_secret(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        let peer = PublicKey::from(*peer_public);
        self.secret.diffie_hellman(&peer).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_agree_on_the_shared_secret() {
        let server = KeyPair::generate();
        let client = KeyPair::generate();
        let server_shared = server.shared_secret(&client.public_bytes());
        let client_shared = client.shared_secret(&server.public_bytes());
        assert_eq!(server_shared, client_shared);
    }

    #[test]
    fn round_trips_through_a_saved_scalar() {
        let original = KeyPair::generate();
        let scalar = original.scalar_bytes();
        let reloaded = KeyPair::from_scalar(scalar);
        assert_eq!(original.public_bytes(), reloaded.public_bytes());
    }
}
