//! Cryptographic primitives for the cloud-socket transport.
//!
//! Provides:
//! - a 2-digit numeric [`codec`] for carrying text inside cloud-variable values
//! - a symmetric, salt-keyed [`cipher`] built on an AES-ECB-driven keystream
//! - [`rsa`] key generation/encrypt/decrypt with an implementation-checked
//!   Miller-Rabin primality test
//! - [`ec`] — X25519 key exchange, treated as a black box per the transport's
//!   own key-exchange contract
//! - [`material`] — serialized security-material round-trip

#![deny(unsafe_code)]

mod alphabet;
pub mod cipher;
pub mod codec;
pub mod ec;
pub mod material;
pub mod rsa;
mod sha;
