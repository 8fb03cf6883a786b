//! Symmetric channel cipher: an AES-ECB-driven keystream over the codec
//! alphabet, keyed by a session secret and domain-separated per packet by a
//! salt.
//!
//! The keystream is independent of the plaintext (a synchronous stream
//! cipher): `shift_i = AES_ECB(key)(counter_be_128)[i mod 16]`, with
//! `counter` incrementing every 16 bytes consumed, starting at 1. The output
//! character is `chars[(idx(p_i) + shift_i) mod N]`. A literal end marker is
//! appended to the plaintext before ciphering and checked for on decrypt;
//! its absence (or a length mismatch) is the cipher's only integrity check
//! — a weak, accepted limitation (see module docs of the crate).

use aes::cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};
use aes::Aes128;
use num_bigint::BigUint;

use crate::alphabet;
use crate::sha256;

const END_MARKER: &str = "ITSTHEENDOFTHIS";

/// Errors from [`Cipher::decrypt`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CipherError {
    /// The header (`seed:len:`) was missing or malformed.
    MalformedHeader,
    /// The end marker was absent, or the declared length did not match.
    BadMessage,
}

impl std::fmt::Display for CipherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedHeader => write!(f, "malformed cipher header"),
            Self::BadMessage => write!(f, "bad message: end marker missing or length mismatch"),
        }
    }
}
impl std::error::Error for CipherError {}

/// A session cipher derived from a shared secret.
///
/// Construction hashes the secret once; `encrypt`/`decrypt` are then cheap
/// and take the packet's salt as domain separation.
#[derive(Clone)]
pub struct Cipher {
    hashed_key: [u8; 16],
}

impl Cipher {
    /// Derive a cipher from a session key (an arbitrarily large integer —
    /// an RSA-decrypted value or an X25519 shared secret interpreted as an
    /// integer). Only the last 53 decimal digits of the key feed the hash,
    /// matching the reference key schedule.
    pub fn new(key: &BigUint) -> Self {
        let decimal = key.to_string();
        let start = decimal.len().saturating_sub(53);
        let digest = sha256!(decimal[start..].as_bytes());
        let mut hashed_key = [0u8; 16];
        hashed_key.copy_from_slice(&digest[..16]);
        Self { hashed_key }
    }

    /// Encrypt `plaintext` under `salt`, returning `"{seed}:{len}:" + ciphertext`.
    pub fn encrypt(&self, plaintext: &str, salt: u64) -> String {
        let seed = random_seed();
        let mut out = format!("{seed}:{}:", plaintext.chars().count());
        let key = salted_key(&self.hashed_key, salt);
        let mut keystream = Keystream::new(key);
        for c in plaintext.chars().chain(END_MARKER.chars()) {
            let idx = alphabet::index_of(c).unwrap_or_else(|| alphabet::index_of('?').unwrap());
            let shift = keystream.next_byte() as usize;
            out.push(alphabet::chars()[(idx + shift) % alphabet::len()]);
        }
        out
    }

    /// Decrypt `data` (the full `"{seed}:{len}:"+ciphertext"` form) under `salt`.
    pub fn decrypt(&self, data: &str, salt: u64) -> Result<String, CipherError> {
        let mut parts = data.splitn(3, ':');
        let _seed = parts.next().ok_or(CipherError::MalformedHeader)?;
        let msg_len: usize = parts
            .next()
            .ok_or(CipherError::MalformedHeader)?
            .parse()
            .map_err(|_| CipherError::MalformedHeader)?;
        let encrypted = parts.next().ok_or(CipherError::MalformedHeader)?;

        let key = salted_key(&self.hashed_key, salt);
        let mut keystream = Keystream::new(key);
        let n = alphabet::len() as i64;
        let mut decrypted = String::with_capacity(encrypted.len());
        for c in encrypted.chars() {
            let idx = alphabet::index_of(c).ok_or(CipherError::BadMessage)? as i64;
            let shift = keystream.next_byte() as i64;
            let orig = (idx - shift).rem_euclid(n) as usize;
            decrypted.push(alphabet::chars()[orig]);
        }

        match decrypted.strip_suffix(END_MARKER) {
            Some(text) if text.chars().count() == msg_len => Ok(text.to_string()),
            _ => Err(CipherError::BadMessage),
        }
    }
}

/// `hashed_key XOR_prefix salt's decimal digits paired into bytes`, left-
/// aligned; bytes beyond the paired salt digits are left as `hashed_key`'s.
fn salted_key(hashed_key: &[u8; 16], salt: u64) -> [u8; 16] {
    let digits = salt.to_string();
    let mut key = *hashed_key;
    for (i, chunk) in digits.as_bytes().chunks(2).enumerate() {
        if i >= key.len() {
            break;
        }
        let pair = std::str::from_utf8(chunk).expect("ascii digits");
        let byte: u8 = pair.parse().expect("1-2 decimal digits fit in a u8");
        key[i] ^= byte;
    }
    key
}

/// Produces AES-ECB keystream bytes one at a time, regenerating a 16-byte
/// block every time the previous one is exhausted.
struct Keystream {
    key: [u8; 16],
    counter: u128,
    block: [u8; 16],
    pos: usize,
}

impl Keystream {
    fn new(key: [u8; 16]) -> Self {
        Self { key, counter: 0, block: [0u8; 16], pos: 16 }
    }

    fn next_byte(&mut self) -> u8 {
        if self.pos == 16 {
            self.counter += 1;
            self.block = self.counter.to_be_bytes();
            let cipher = Aes128::new(GenericArray::from_slice(&self.key));
            let mut ga = GenericArray::clone_from_slice(&self.block);
            cipher.encrypt_block(&mut ga);
            self.block.copy_from_slice(&ga);
            self.pos = 0;
        }
        let b = self.block[self.pos];
        self.pos += 1;
        b
    }
}

/// A uniformly chosen 4-digit header nonce.
fn random_seed() -> u32 {
    let mut buf = [0u8; 2];
    getrandom::getrandom(&mut buf).expect("getrandom failed");
    1000 + (u16::from_le_bytes(buf) as u32 % 9000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher_for(key: u64) -> Cipher {
        Cipher::new(&BigUint::from(key))
    }

    #[test]
    fn round_trips() {
        let c = cipher_for(123456789);
        let salt = 170_000_000_000_00u64;
        let ciphertext = c.encrypt("hello, cloud!", salt);
        assert_eq!(c.decrypt(&ciphertext, salt).unwrap(), "hello, cloud!");
    }

    #[test]
    fn different_salt_fails_with_high_probability() {
        let c = cipher_for(123456789);
        let ciphertext = c.encrypt("hello", 1);
        assert!(c.decrypt(&ciphertext, 2).is_err());
    }

    #[test]
    fn tampered_byte_fails() {
        let c = cipher_for(123456789);
        let salt = 42;
        let mut ciphertext = c.encrypt("some plaintext", salt);
        // Flip the last character of the ciphertext body.
        let mut chars: Vec<char> = ciphertext.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'a' { 'b' } else { 'a' };
        ciphertext = chars.into_iter().collect();
        assert!(c.decrypt(&ciphertext, salt).is_err());
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let c = cipher_for(7);
        let ciphertext = c.encrypt("", 99);
        assert_eq!(c.decrypt(&ciphertext, 99).unwrap(), "");
    }
}
