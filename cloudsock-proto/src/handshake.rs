//! Parsing and key derivation for the two connect forms a client can open
//! with: a plain `_connect` (insecure) and a `_safe_connect:` (secure,
//! key-exchange) handshake.

use num_bigint::BigUint;

use cloudsock_crypto::{ec, material::SecurityMaterial, codec};

use crate::FramingError;

const PREFIX_DIGITS: usize = 28;
const SAFE_CONNECT_PREFIX: &str = "_safe_connect:";
const PLAIN_CONNECT_PREFIX: &str = "_connect";

/// Decode the leading marker of a connect-frame body, if any is present.
pub fn leading_text(body: &str) -> String {
    let take = PREFIX_DIGITS.min(body.len());
    codec::decode(&body[..take])
}

pub fn is_safe_connect(body: &str) -> bool {
    leading_text(body).starts_with(SAFE_CONNECT_PREFIX)
}

pub fn is_plain_connect(body: &str) -> bool {
    leading_text(body).starts_with(PLAIN_CONNECT_PREFIX)
}

/// A parsed `_safe_connect:` body: the fragment ids referencing the client's
/// key-exchange contribution, and the trailing salt (decimal digits, the
/// unit used throughout framing: hundredths of a second).
pub struct SafeConnect {
    pub fragment_ids: Vec<String>,
    pub salt_digits: String,
}

/// Split a `_safe_connect:` body into its fragment references and salt.
/// Fails if the body is too short to hold the 28-digit marker, a 15-digit
/// salt, and a whole number of 5-digit fragment references.
pub fn parse_safe_connect(body: &str) -> Result<SafeConnect, FramingError> {
    const SALT_DIGITS: usize = 15;
    if body.len() < PREFIX_DIGITS + SALT_DIGITS {
        return Err(FramingError::Malformed);
    }
    let refs = &body[PREFIX_DIGITS..body.len() - SALT_DIGITS];
    if refs.len() % 5 != 0 {
        return Err(FramingError::Malformed);
    }
    let fragment_ids = refs.as_bytes().chunks(5).map(|c| String::from_utf8_lossy(c).into_owned()).collect();
    let salt_digits = body[body.len() - SALT_DIGITS..].to_string();
    Ok(SafeConnect { fragment_ids, salt_digits })
}

/// Recover the session key from a reassembled key-exchange ciphertext,
/// using whichever scheme the server was configured with.
///
/// - RSA: the concatenated fragments are the decimal ciphertext directly;
///   decrypting it yields the session key (the salt binding is checked
///   separately by the caller against this value).
/// - EC: the concatenated fragments are codec-encoded hex digits of the
///   client's ephemeral public point; the session key is the shared secret,
///   read as a big-endian integer, with the salt's digits appended.
pub fn derive_session_key(material: &SecurityMaterial, fragments: &str, salt_digits: &str) -> Result<BigUint, FramingError> {
    match material {
        SecurityMaterial::Rsa(keys) => {
            let ciphertext: BigUint = fragments.parse().map_err(|_| FramingError::Malformed)?;
            Ok(keys.decrypt(&ciphertext))
        }
        SecurityMaterial::Ec { scalar } => {
            let hex = codec::decode(fragments);
            let peer_public = hex_decode_32(&hex)?;
            let pair = ec::KeyPair::from_scalar(*scalar);
            let shared = pair.shared_secret(&peer_public);
            let shared_int = BigUint::from_bytes_be(&shared);
            let combined = format!("{shared_int}{salt_digits}");
            combined.parse().map_err(|_| FramingError::Malformed)
        }
    }
}

/// Check the salt-binding invariant: the session key's decimal form must
/// start or end with the salt's own digits (this client always satisfies
/// the `ends_with` branch; `starts_with` is kept for interop with a variant
/// this implementation has never observed).
pub fn salt_binds(session_key: &BigUint, salt_digits: &str) -> bool {
    let key_text = session_key.to_string();
    let salt_as_int: BigUint = match salt_digits.parse() {
        Ok(n) => n,
        Err(_) => return false,
    };
    let salt_text = salt_as_int.to_string();
    key_text.starts_with(&salt_text) || key_text.ends_with(&salt_text)
}

fn hex_decode_32(hex: &str) -> Result<[u8; 32], FramingError> {
    if hex.len() != 64 {
        return Err(FramingError::Malformed);
    }
    let mut out = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).map_err(|_| FramingError::Malformed)?;
        out[i] = u8::from_str_radix(pair, 16).map_err(|_| FramingError::Malformed)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_the_safe_connect_marker() {
        let body = format!("{}{}", codec::encode(SAFE_CONNECT_PREFIX), "0000100002170000000000001");
        assert!(is_safe_connect(&body));
        assert!(!is_plain_connect(&body));
    }

    #[test]
    fn recognizes_the_plain_connect_marker() {
        let body = codec::encode("_connect");
        assert!(is_plain_connect(&body));
        assert!(!is_safe_connect(&body));
    }

    #[test]
    fn parses_fragment_references_and_salt() {
        let marker = codec::encode(SAFE_CONNECT_PREFIX);
        let body = format!("{marker}0000100002170000000000001");
        let parsed = parse_safe_connect(&body).unwrap();
        assert_eq!(parsed.fragment_ids, vec!["00001", "00002"]);
        assert_eq!(parsed.salt_digits, "170000000000001");
    }

    #[test]
    fn rsa_session_key_round_trips_through_decrypt() {
        let keys = cloudsock_crypto::rsa::KeyPair::generate(4);
        let plaintext = BigUint::from(7u32) % &keys.modulus;
        let ciphertext = keys.encrypt(&plaintext);
        let material = SecurityMaterial::Rsa(keys);
        let recovered = derive_session_key(&material, &ciphertext.to_string(), "").unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn ec_session_key_binds_to_its_salt() {
        let server = ec::KeyPair::generate();
        let client = ec::KeyPair::generate();
        let material = SecurityMaterial::Ec { scalar: server.scalar_bytes() };
        let fragments = codec::encode(&hex_encode(&client.public_bytes()));
        let key = derive_session_key(&material, &fragments, "170000000000001").unwrap();
        assert!(salt_binds(&key, "170000000000001"));
    }

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}
