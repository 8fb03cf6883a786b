//! Serialized security material: an 8-byte scheme tag followed by a JSON
//! payload, so generated keys can be persisted across restarts. Layered on
//! top of [`crate::rsa`]/[`crate::ec`]; it does not touch the black-box
//! primitives themselves.

use num_bigint::BigUint;
use serde_json::Value;

use crate::ec;
use crate::rsa;

const RSA_TAG: &str = "RSAxxxx1";
const EC_TAG: &str = "ECxxxxx1";

/// Errors from [`load`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MaterialError {
    UnknownTag,
    MalformedPayload,
}

impl std::fmt::Display for MaterialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTag => write!(f, "unrecognized security material tag"),
            Self::MalformedPayload => write!(f, "malformed security material payload"),
        }
    }
}
impl std::error::Error for MaterialError {}

/// Either scheme's key material, after serialization round-trips through
/// its wire tag.
#[derive(Clone, Debug)]
pub enum SecurityMaterial {
    Rsa(rsa::KeyPair),
    Ec { scalar: [u8; 32] },
}

/// What the server publishes out-of-band so clients can perform their half
/// of the key exchange.
#[derive(Clone, Debug)]
pub enum PublicMaterial {
    Rsa { public_exponent: BigUint, public_modulus: BigUint },
    Ec { public_base: [u8; 32], public_point: [u8; 32] },
}

pub fn public_of(material: &SecurityMaterial) -> PublicMaterial {
    match material {
        SecurityMaterial::Rsa(keys) => PublicMaterial::Rsa {
            public_exponent: keys.public_exponent.clone(),
            public_modulus: keys.modulus.clone(),
        },
        SecurityMaterial::Ec { scalar } => {
            let pair = ec::KeyPair::from_scalar(*scalar);
            PublicMaterial::Ec { public_base: ec::BASE_POINT, public_point: pair.public_bytes() }
        }
    }
}

pub fn save(material: &SecurityMaterial) -> String {
    match material {
        SecurityMaterial::Rsa(keys) => {
            let arr = Value::Array(vec![
                Value::String(keys.public_exponent.to_string()),
                Value::String(keys.private_exponent.to_string()),
                Value::String(keys.modulus.to_string()),
            ]);
            format!("{RSA_TAG}{arr}")
        }
        SecurityMaterial::Ec { scalar } => {
            let arr = Value::Array(vec![
                Value::String(hex_encode(&ec::BASE_POINT)),
                Value::String(hex_encode(scalar)),
            ]);
            format!("{EC_TAG}{arr}")
        }
    }
}

pub fn load(data: &str) -> Result<SecurityMaterial, MaterialError> {
    if data.len() < 8 {
        return Err(MaterialError::UnknownTag);
    }
    let (tag, rest) = data.split_at(8);
    let values: Vec<Value> =
        serde_json::from_str(rest).map_err(|_| MaterialError::MalformedPayload)?;

    match tag {
        RSA_TAG => {
            let [e, d, n] = take3(&values)?;
            let parse = |s: &str| {
                s.parse::<BigUint>().map_err(|_| MaterialError::MalformedPayload)
            };
            Ok(SecurityMaterial::Rsa(rsa::KeyPair {
                public_exponent: parse(e)?,
                private_exponent: parse(d)?,
                modulus: parse(n)?,
            }))
        }
        EC_TAG => {
            let values = values;
            if values.len() != 2 {
                return Err(MaterialError::MalformedPayload);
            }
            let _base = values[0].as_str().ok_or(MaterialError::MalformedPayload)?;
            let scalar_hex = values[1].as_str().ok_or(MaterialError::MalformedPayload)?;
            let bytes = hex_decode(scalar_hex)?;
            let scalar: [u8; 32] =
                bytes.try_into().map_err(|_| MaterialError::MalformedPayload)?;
            Ok(SecurityMaterial::Ec { scalar })
        }
        _ => Err(MaterialError::UnknownTag),
    }
}

fn take3(values: &[Value]) -> Result<[&str; 3], MaterialError> {
    if values.len() != 3 {
        return Err(MaterialError::MalformedPayload);
    }
    let mut out = [""; 3];
    for (i, v) in values.iter().enumerate() {
        out[i] = v.as_str().ok_or(MaterialError::MalformedPayload)?;
    }
    Ok(out)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Result<Vec<u8>, MaterialError> {
    if s.len() % 2 != 0 {
        return Err(MaterialError::MalformedPayload);
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| MaterialError::MalformedPayload))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsa_round_trips() {
        let keys = rsa::KeyPair::generate(4);
        let material = SecurityMaterial::Rsa(keys.clone());
        let saved = save(&material);
        assert!(saved.starts_with(RSA_TAG));
        let SecurityMaterial::Rsa(reloaded) = load(&saved).unwrap() else {
            panic!("expected RSA material");
        };
        assert_eq!(reloaded, keys);
    }

    #[test]
    fn ec_round_trips() {
        let pair = ec::KeyPair::generate();
        let material = SecurityMaterial::Ec { scalar: pair.scalar_bytes() };
        let saved = save(&material);
        assert!(saved.starts_with(EC_TAG));
        let SecurityMaterial::Ec { scalar } = load(&saved).unwrap() else {
            panic!("expected EC material");
        };
        assert_eq!(scalar, pair.scalar_bytes());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(load("NOPExxx1[]"), Err(MaterialError::UnknownTag));
    }
}
