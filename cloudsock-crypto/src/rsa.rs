//! RSA key generation, encryption and decryption.
//!
//! Classical textbook RSA: `encrypt(pub, m) = m^e mod n`,
//! `decrypt(priv, c) = c^d mod n`. Key generation draws two primes checked
//! by an implementation-visible Miller-Rabin test and fixes the public
//! exponent at `3`, deriving the private exponent as its modular inverse
//! modulo the reduced totient `lcm(p-1, q-1)`; `gcd(e, φ(n)) = 1` is
//! verified explicitly (not merely assumed from a successful inverse).

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// An RSA key pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPair {
    pub public_exponent: BigUint,
    pub private_exponent: BigUint,
    pub modulus: BigUint,
}

impl KeyPair {
    /// Generate a new key pair from two fresh `byte_length`-byte primes.
    pub fn generate(byte_length: usize) -> Self {
        loop {
            let p = find_prime(byte_length);
            let q = find_prime(byte_length);
            if let Some(pair) = try_build(&p, &q) {
                return pair;
            }
        }
    }

    /// Public material: exponent and modulus, safe to publish.
    pub fn public_key(&self) -> PublicKey {
        PublicKey { exponent: self.public_exponent.clone(), modulus: self.modulus.clone() }
    }

    pub fn encrypt(&self, m: &BigUint) -> BigUint {
        m.modpow(&self.public_exponent, &self.modulus)
    }

    pub fn decrypt(&self, c: &BigUint) -> BigUint {
        c.modpow(&self.private_exponent, &self.modulus)
    }
}

/// The publishable half of a [`KeyPair`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    pub exponent: BigUint,
    pub modulus: BigUint,
}

impl PublicKey {
    pub fn encrypt(&self, m: &BigUint) -> BigUint {
        m.modpow(&self.exponent, &self.modulus)
    }
}

const PUBLIC_EXPONENT: u32 = 3;

fn try_build(p: &BigUint, q: &BigUint) -> Option<KeyPair> {
    let one = BigUint::one();
    let n = p * q;
    let p1 = p - &one;
    let q1 = q - &one;
    let totient = (&p1 * &q1) / gcd(&p1, &q1); // lcm(p-1, q-1)

    let e = BigUint::from(PUBLIC_EXPONENT);
    if gcd(&e, &totient) != one {
        return None;
    }
    let d = mod_inverse(&e, &totient)?;
    Some(KeyPair { public_exponent: e, private_exponent: d, modulus: n })
}

fn gcd(a: &BigUint, b: &BigUint) -> BigUint {
    let (mut a, mut b) = (a.clone(), b.clone());
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

/// Modular inverse of `a` mod `m` via the extended Euclidean algorithm,
/// worked over signed big integers since intermediate coefficients go negative.
fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    use num_bigint::BigInt;
    let (a, m) = (BigInt::from(a.clone()), BigInt::from(m.clone()));
    let (mut old_r, mut r) = (a, m.clone());
    let (mut old_s, mut s) = (BigInt::from(1), BigInt::from(0));
    while r != BigInt::from(0) {
        let q = &old_r / &r;
        let new_r = &old_r - &q * &r;
        old_r = std::mem::replace(&mut r, new_r);
        let new_s = &old_s - &q * &s;
        old_s = std::mem::replace(&mut s, new_s);
    }
    if old_r != BigInt::from(1) {
        return None; // not invertible
    }
    let result = ((old_s % &m) + &m) % &m;
    result.try_into().ok()
}

/// Miller-Rabin primality test with `rounds` independent witnesses.
fn is_prime(n: &BigUint, rounds: u32) -> bool {
    let zero = BigUint::zero();
    let one = BigUint::one();
    let two = BigUint::from(2u32);
    let three = BigUint::from(3u32);

    if *n <= one {
        return false;
    }
    if *n <= three {
        return true;
    }
    if (n % &two) == zero {
        return false;
    }

    // n - 1 = d * 2^j, d odd
    let mut d = n - &one;
    let mut j = 0u32;
    while (&d % &two) == zero {
        d /= &two;
        j += 1;
    }

    for _ in 0..rounds {
        let a = random_in_range(&two, &(n - &two));
        let mut x = a.modpow(&d, n);
        if x == one || x == n - &one {
            continue;
        }
        let mut witness = false;
        for _ in 0..j.saturating_sub(1) {
            x = x.modpow(&two, n);
            if x == n - &one {
                witness = true;
                break;
            }
        }
        if !witness {
            return false;
        }
    }
    true
}

/// A uniform-enough random value in `[low, high)`, used only for Miller-Rabin
/// witness selection (not for key material itself).
fn random_in_range(low: &BigUint, high: &BigUint) -> BigUint {
    let span = high - low;
    let byte_len = (span.bits() as usize / 8) + 1;
    let mut buf = vec![0u8; byte_len];
    getrandom::getrandom(&mut buf).expect("getrandom failed");
    low + BigUint::from_bytes_be(&buf) % &span
}

fn find_prime(byte_length: usize) -> BigUint {
    loop {
        let mut buf = vec![0u8; byte_length];
        getrandom::getrandom(&mut buf).expect("getrandom failed");
        let candidate = BigUint::from_bytes_be(&buf);
        if is_prime(&candidate, 10) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_known_primes_pass() {
        for p in [2u32, 3, 5, 7, 11, 104729] {
            assert!(is_prime(&BigUint::from(p), 10), "{p} should be prime");
        }
    }

    #[test]
    fn small_known_composites_fail() {
        for n in [4u32, 6, 8, 9, 100, 104730] {
            assert!(!is_prime(&BigUint::from(n), 10), "{n} should be composite");
        }
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        // Small byte length keeps this test fast; correctness does not
        // depend on prime size.
        let keys = KeyPair::generate(4);
        let m = BigUint::from(42u32) % &keys.modulus;
        let c = keys.encrypt(&m);
        assert_eq!(keys.decrypt(&c), m);
    }

    #[test]
    fn public_key_matches_keypair_exponent() {
        let keys = KeyPair::generate(4);
        let pk = keys.public_key();
        assert_eq!(pk.exponent, keys.public_exponent);
        assert_eq!(pk.modulus, keys.modulus);
    }

    #[test]
    fn gcd_of_coprime_values_is_one() {
        assert_eq!(gcd(&BigUint::from(35u32), &BigUint::from(64u32)), BigUint::one());
    }
}
