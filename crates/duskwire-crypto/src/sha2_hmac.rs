//! SHA-256/SHA-512 hashing and HMAC-SHA256 authentication.
//!
//! Matches `crypto_sha256`/`crypto_sha512`/`crypto_hmac`/`crypto_hmac_verify`/
//! `new_hmac_key` from `crypto_core.h`. Used for cookie MACs and announce
//! `ping_id` tokens, which are keyed-MAC rather than public-key-box
//! authenticated.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};

use crate::{CryptoError, Result};

/// Size of an HMAC-SHA256 authenticator and key.
pub const HMAC_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Compute a SHA-256 hash.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Compute a SHA-512 hash.
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let digest = Sha512::digest(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

/// Generate a random HMAC key.
pub fn new_hmac_key() -> [u8; HMAC_SIZE] {
    let mut key = [0u8; HMAC_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Compute an HMAC-SHA256 authenticator over `data` with `key`.
pub fn hmac(key: &[u8; HMAC_SIZE], data: &[u8]) -> [u8; HMAC_SIZE] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; HMAC_SIZE];
    out.copy_from_slice(&result);
    out
}

/// Verify an HMAC-SHA256 authenticator in constant time.
pub fn hmac_verify(auth: &[u8; HMAC_SIZE], key: &[u8; HMAC_SIZE], data: &[u8]) -> Result<()> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.verify_slice(auth).map_err(|_| CryptoError::HmacVerification)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_deterministic() {
        assert_eq!(sha256(b"hello"), sha256(b"hello"));
        assert_ne!(sha256(b"hello"), sha256(b"world"));
    }

    #[test]
    fn test_sha512_deterministic() {
        assert_eq!(sha512(b"hello"), sha512(b"hello"));
    }

    #[test]
    fn test_hmac_roundtrip() {
        let key = new_hmac_key();
        let auth = hmac(&key, b"message");
        assert!(hmac_verify(&auth, &key, b"message").is_ok());
    }

    #[test]
    fn test_hmac_wrong_key_fails() {
        let key1 = new_hmac_key();
        let key2 = new_hmac_key();
        let auth = hmac(&key1, b"message");
        assert!(hmac_verify(&auth, &key2, b"message").is_err());
    }

    #[test]
    fn test_hmac_tampered_data_fails() {
        let key = new_hmac_key();
        let auth = hmac(&key, b"message");
        assert!(hmac_verify(&auth, &key, b"tampered").is_err());
    }

    #[test]
    fn test_new_hmac_key_is_random() {
        let k1 = new_hmac_key();
        let k2 = new_hmac_key();
        assert_ne!(k1, k2);
    }
}
