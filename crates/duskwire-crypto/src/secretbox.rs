//! Curve25519/XSalsa20-Poly1305 authenticated encryption (NaCl `box`/`secretbox`).
//!
//! This is the workhorse AEAD for the wire protocol: DHT ping/nodes bodies,
//! onion layers, and net-crypto cookie/handshake packets are all encrypted
//! this way, with a 24-byte nonce and a 16-byte Poly1305 tag appended to the
//! ciphertext — matching `encrypt_data`/`decrypt_data` and the precomputed
//! variants from `crypto_core.h`.

use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{PublicKey as BoxPublicKey, SalsaBox, SecretKey as BoxSecretKey};
use zeroize::Zeroize;

use crate::nonce::NONCE_SIZE;
use crate::{CryptoError, Result};

/// Number of bytes of authentication tag appended by [`encrypt`]/[`encrypt_precomputed`].
pub const MAC_SIZE: usize = 16;

/// A Curve25519 secret key used for box encryption.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretKey {
    inner: BoxSecretKey,
}

/// A Curve25519 public key used for box encryption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    bytes: [u8; 32],
}

/// A shared key precomputed from a (secret, public) pair, so repeated
/// encrypt/decrypt calls to the same peer skip the scalar multiplication.
pub struct PrecomputedKey {
    inner: SalsaBox,
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        Self {
            inner: BoxSecretKey::generate(&mut OsRng),
        }
    }

    /// Construct from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            inner: BoxSecretKey::from_bytes(bytes),
        }
    }

    /// Raw bytes of the secret key.
    pub fn to_bytes(&self) -> [u8; 32] {
        *self.inner.to_bytes()
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            bytes: *self.inner.public_key().as_bytes(),
        }
    }

    /// Precompute the shared key with a peer's public key
    /// (`encrypt_precompute`/`decrypt_data_symmetric` equivalent).
    pub fn precompute(&self, their_public: &PublicKey) -> PrecomputedKey {
        let their = BoxPublicKey::from(their_public.bytes);
        PrecomputedKey {
            inner: SalsaBox::new(&their, &self.inner),
        }
    }
}

impl PublicKey {
    /// Construct from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Raw bytes of the public key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.bytes
    }

    /// Raw bytes as a slice reference.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl PrecomputedKey {
    /// Encrypt `plaintext` under the given 24-byte nonce. Returns
    /// `ciphertext || tag`, `plaintext.len() + MAC_SIZE` bytes long.
    pub fn encrypt(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .encrypt((*nonce).into(), plaintext)
            .map_err(|_| CryptoError::AeadDecryption)
    }

    /// Decrypt `ciphertext` (with appended tag) under the given nonce.
    pub fn decrypt(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .decrypt((*nonce).into(), ciphertext)
            .map_err(|_| CryptoError::AeadDecryption)
    }
}

/// One-shot encrypt from a secret key to a peer's public key (`encrypt_data`
/// equivalent). Prefer [`SecretKey::precompute`] when talking to the same
/// peer repeatedly.
pub fn encrypt(secret: &SecretKey, their_public: &PublicKey, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    secret.precompute(their_public).encrypt(nonce, plaintext)
}

/// One-shot decrypt from a peer's public key using our secret key
/// (`decrypt_data` equivalent).
pub fn decrypt(secret: &SecretKey, their_public: &PublicKey, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
    secret.precompute(their_public).decrypt(nonce, ciphertext)
}

/// Generate a fresh random nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let n = SalsaBox::generate_nonce(&mut OsRng);
    let mut out = [0u8; NONCE_SIZE];
    out.copy_from_slice(n.as_slice());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();
        let nonce = generate_nonce();

        let ct = encrypt(&alice, &bob.public_key(), &nonce, b"hello bob").expect("encrypt");
        let pt = decrypt(&bob, &alice.public_key(), &nonce, &ct).expect("decrypt");
        assert_eq!(pt, b"hello bob");
    }

    #[test]
    fn test_precomputed_roundtrip() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();
        let nonce = generate_nonce();

        let alice_key = alice.precompute(&bob.public_key());
        let bob_key = bob.precompute(&alice.public_key());

        let ct = alice_key.encrypt(&nonce, b"precomputed").expect("encrypt");
        let pt = bob_key.decrypt(&nonce, &ct).expect("decrypt");
        assert_eq!(pt, b"precomputed");
    }

    #[test]
    fn test_ciphertext_has_mac() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();
        let nonce = generate_nonce();
        let ct = encrypt(&alice, &bob.public_key(), &nonce, b"x").expect("encrypt");
        assert_eq!(ct.len(), 1 + MAC_SIZE);
    }

    #[test]
    fn test_wrong_key_fails() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();
        let mallory = SecretKey::generate();
        let nonce = generate_nonce();

        let ct = encrypt(&alice, &bob.public_key(), &nonce, b"secret").expect("encrypt");
        assert!(decrypt(&bob, &mallory.public_key(), &nonce, &ct).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();
        let nonce = generate_nonce();

        let mut ct = encrypt(&alice, &bob.public_key(), &nonce, b"secret").expect("encrypt");
        ct[0] ^= 0xff;
        assert!(decrypt(&bob, &alice.public_key(), &nonce, &ct).is_err());
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let sk = SecretKey::generate();
        let bytes = sk.to_bytes();
        let restored = SecretKey::from_bytes(bytes);
        assert_eq!(sk.public_key(), restored.public_key());
    }
}
