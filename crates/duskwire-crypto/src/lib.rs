//! # duskwire-crypto
//!
//! Cryptographic primitives for the duskwire P2P transport substrate.
//!
//! The cryptographic suite is fixed: Curve25519 for key agreement,
//! XSalsa20-Poly1305 for authenticated encryption, Ed25519 for the optional
//! group-chat signature keypair, BLAKE3/SHA-2 for hashing. No algorithm
//! negotiation happens anywhere above this crate.
//!
//! ## Modules
//!
//! - [`blake3`] — Domain-separated BLAKE3 hashing and key derivation
//! - [`sha2_hmac`] — SHA-256/SHA-512 hashing and HMAC-SHA256 authentication
//! - [`ed25519`] — Ed25519 signing and verification (RFC 8032)
//! - [`x25519`] — X25519 key agreement (RFC 7748)
//! - [`secretbox`] — Curve25519/XSalsa20-Poly1305 authenticated encryption
//! - [`nonce`] — Nonce increment helpers and sliding replay windows
//! - [`shared_key_cache`] — LRU-ish cache of precomputed X25519 shared keys
//! - [`clock`] — Injectable monotonic clock (`Mono_Time` equivalent)

pub mod blake3;
pub mod clock;
pub mod ed25519;
pub mod nonce;
pub mod secretbox;
pub mod sha2_hmac;
pub mod shared_key_cache;
pub mod x25519;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// AEAD decryption failed (authentication tag mismatch).
    #[error("AEAD decryption failed")]
    AeadDecryption,

    /// HMAC verification failed.
    #[error("HMAC verification failed")]
    HmacVerification,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
