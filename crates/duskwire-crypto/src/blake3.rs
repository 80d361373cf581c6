//! Domain-separated BLAKE3 hashing.
//!
//! BLAKE3 is used for DHT distance computation source material, content
//! hashing, and keyed-MAC duties that don't need HMAC's construction (see
//! [`sha2_hmac`](crate::sha2_hmac) for the HMAC-SHA256 used by cookie auth).
//! Cross-purpose collisions are prevented by mandatory domain separation
//! using BLAKE3's built-in mode flags.
//!
//! ## Modes
//!
//! - [`hash`] — Pure hashing: content addressing
//! - [`derive_key`] — Key derivation: announce tokens, onion hop keys
//! - [`keyed_hash`] — Keyed MAC/PRF

/// Registered context strings for [`derive_key`]. Using an unregistered
/// context string anywhere in the stack is a protocol violation — it would
/// let two unrelated derivations collide if ever fed the same key material.
pub mod contexts {
    pub const ONION_HOP_KEY: &str = "duskwire v1 onion-hop-key";
    pub const ONION_HOP_MAC: &str = "duskwire v1 onion-hop-mac";
    pub const ONION_RETURN_KEY: &str = "duskwire v1 onion-return-key";
    pub const ANNOUNCE_PING_ID: &str = "duskwire v1 announce-ping-id";
    pub const COOKIE_KEY: &str = "duskwire v1 cookie-key";
    pub const COVER_TOKEN: &str = "duskwire v1 cover-token";

    pub const ALL_CONTEXTS: &[&str] = &[
        ONION_HOP_KEY,
        ONION_HOP_MAC,
        ONION_RETURN_KEY,
        ANNOUNCE_PING_ID,
        COOKIE_KEY,
        COVER_TOKEN,
    ];
}

/// Compute a BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Compute a variable-length BLAKE3 hash.
pub fn hash_xof(data: &[u8], output: &mut [u8]) {
    let mut hasher = ::blake3::Hasher::new();
    hasher.update(data);
    let mut reader = hasher.finalize_xof();
    reader.fill(output);
}

/// Derive a key using BLAKE3's built-in key derivation mode.
///
/// `context` should be one of [`contexts::ALL_CONTEXTS`]; `key_material` can
/// be any byte slice.
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    let hash = hasher.finalize();
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Compute a keyed BLAKE3 hash (MAC/PRF). The key must be 32 bytes, typically
/// from [`derive_key`].
pub fn keyed_hash(key: &[u8; 32], message: &[u8]) -> [u8; 32] {
    *::blake3::keyed_hash(key, message).as_bytes()
}

/// Verify that a context string is one of the registered contexts.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// XOR distance between two 256-bit keys, interpreted as big-endian
/// integers, per §3's "two keys are compared by XOR distance".
pub fn xor_distance(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}
