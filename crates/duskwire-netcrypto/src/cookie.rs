//! Cookie exchange: the responder proves its own liveness check without
//! allocating per-requester state (§4.5).
//!
//! A cookie is `{real_pk, dht_pk, timestamp}` authenticated with an
//! HMAC-SHA256 tag under a secret known only to the minting node. Anyone
//! holding that secret can verify a cookie it handed out earlier without
//! having stored anything about the request — the state lives in the
//! cookie itself, not the responder.

use duskwire_crypto::sha2_hmac::{self, HMAC_SIZE};
use duskwire_types::netcrypto::COOKIE_TIMEOUT_SECS;

use crate::{NetCryptoError, Result};

const REAL_PK_OFFSET: usize = 0;
const DHT_PK_OFFSET: usize = 32;
const TIMESTAMP_OFFSET: usize = 64;
const MAC_OFFSET: usize = 72;

/// Size of an encoded cookie: `real_pk(32) + dht_pk(32) + timestamp(8) + hmac(32)`.
pub const COOKIE_SIZE: usize = MAC_OFFSET + HMAC_SIZE;

/// Secret used to mint and verify cookies. Held only by the minting node;
/// never transmitted. Rotating it invalidates every cookie issued under the
/// previous value.
pub struct CookieSecretKey {
    key: [u8; HMAC_SIZE],
}

impl CookieSecretKey {
    pub fn generate() -> Self {
        Self {
            key: sha2_hmac::new_hmac_key(),
        }
    }

    pub fn from_bytes(key: [u8; HMAC_SIZE]) -> Self {
        Self { key }
    }

    /// Mint a fresh cookie for `(real_pk, dht_pk)`, timestamped `now_secs`.
    pub fn mint(&self, real_pk: &[u8; 32], dht_pk: &[u8; 32], now_secs: u64) -> [u8; COOKIE_SIZE] {
        let mut plain = [0u8; MAC_OFFSET];
        plain[REAL_PK_OFFSET..REAL_PK_OFFSET + 32].copy_from_slice(real_pk);
        plain[DHT_PK_OFFSET..DHT_PK_OFFSET + 32].copy_from_slice(dht_pk);
        plain[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8].copy_from_slice(&now_secs.to_be_bytes());

        let mac = sha2_hmac::hmac(&self.key, &plain);
        let mut cookie = [0u8; COOKIE_SIZE];
        cookie[..MAC_OFFSET].copy_from_slice(&plain);
        cookie[MAC_OFFSET..].copy_from_slice(&mac);
        cookie
    }

    /// Verify a cookie's tag and freshness, returning `(real_pk, dht_pk)` on
    /// success (§8 "Cookie freshness"): a cookie older than
    /// [`COOKIE_TIMEOUT_SECS`] is rejected even with a valid tag.
    pub fn verify(&self, cookie: &[u8; COOKIE_SIZE], now_secs: u64) -> Result<([u8; 32], [u8; 32])> {
        let plain = &cookie[..MAC_OFFSET];
        let mut mac = [0u8; HMAC_SIZE];
        mac.copy_from_slice(&cookie[MAC_OFFSET..]);
        sha2_hmac::hmac_verify(&mac, &self.key, plain).map_err(|_| NetCryptoError::AuthenticationFailed)?;

        let mut timestamp_bytes = [0u8; 8];
        timestamp_bytes.copy_from_slice(&cookie[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]);
        let minted_at = u64::from_be_bytes(timestamp_bytes);
        if now_secs.saturating_sub(minted_at) > COOKIE_TIMEOUT_SECS {
            return Err(NetCryptoError::AuthenticationFailed);
        }

        let mut real_pk = [0u8; 32];
        real_pk.copy_from_slice(&cookie[REAL_PK_OFFSET..REAL_PK_OFFSET + 32]);
        let mut dht_pk = [0u8; 32];
        dht_pk.copy_from_slice(&cookie[DHT_PK_OFFSET..DHT_PK_OFFSET + 32]);
        Ok((real_pk, dht_pk))
    }
}
