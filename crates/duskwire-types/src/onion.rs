//! Onion path and announce-store data model (§3 "Onion path", "Announce entry", §4.3).

use serde::{Deserialize, Serialize};

use crate::addr::IpPort;

/// Number of hops in an onion circuit (§2, §4.3: "three relays").
pub const ONION_PATH_LENGTH: usize = 3;

/// One hop of an onion path: the relay's identity plus the fresh ephemeral
/// keypair generated for that hop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OnionHop {
    pub node_public_key: [u8; 32],
    pub node_ip_port: IpPort,
    pub hop_ephemeral_public: [u8; 32],
}

/// A 3-hop onion circuit (§4.3). Send paths live ~`SEND_PATH_LIFETIME_MS`;
/// announce paths live longer, both enforced by `duskwire-onion`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OnionPath {
    pub hops: [OnionHop; ONION_PATH_LENGTH],
    pub created_at_ms: u64,
}

/// Default send-path lifetime before rotation (§4.3: "rotated every ~30 s").
pub const SEND_PATH_LIFETIME_MS: u64 = 30_000;

impl OnionPath {
    pub fn is_expired(&self, now_ms: u64, lifetime_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > lifetime_ms
    }

    pub fn first_hop(&self) -> &OnionHop {
        &self.hops[0]
    }

    pub fn last_hop(&self) -> &OnionHop {
        &self.hops[ONION_PATH_LENGTH - 1]
    }
}

/// Number of buckets in the announce store's hash table (§4.3).
pub const ANNOUNCE_BUCKETS: usize = 32;
/// Entries retained per bucket before closer keys evict farther ones (§3).
pub const ANNOUNCE_BUCKET_SIZE: usize = 8;
/// Bits of prefix used to pick a bucket (§3: "first 5 bits after the highest
/// differing bit").
pub const ANNOUNCE_BUCKET_PREFIX_LENGTH: u32 = 5;

/// Bounds on the negotiated announcement timeout (§4.3).
pub const MIN_MAX_ANNOUNCEMENT_TIMEOUT_SECS: u32 = 10;
pub const MAX_MAX_ANNOUNCEMENT_TIMEOUT_SECS: u32 = 900;
/// The timeout is additionally capped at `uptime / MAX_ANNOUNCEMENT_TIMEOUT_UPTIME_RATIO`.
pub const MAX_ANNOUNCEMENT_TIMEOUT_UPTIME_RATIO: u32 = 4;

/// A stored announcement: `{data_public_key → onion_return_path}` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnounceEntry {
    pub data_public_key: [u8; 32],
    /// Return path the announcing client used; packets destined for
    /// `data_public_key` are routed back through this, never directly to an IP.
    pub announced_node_ip_port: IpPort,
    pub timeout_secs: u32,
    pub stored_at_ms: u64,
    pub stored_payload: Option<Vec<u8>>,
}

impl AnnounceEntry {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.stored_at_ms) > (self.timeout_secs as u64) * 1000
    }
}

/// Deterministic bucket index for `data_public_key` relative to `base`
/// (the announce store's own DHT key), per §3/§8's
/// `announce_get_bucketnum(base, pk) -> [0, 32)`.
///
/// The bucket is the `ANNOUNCE_BUCKET_PREFIX_LENGTH` bits immediately
/// following the highest bit at which `base` and `pk` differ.
pub fn announce_get_bucketnum(base: &[u8; 32], pk: &[u8; 32]) -> usize {
    let mut highest_differing_bit: Option<u32> = None;
    'outer: for byte_idx in 0..32 {
        let diff = base[byte_idx] ^ pk[byte_idx];
        if diff != 0 {
            for bit in (0..8u32).rev() {
                if diff & (1 << bit) != 0 {
                    highest_differing_bit = Some((byte_idx as u32) * 8 + (7 - bit));
                    break 'outer;
                }
            }
        }
    }

    let start_bit = match highest_differing_bit {
        Some(b) => b + 1,
        None => return 0, // identical keys: bucket 0
    };

    let mut bucket = 0usize;
    for i in 0..ANNOUNCE_BUCKET_PREFIX_LENGTH {
        let bit_pos = start_bit + i;
        if bit_pos >= 256 {
            break;
        }
        let byte_idx = (bit_pos / 8) as usize;
        let bit_in_byte = 7 - (bit_pos % 8);
        let bit = (pk[byte_idx] >> bit_in_byte) & 1;
        bucket = (bucket << 1) | bit as usize;
    }
    bucket % ANNOUNCE_BUCKETS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucketnum_is_in_range() {
        let base = [0u8; 32];
        for seed in 0u8..50 {
            let mut pk = [0u8; 32];
            pk[0] = seed;
            pk[15] = seed.wrapping_mul(7);
            let bucket = announce_get_bucketnum(&base, &pk);
            assert!(bucket < ANNOUNCE_BUCKETS);
        }
    }

    #[test]
    fn bucketnum_is_deterministic() {
        let base = [3u8; 32];
        let pk = [9u8; 32];
        assert_eq!(
            announce_get_bucketnum(&base, &pk),
            announce_get_bucketnum(&base, &pk)
        );
    }

    #[test]
    fn identical_keys_bucket_zero() {
        let k = [7u8; 32];
        assert_eq!(announce_get_bucketnum(&k, &k), 0);
    }

    #[test]
    fn announce_entry_expiry() {
        let entry = AnnounceEntry {
            data_public_key: [1u8; 32],
            announced_node_ip_port: IpPort::from_v4(std::net::Ipv4Addr::LOCALHOST, 33445),
            timeout_secs: 10,
            stored_at_ms: 0,
            stored_payload: None,
        };
        assert!(!entry.is_expired(5_000));
        assert!(entry.is_expired(10_001));
    }
}
