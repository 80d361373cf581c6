//! DHT node-entry data model (§3 "DHT node entry", §4.2).
//!
//! Bucket logic itself (eviction, closeness ordering) lives in
//! `duskwire-dht`; this module only defines the entry shape shared across
//! crates that need to reason about a node's liveness.

use serde::{Deserialize, Serialize};

use crate::addr::IpPort;

/// A single known DHT peer, as tracked in a k-bucket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DhtNodeEntry {
    pub public_key: [u8; 32],
    pub ip_port_v4: Option<IpPort>,
    pub ip_port_v6: Option<IpPort>,
    /// Milliseconds since epoch of the last confirmed pong/response over IPv4.
    pub last_seen_v4_ms: Option<u64>,
    /// Milliseconds since epoch of the last confirmed pong/response over IPv6.
    pub last_seen_v6_ms: Option<u64>,
    /// Milliseconds since epoch we last sent this entry a ping.
    pub last_pinged_ms: Option<u64>,
}

/// Timeout after which an entry with no fresh contact is considered "bad" (§3).
pub const BAD_NODE_TIMEOUT_MS: u64 = 162_000;

impl DhtNodeEntry {
    pub fn new(public_key: [u8; 32]) -> Self {
        Self {
            public_key,
            ip_port_v4: None,
            ip_port_v6: None,
            last_seen_v4_ms: None,
            last_seen_v6_ms: None,
            last_pinged_ms: None,
        }
    }

    /// Most recent contact time across both address families, if any.
    fn last_seen_ms(&self) -> Option<u64> {
        match (self.last_seen_v4_ms, self.last_seen_v6_ms) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// `true` if `now - last_seen > BAD_NODE_TIMEOUT`, or if never seen.
    pub fn is_bad(&self, now_ms: u64) -> bool {
        match self.last_seen_ms() {
            Some(seen) => now_ms.saturating_sub(seen) > BAD_NODE_TIMEOUT_MS,
            None => true,
        }
    }

    pub fn is_good(&self, now_ms: u64) -> bool {
        !self.is_bad(now_ms)
    }
}
