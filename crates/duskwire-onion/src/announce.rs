//! Onion announce store: bucketed `{data_public_key → onion_return_path}`
//! table plus the `ping_id` anti-amplification challenge (§4.3, §8).

use std::net::IpAddr;

use tracing::{debug, trace};

use duskwire_crypto::blake3::{self, contexts};
use duskwire_types::onion::{
    AnnounceEntry, ANNOUNCE_BUCKETS, ANNOUNCE_BUCKET_SIZE, MAX_ANNOUNCEMENT_TIMEOUT_UPTIME_RATIO,
    MAX_MAX_ANNOUNCEMENT_TIMEOUT_SECS, MIN_MAX_ANNOUNCEMENT_TIMEOUT_SECS,
};

use duskwire_types::addr::IpPort;
use duskwire_types::onion::announce_get_bucketnum;

use crate::{OnionError, Result};

/// `ping_id` validity window: the client must echo an id issued within the
/// last `PING_ID_WINDOW_SECS` (coarse time bucketing, per §4.3's "keyed-hash
/// of client IP+time+node-secret").
const PING_ID_WINDOW_SECS: u64 = 20;

/// Issues and verifies the `ping_id` challenge that guards the first
/// announce from a given client, to prevent replay/amplification.
pub struct PingIdIssuer {
    node_secret: [u8; 32],
}

impl PingIdIssuer {
    pub fn new(node_secret: [u8; 32]) -> Self {
        Self { node_secret }
    }

    /// Compute the `ping_id` a client with `client_ip` should echo at
    /// `now_secs`. Two adjacent time buckets are accepted to tolerate clock
    /// skew across the request/response round trip.
    pub fn issue(&self, client_ip: IpAddr, now_secs: u64) -> [u8; 32] {
        self.ping_id_for_bucket(client_ip, now_secs / PING_ID_WINDOW_SECS)
    }

    /// Verify a `ping_id` the client echoed back, accepting the current and
    /// immediately preceding time bucket.
    pub fn verify(&self, client_ip: IpAddr, now_secs: u64, candidate: &[u8; 32]) -> bool {
        let current_bucket = now_secs / PING_ID_WINDOW_SECS;
        let current = self.ping_id_for_bucket(client_ip, current_bucket);
        if &current == candidate {
            return true;
        }
        if current_bucket == 0 {
            return false;
        }
        let previous = self.ping_id_for_bucket(client_ip, current_bucket - 1);
        &previous == candidate
    }

    fn ping_id_for_bucket(&self, client_ip: IpAddr, time_bucket: u64) -> [u8; 32] {
        let key = blake3::derive_key(contexts::ANNOUNCE_PING_ID, &self.node_secret);
        let mut message = Vec::with_capacity(17 + 8);
        match client_ip {
            IpAddr::V4(v4) => {
                message.push(4);
                message.extend_from_slice(&v4.octets());
            }
            IpAddr::V6(v6) => {
                message.push(6);
                message.extend_from_slice(&v6.octets());
            }
        }
        message.extend_from_slice(&time_bucket.to_be_bytes());
        blake3::keyed_hash(&key, &message)
    }
}

/// Negotiate an announcement timeout within `[MIN_MAX_ANNOUNCEMENT_TIMEOUT,
/// MAX_MAX_ANNOUNCEMENT_TIMEOUT]`, additionally capped at `uptime / 4` (§4.3).
pub fn negotiate_timeout_secs(requested_secs: u32, node_uptime_secs: u32) -> u32 {
    let uptime_cap = node_uptime_secs / MAX_ANNOUNCEMENT_TIMEOUT_UPTIME_RATIO;
    requested_secs
        .clamp(MIN_MAX_ANNOUNCEMENT_TIMEOUT_SECS, MAX_MAX_ANNOUNCEMENT_TIMEOUT_SECS)
        .min(uptime_cap.max(MIN_MAX_ANNOUNCEMENT_TIMEOUT_SECS))
}

/// Bucketed storage of announcements, keyed toward this node's own DHT key
/// so the buckets mirror the closeness structure a lookup will probe.
pub struct AnnounceStore {
    base_key: [u8; 32],
    buckets: Vec<Vec<AnnounceEntry>>,
}

impl AnnounceStore {
    pub fn new(base_key: [u8; 32]) -> Self {
        Self {
            base_key,
            buckets: (0..ANNOUNCE_BUCKETS).map(|_| Vec::new()).collect(),
        }
    }

    /// Store (or refresh) an announcement. A key appears at most once across
    /// all bucket slots (§8 invariant). When the target bucket is full, the
    /// entry farthest from `base_key` is evicted if the new one is closer.
    pub fn store(&mut self, entry: AnnounceEntry) -> Result<()> {
        let bucket_idx = announce_get_bucketnum(&self.base_key, &entry.data_public_key);
        let bucket = &mut self.buckets[bucket_idx];

        if let Some(pos) = bucket
            .iter()
            .position(|e| e.data_public_key == entry.data_public_key)
        {
            bucket[pos] = entry;
            return Ok(());
        }

        if bucket.len() < ANNOUNCE_BUCKET_SIZE {
            bucket.push(entry);
            return Ok(());
        }

        let candidate_distance =
            blake3::xor_distance(&self.base_key, &entry.data_public_key);
        let farthest = bucket
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| blake3::xor_distance(&self.base_key, &e.data_public_key))
            .map(|(idx, _)| idx)
            .expect("bucket full implies non-empty");
        let farthest_distance =
            blake3::xor_distance(&self.base_key, &bucket[farthest].data_public_key);

        if candidate_distance < farthest_distance {
            debug!(bucket = bucket_idx, "evicting farthest announce entry for a closer one");
            bucket[farthest] = entry;
            Ok(())
        } else {
            trace!(bucket = bucket_idx, "rejecting announce: bucket full and not closer");
            Err(OnionError::ConstraintViolation(
                "bucket full and candidate is not closer than any stored entry".into(),
            ))
        }
    }

    pub fn lookup(&self, data_public_key: &[u8; 32]) -> Option<&AnnounceEntry> {
        let bucket_idx = announce_get_bucketnum(&self.base_key, data_public_key);
        self.buckets[bucket_idx]
            .iter()
            .find(|e| &e.data_public_key == data_public_key)
    }

    /// Drop expired entries; call periodically from the driver loop.
    pub fn expire(&mut self, now_ms: u64) {
        let before = self.len();
        for bucket in &mut self.buckets {
            bucket.retain(|e| !e.is_expired(now_ms));
        }
        let dropped = before - self.len();
        if dropped > 0 {
            debug!(dropped, "expired stale announce entries");
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle an incoming [`crate::client::AnnounceRequest`]: verify its
/// `ping_id` against the requester's address, store it on success, and reply
/// either way (§4.3, §8). A failed `ping_id` check never stores anything —
/// it only hands back a fresh challenge for the client to retry with.
pub fn respond_to_announce(
    store: &mut AnnounceStore,
    ping_ids: &PingIdIssuer,
    request: &crate::client::AnnounceRequest,
    requester_ip: IpAddr,
    requester_ip_port: IpPort,
    now_secs: u64,
    now_ms: u64,
    node_uptime_secs: u32,
) -> crate::client::AnnounceResponse {
    let fresh_ping_id = ping_ids.issue(requester_ip, now_secs);

    if !ping_ids.verify(requester_ip, now_secs, &request.ping_id) {
        trace!("announce request carried a stale or wrong-address ping_id, challenging again");
        return crate::client::AnnounceResponse {
            sendback_data: request.sendback_data,
            ping_id_or_confirmation: fresh_ping_id,
            is_stored: false,
            found_node_ip_port: None,
        };
    }

    let timeout_secs =
        negotiate_timeout_secs(MAX_MAX_ANNOUNCEMENT_TIMEOUT_SECS, node_uptime_secs);
    let stored = store
        .store(AnnounceEntry {
            data_public_key: request.data_public_key,
            announced_node_ip_port: requester_ip_port,
            timeout_secs,
            stored_at_ms: now_ms,
            stored_payload: None,
        })
        .is_ok();

    crate::client::AnnounceResponse {
        sendback_data: request.sendback_data,
        ping_id_or_confirmation: fresh_ping_id,
        is_stored: stored,
        found_node_ip_port: store.lookup(&request.data_public_key).map(|e| e.announced_node_ip_port),
    }
}

/// Handle an incoming [`crate::client::LookupRequest`]: a read-only probe of
/// whatever is currently stored at `data_public_key`, with no `ping_id`
/// challenge since nothing is written (§4.3 "Lookup protocol").
pub fn respond_to_lookup(
    store: &AnnounceStore,
    request: &crate::client::LookupRequest,
) -> crate::client::LookupResponse {
    let found = store.lookup(&request.data_public_key);
    crate::client::LookupResponse {
        sendback_data: request.sendback_data,
        found_node_ip_port: found.map(|e| e.announced_node_ip_port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn _entry_for_test(data_public_key: [u8; 32], ip_port: IpPort, timeout_secs: u32) -> AnnounceEntry {
        AnnounceEntry {
            data_public_key,
            announced_node_ip_port: ip_port,
            timeout_secs,
            stored_at_ms: 0,
            stored_payload: None,
        }
    }

    fn ip() -> IpPort {
        IpPort::from_v4(Ipv4Addr::LOCALHOST, 33445)
    }

    #[test]
    fn ping_id_verifies_within_window() {
        let issuer = PingIdIssuer::new([7u8; 32]);
        let client_ip = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        let id = issuer.issue(client_ip, 1_000);
        assert!(issuer.verify(client_ip, 1_005, &id));
    }

    #[test]
    fn ping_id_rejects_wrong_ip() {
        let issuer = PingIdIssuer::new([7u8; 32]);
        let id = issuer.issue(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 1_000);
        assert!(!issuer.verify(IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)), 1_000, &id));
    }

    #[test]
    fn negotiate_timeout_clamps_to_bounds() {
        assert_eq!(negotiate_timeout_secs(5, 10_000), MIN_MAX_ANNOUNCEMENT_TIMEOUT_SECS);
        assert_eq!(
            negotiate_timeout_secs(10_000, 10_000_000),
            MAX_MAX_ANNOUNCEMENT_TIMEOUT_SECS
        );
    }

    #[test]
    fn negotiate_timeout_respects_uptime_cap() {
        // uptime of 40s / 4 == 10s, the floor, even though 900 was requested.
        assert_eq!(negotiate_timeout_secs(900, 40), MIN_MAX_ANNOUNCEMENT_TIMEOUT_SECS);
    }

    #[test]
    fn store_and_lookup_roundtrip() {
        let mut store = AnnounceStore::new([0u8; 32]);
        let entry = _entry_for_test([5u8; 32], ip(), 60);
        store.store(entry).expect("store");
        assert!(store.lookup(&[5u8; 32]).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn key_appears_at_most_once() {
        let mut store = AnnounceStore::new([0u8; 32]);
        store.store(_entry_for_test([5u8; 32], ip(), 60)).expect("store");
        store.store(_entry_for_test([5u8; 32], ip(), 120)).expect("store again");
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(&[5u8; 32]).expect("present").timeout_secs, 120);
    }

    #[test]
    fn expire_drops_stale_entries() {
        let mut store = AnnounceStore::new([0u8; 32]);
        store.store(_entry_for_test([5u8; 32], ip(), 10)).expect("store");
        store.expire(50_000);
        assert!(store.is_empty());
    }

    #[test]
    fn respond_to_announce_challenges_before_it_ever_stores() {
        let mut store = AnnounceStore::new([0u8; 32]);
        let issuer = PingIdIssuer::new([3u8; 32]);
        let client_ip = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        let request = crate::client::AnnounceRequest {
            ping_id: [0u8; 32],
            data_public_key: [5u8; 32],
            sendback_data: [1u8; 8],
        };

        let response = respond_to_announce(&mut store, &issuer, &request, client_ip, ip(), 1_000, 0, 1_000);
        assert!(!response.is_stored);
        assert!(store.is_empty());
        assert_eq!(response.sendback_data, request.sendback_data);
    }

    #[test]
    fn respond_to_announce_stores_once_the_challenge_is_echoed_back() {
        let mut store = AnnounceStore::new([0u8; 32]);
        let issuer = PingIdIssuer::new([3u8; 32]);
        let client_ip = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        let fresh_id = issuer.issue(client_ip, 1_000);

        let request = crate::client::AnnounceRequest {
            ping_id: fresh_id,
            data_public_key: [5u8; 32],
            sendback_data: [1u8; 8],
        };
        let response = respond_to_announce(&mut store, &issuer, &request, client_ip, ip(), 1_000, 0, 1_000);
        assert!(response.is_stored);
        assert_eq!(response.found_node_ip_port, Some(ip()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn respond_to_lookup_reveals_a_stored_entry_without_writing_anything() {
        let mut store = AnnounceStore::new([0u8; 32]);
        store.store(_entry_for_test([5u8; 32], ip(), 60)).expect("store");

        let request = crate::client::LookupRequest {
            data_public_key: [5u8; 32],
            sendback_data: [9u8; 8],
        };
        let response = respond_to_lookup(&store, &request);
        assert_eq!(response.found_node_ip_port, Some(ip()));
        assert_eq!(response.sendback_data, request.sendback_data);
        assert_eq!(store.len(), 1, "lookup must not mutate the store");
    }
}
