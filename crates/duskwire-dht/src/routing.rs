//! DHT routing table: one self close-list plus one close-list per friend
//! (§3, §4.2).

use std::collections::HashMap;

use duskwire_types::addr::IpPort;
use duskwire_types::dht::DhtNodeEntry;

use crate::close_list::{CloseList, InsertOutcome};
use crate::ping_queue::PingQueue;

/// Every node in a close list is pinged at most this often (§4.2).
pub const PING_INTERVAL_MS: u64 = 60_000;

/// Nodes-response returns up to this many closest entries (§4.2).
pub const NODES_RESPONSE_COUNT: usize = 4;

pub struct RoutingTable {
    self_key: [u8; 32],
    self_list: CloseList,
    friend_lists: HashMap<[u8; 32], CloseList>,
    to_ping: PingQueue,
}

impl RoutingTable {
    pub fn new(self_key: [u8; 32]) -> Self {
        Self {
            self_key,
            self_list: CloseList::new(self_key),
            friend_lists: HashMap::new(),
            to_ping: PingQueue::new(self_key),
        }
    }

    pub fn self_key(&self) -> &[u8; 32] {
        &self.self_key
    }

    /// Start tracking a friend's close list, keyed to the friend's public key (§4.2).
    pub fn add_friend(&mut self, friend_pk: [u8; 32]) {
        self.friend_lists
            .entry(friend_pk)
            .or_insert_with(|| CloseList::new(friend_pk));
    }

    pub fn remove_friend(&mut self, friend_pk: &[u8; 32]) {
        self.friend_lists.remove(friend_pk);
    }

    /// Best known address for a friend, if any close-list entry is good (§4.2).
    pub fn get_friend_ip(&self, friend_pk: &[u8; 32], now_ms: u64) -> Option<IpPort> {
        let list = self.friend_lists.get(friend_pk)?;
        list.iter()
            .find(|e| e.public_key == *friend_pk && e.is_good(now_ms))
            .and_then(|e| e.ip_port_v4.or(e.ip_port_v6))
    }

    /// Admit a verified (pong- or nodes-response-confirmed) node into the
    /// self list and into every friend list it matches (§3 "inserted on
    /// being heard from a pong or nodes-response").
    pub fn add_verified_node(&mut self, entry: DhtNodeEntry, now_ms: u64) -> InsertOutcome {
        if let Some(list) = self.friend_lists.get_mut(&entry.public_key) {
            list.insert(entry.clone(), now_ms);
        }
        self.self_list.insert(entry, now_ms)
    }

    /// Queue a node heard about from an unauthenticated source (e.g. inside
    /// a peer's nodes-response) for anti-amplification verification (§4.2).
    pub fn queue_unverified(&mut self, public_key: [u8; 32], ip_port_hint: IpPort, now_ms: u64) {
        self.to_ping.push(public_key, ip_port_hint, now_ms);
    }

    pub fn take_verified_from_queue(&mut self, public_key: &[u8; 32]) -> Option<IpPort> {
        self.to_ping.take_verified(public_key)
    }

    pub fn nodes_due_for_verification_ping(&mut self, now_ms: u64) -> Vec<([u8; 32], IpPort)> {
        self.to_ping.due_for_ping(now_ms)
    }

    /// The closest [`NODES_RESPONSE_COUNT`] entries to `target` across the
    /// self list (§4.2 nodes-response).
    pub fn closest_to(&self, target: &[u8; 32], count: usize) -> Vec<DhtNodeEntry> {
        // The self list is sorted toward self_key, not toward an arbitrary
        // target, so re-rank by distance to the requested target here.
        let mut all: Vec<&DhtNodeEntry> = self.self_list.iter().collect();
        all.sort_by(|a, b| {
            duskwire_crypto::blake3::xor_distance(target, &a.public_key)
                .cmp(&duskwire_crypto::blake3::xor_distance(target, &b.public_key))
        });
        all.into_iter().take(count).cloned().collect()
    }

    pub fn self_list_len(&self) -> usize {
        self.self_list.len()
    }

    pub fn friend_list_len(&self, friend_pk: &[u8; 32]) -> Option<usize> {
        self.friend_lists.get(friend_pk).map(CloseList::len)
    }

    /// Nodes whose next ping is due, at most once per [`PING_INTERVAL_MS`] (§4.2).
    pub fn nodes_due_for_ping(&self, now_ms: u64) -> Vec<[u8; 32]> {
        self.self_list
            .iter()
            .chain(self.friend_lists.values().flat_map(CloseList::iter))
            .filter(|e| match e.last_pinged_ms {
                None => true,
                Some(last) => now_ms.saturating_sub(last) >= PING_INTERVAL_MS,
            })
            .map(|e| e.public_key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn verified_entry(byte: u8, now_ms: u64) -> DhtNodeEntry {
        let mut e = DhtNodeEntry::new([byte; 32]);
        e.ip_port_v4 = Some(IpPort::from_v4(Ipv4Addr::LOCALHOST, 33445 + byte as u16));
        e.last_seen_v4_ms = Some(now_ms);
        e
    }

    #[test]
    fn add_friend_then_verified_node_populates_friend_ip() {
        let mut table = RoutingTable::new([0u8; 32]);
        table.add_friend([5u8; 32]);
        table.add_verified_node(verified_entry(5, 0), 0);
        assert_eq!(
            table.get_friend_ip(&[5u8; 32], 0),
            Some(IpPort::from_v4(Ipv4Addr::LOCALHOST, 33450))
        );
    }

    #[test]
    fn unknown_friend_has_no_ip() {
        let table = RoutingTable::new([0u8; 32]);
        assert!(table.get_friend_ip(&[9u8; 32], 0).is_none());
    }

    #[test]
    fn closest_to_returns_requested_count() {
        let mut table = RoutingTable::new([0u8; 32]);
        for i in 1..=5u8 {
            table.add_verified_node(verified_entry(i, 0), 0);
        }
        let closest = table.closest_to(&[1u8; 32], NODES_RESPONSE_COUNT);
        assert_eq!(closest.len(), NODES_RESPONSE_COUNT);
    }

    #[test]
    fn queue_and_verify_roundtrip() {
        let mut table = RoutingTable::new([0u8; 32]);
        let hint = IpPort::from_v4(Ipv4Addr::LOCALHOST, 33445);
        table.queue_unverified([1u8; 32], hint, 0);
        assert_eq!(table.take_verified_from_queue(&[1u8; 32]), Some(hint));
    }
}
