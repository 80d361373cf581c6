//! Single friend connection state (§3 "Friend connection", §4.6).
//!
//! A [`FriendConnection`] is pure data plus small, independently testable
//! state transitions. It never reaches into the DHT, onion client, net-crypto
//! or TCP relay layers itself — those own handles (a net-crypto session id, a
//! relay connection id) are threaded in by [`crate::manager::FriendConnections`]
//! so the cyclic friend/net-crypto/TCP-conn relationship the protocol
//! describes becomes index lookups rather than owning pointers in any
//! direction.

use duskwire_types::friend::{
    FriendConnectionStatus, FRIEND_MAX_STORED_TCP_RELAYS, FRIEND_PING_INTERVAL_SECS,
    MAX_SHARED_RELAYS, SHARE_RELAYS_INTERVAL_SECS,
};

/// One friend's connection bookkeeping.
pub struct FriendConnection {
    pub real_pk: [u8; 32],
    pub dht_temp_pk: Option<[u8; 32]>,
    pub ip_addr: Option<std::net::SocketAddr>,
    /// Opaque handle into whatever table owns the net-crypto session; this
    /// crate never touches the session itself, only its presence/absence.
    pub net_crypto_id: Option<usize>,
    pub status: FriendConnectionStatus,
    /// Ref count: a friend connection can be requested by more than one
    /// upper-layer subscriber (messenger, group chat) and is only torn down
    /// once every holder has released it.
    lock_count: u32,
    tcp_relays: Vec<[u8; 32]>,
    last_ping_sent_ms: Option<u64>,
    last_ping_received_ms: Option<u64>,
    last_share_relays_sent_ms: Option<u64>,
}

impl FriendConnection {
    pub fn new(real_pk: [u8; 32]) -> Self {
        Self {
            real_pk,
            dht_temp_pk: None,
            ip_addr: None,
            net_crypto_id: None,
            status: FriendConnectionStatus::None,
            lock_count: 1,
            tcp_relays: Vec::new(),
            last_ping_sent_ms: None,
            last_ping_received_ms: None,
            last_share_relays_sent_ms: None,
        }
    }

    pub fn lock(&mut self) {
        self.lock_count += 1;
    }

    /// Releases one hold. Returns `true` once the last holder has released
    /// it, meaning the caller should drop this connection.
    pub fn unlock(&mut self) -> bool {
        self.lock_count = self.lock_count.saturating_sub(1);
        self.lock_count == 0
    }

    pub fn set_dht_temp_pk(&mut self, pk: [u8; 32]) {
        self.dht_temp_pk = Some(pk);
        if self.status == FriendConnectionStatus::None {
            self.status = FriendConnectionStatus::Connecting;
        }
    }

    pub fn set_ip(&mut self, addr: std::net::SocketAddr) {
        self.ip_addr = Some(addr);
    }

    pub fn set_net_crypto_id(&mut self, id: usize) {
        self.net_crypto_id = Some(id);
    }

    pub fn clear_net_crypto_id(&mut self) {
        self.net_crypto_id = None;
        self.status = if self.dht_temp_pk.is_some() {
            FriendConnectionStatus::Connecting
        } else {
            FriendConnectionStatus::None
        };
    }

    pub fn mark_connected(&mut self, now_ms: u64) {
        self.status = FriendConnectionStatus::Connected;
        self.last_ping_received_ms = Some(now_ms);
    }

    pub fn mark_timed_out(&mut self) {
        self.status = if self.dht_temp_pk.is_some() {
            FriendConnectionStatus::Connecting
        } else {
            FriendConnectionStatus::None
        };
        self.net_crypto_id = None;
    }

    /// Remembers a relay the friend told us about, evicting the oldest entry
    /// once the bounded store (§3 `FRIEND_MAX_STORED_TCP_RELAYS`) is full.
    pub fn remember_relay(&mut self, relay_pk: [u8; 32]) {
        if self.tcp_relays.contains(&relay_pk) {
            return;
        }
        if self.tcp_relays.len() >= FRIEND_MAX_STORED_TCP_RELAYS {
            self.tcp_relays.remove(0);
        }
        self.tcp_relays.push(relay_pk);
    }

    pub fn stored_relays(&self) -> &[[u8; 32]] {
        &self.tcp_relays
    }

    /// Up to `MAX_SHARED_RELAYS` relays to offer the friend on a share round.
    pub fn relays_to_share(&self, own_relays: &[[u8; 32]]) -> Vec<[u8; 32]> {
        own_relays.iter().take(MAX_SHARED_RELAYS).copied().collect()
    }

    pub fn on_ping_received(&mut self, now_ms: u64) {
        self.last_ping_received_ms = Some(now_ms);
        if self.status == FriendConnectionStatus::Connecting {
            self.status = FriendConnectionStatus::Connected;
        }
    }

    pub fn should_send_ping(&self, now_ms: u64) -> bool {
        self.status == FriendConnectionStatus::Connected
            && elapsed_at_least(self.last_ping_sent_ms, now_ms, FRIEND_PING_INTERVAL_SECS * 1000)
    }

    pub fn record_ping_sent(&mut self, now_ms: u64) {
        self.last_ping_sent_ms = Some(now_ms);
    }

    pub fn should_share_relays(&self, now_ms: u64) -> bool {
        self.status == FriendConnectionStatus::Connected
            && elapsed_at_least(
                self.last_share_relays_sent_ms,
                now_ms,
                SHARE_RELAYS_INTERVAL_SECS * 1000,
            )
    }

    pub fn record_share_relays_sent(&mut self, now_ms: u64) {
        self.last_share_relays_sent_ms = Some(now_ms);
    }

    /// True once a connected friend has gone quiet for 4 ping intervals
    /// (§4.6 `FRIEND_CONNECTION_TIMEOUT`).
    pub fn is_stale(&self, now_ms: u64) -> bool {
        self.status == FriendConnectionStatus::Connected
            && elapsed_at_least(
                self.last_ping_received_ms,
                now_ms,
                FRIEND_PING_INTERVAL_SECS * 4 * 1000,
            )
    }
}

fn elapsed_at_least(last: Option<u64>, now_ms: u64, threshold_ms: u64) -> bool {
    match last {
        None => true,
        Some(last) => now_ms.saturating_sub(last) >= threshold_ms,
    }
}
