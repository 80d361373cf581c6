//! Owns every friend connection in one arena, keyed by public key.
//!
//! Mirrors the routing table's "manager struct wrapping a keyed map"
//! shape, generalized with an index layer so the friend/net-crypto/TCP-conn
//! triangle the protocol describes stays index lookups: this table hands
//! out `usize` slot ids, never references into itself or its neighbours.

use std::collections::HashMap;

use duskwire_types::friend::FriendCallbackSlot;
use tracing::{debug, warn};

use crate::connection::FriendConnection;
use crate::events::FriendEvent;
use crate::packet::{self, FriendPacket};
use crate::{FriendError, Result};

pub struct FriendConnections {
    slots: Vec<Option<FriendConnection>>,
    index: HashMap<[u8; 32], usize>,
    /// Own relays to offer friends on a share round; set by whatever layer
    /// manages this node's TCP relay pool.
    own_relays: Vec<[u8; 32]>,
}

impl Default for FriendConnections {
    fn default() -> Self {
        Self::new()
    }
}

impl FriendConnections {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            own_relays: Vec::new(),
        }
    }

    pub fn set_own_relays(&mut self, relays: Vec<[u8; 32]>) {
        self.own_relays = relays;
    }

    /// Adds a hold on `real_pk`'s connection, creating it if this is the
    /// first holder. Returns the slot id.
    pub fn new_friend_connection(&mut self, real_pk: [u8; 32]) -> usize {
        if let Some(&id) = self.index.get(&real_pk) {
            if let Some(conn) = self.slots[id].as_mut() {
                conn.lock();
                return id;
            }
        }
        let conn = FriendConnection::new(real_pk);
        let id = self.slots.len();
        self.slots.push(Some(conn));
        self.index.insert(real_pk, id);
        id
    }

    /// Releases a hold; the connection is torn down once every holder has
    /// released it.
    pub fn kill_friend_connection(&mut self, real_pk: [u8; 32]) -> Result<()> {
        let id = *self
            .index
            .get(&real_pk)
            .ok_or(FriendError::UnknownFriend)?;
        let drop_it = match self.slots[id].as_mut() {
            Some(conn) => conn.unlock(),
            None => return Err(FriendError::UnknownFriend),
        };
        if drop_it {
            self.slots[id] = None;
            self.index.remove(&real_pk);
        }
        Ok(())
    }

    pub fn get(&self, real_pk: &[u8; 32]) -> Option<&FriendConnection> {
        self.index.get(real_pk).and_then(|&id| self.slots[id].as_ref())
    }

    pub fn get_mut(&mut self, real_pk: &[u8; 32]) -> Option<&mut FriendConnection> {
        let id = *self.index.get(real_pk)?;
        self.slots[id].as_mut()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Friends still missing a piece of the discovery chain this crate
    /// deliberately doesn't own (§4.6): a DHT_temp_pk, an IP, or a net-crypto
    /// session. The daemon drives these forward by calling back into
    /// [`FriendConnection::set_dht_temp_pk`]/`set_ip`/`set_net_crypto_id`.
    pub fn friends_needing_discovery(&self) -> Vec<[u8; 32]> {
        self.slots
            .iter()
            .flatten()
            .filter(|conn| conn.status != duskwire_types::friend::FriendConnectionStatus::Connected)
            .map(|conn| conn.real_pk)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// One driver tick (§3 "a single periodic driver invokes each
    /// component's `do_*` step"): emits keepalives, relay shares, timeout
    /// transitions, and the events those produce.
    pub fn step(&mut self, now_ms: u64) -> Vec<FriendEvent> {
        let mut events = Vec::new();
        let own_relays = self.own_relays.clone();
        for slot in self.slots.iter_mut().flatten() {
            if slot.is_stale(now_ms) {
                warn!(friend_pk = ?slot.real_pk, "friend connection timed out, no alive packet received");
                slot.mark_timed_out();
                events.push(FriendEvent::StatusChanged {
                    friend_pk: slot.real_pk,
                    connected: false,
                });
                continue;
            }
            if slot.should_send_ping(now_ms) {
                slot.record_ping_sent(now_ms);
            }
            if slot.should_share_relays(now_ms) {
                slot.record_share_relays_sent(now_ms);
                let relays = slot.relays_to_share(&own_relays);
                if !relays.is_empty() {
                    let payload = packet::encode(&FriendPacket::ShareRelays(relays));
                    events.push(FriendEvent::OutgoingPacket {
                        friend_pk: slot.real_pk,
                        payload,
                    });
                }
            }
        }
        events
    }

    /// A net-crypto session for `real_pk` reached `Confirmed`.
    pub fn on_session_confirmed(&mut self, real_pk: [u8; 32], net_crypto_id: usize, now_ms: u64) -> Vec<FriendEvent> {
        let Some(conn) = self.get_mut(&real_pk) else {
            return Vec::new();
        };
        conn.set_net_crypto_id(net_crypto_id);
        conn.mark_connected(now_ms);
        debug!(friend_pk = ?real_pk, "friend connection confirmed");
        vec![FriendEvent::StatusChanged {
            friend_pk: real_pk,
            connected: true,
        }]
    }

    pub fn on_session_lost(&mut self, real_pk: [u8; 32]) -> Vec<FriendEvent> {
        let Some(conn) = self.get_mut(&real_pk) else {
            return Vec::new();
        };
        conn.clear_net_crypto_id();
        vec![FriendEvent::StatusChanged {
            friend_pk: real_pk,
            connected: false,
        }]
    }

    /// Decodes and dispatches a friend-layer payload delivered by a
    /// confirmed net-crypto session, in the given callback slot.
    pub fn handle_payload(
        &mut self,
        real_pk: [u8; 32],
        slot: FriendCallbackSlot,
        payload: &[u8],
    ) -> Result<Vec<FriendEvent>> {
        let decoded = packet::decode(payload)?;
        match decoded {
            FriendPacket::Alive => {
                if let Some(conn) = self.get_mut(&real_pk) {
                    conn.on_ping_received(0);
                }
                Ok(Vec::new())
            }
            FriendPacket::ShareRelays(relays) => {
                if let Some(conn) = self.get_mut(&real_pk) {
                    for relay in &relays {
                        conn.remember_relay(*relay);
                    }
                }
                Ok(vec![FriendEvent::RelaysReceived {
                    friend_pk: real_pk,
                    relays,
                }])
            }
            FriendPacket::FriendRequestRelay(payload) => Ok(vec![FriendEvent::LosslessData {
                friend_pk: real_pk,
                slot,
                payload,
            }]),
        }
    }
}
