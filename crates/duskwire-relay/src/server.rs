//! Server-side TCP relay: connection registry and mutual-registration
//! routing (§4.4 "Server").
//!
//! A relay accepts up to [`TCP_SERVER_MAX_CONNECTIONS`] clients. Each client
//! registers, under a `connection_id` of its own choosing, the public keys
//! of peers it wants routed to. Data only forwards between two clients once
//! each has registered the other — a one-sided registration just tells the
//! server who this client *wants* to reach, not who may reach it.

use std::collections::HashMap;

use tracing::debug;

use duskwire_types::relay::{MAX_TCP_MUX_CONNECTIONS, TCP_SERVER_MAX_CONNECTIONS};

use crate::{RelayError, Result};

struct ClientSlot {
    peer_pk: [u8; 32],
    /// `registrations[connection_id]` is the peer this client wants routed
    /// under that id, chosen by the client itself.
    registrations: Vec<Option<[u8; 32]>>,
}

/// Registry of connected clients and their cross-registrations.
pub struct RelayServer {
    slots: Vec<Option<ClientSlot>>,
    pk_to_slot: HashMap<[u8; 32], usize>,
}

impl RelayServer {
    pub fn new() -> Self {
        Self {
            slots: (0..TCP_SERVER_MAX_CONNECTIONS).map(|_| None).collect(),
            pk_to_slot: HashMap::new(),
        }
    }

    /// Admit a newly-confirmed client connection, returning its slot index.
    pub fn accept_client(&mut self, peer_pk: [u8; 32]) -> Result<usize> {
        if self.pk_to_slot.contains_key(&peer_pk) {
            return Err(RelayError::InvalidArgument("peer already connected".into()));
        }
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                RelayError::ResourceExhausted(format!(
                    "server already holding {TCP_SERVER_MAX_CONNECTIONS} connections"
                ))
            })?;
        self.slots[index] = Some(ClientSlot {
            peer_pk,
            registrations: vec![None; MAX_TCP_MUX_CONNECTIONS],
        });
        self.pk_to_slot.insert(peer_pk, index);
        debug!(index, "client connected to relay");
        Ok(index)
    }

    pub fn disconnect_client(&mut self, index: usize) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| RelayError::NotFound(format!("slot {index}")))?
            .take()
            .ok_or_else(|| RelayError::NotFound(format!("slot {index}")))?;
        self.pk_to_slot.remove(&slot.peer_pk);
        debug!(index, "client disconnected from relay");
        Ok(())
    }

    /// Record that the client at `index` wants `target_pk` routed under
    /// `connection_id`.
    pub fn register(&mut self, index: usize, connection_id: u8, target_pk: [u8; 32]) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or_else(|| RelayError::NotFound(format!("slot {index}")))?;
        slot.registrations[connection_id as usize] = Some(target_pk);
        Ok(())
    }

    /// Whether `index` and the client identified by `target_pk` have each
    /// registered the other — the precondition for routing data between them.
    pub fn is_mutually_registered(&self, index: usize, target_pk: &[u8; 32]) -> bool {
        let Some(slot) = self.slots.get(index).and_then(Option::as_ref) else {
            return false;
        };
        if !slot.registrations.contains(&Some(*target_pk)) {
            return false;
        }
        let Some(&target_index) = self.pk_to_slot.get(target_pk) else {
            return false;
        };
        let Some(target_slot) = self.slots.get(target_index).and_then(Option::as_ref) else {
            return false;
        };
        target_slot.registrations.contains(&Some(slot.peer_pk))
    }

    /// Translate a `{src_index, src_connection_id}` data frame into the
    /// `{dst_index, dst_connection_id}` it should be forwarded as, failing
    /// if the two clients aren't mutually registered.
    pub fn route_data(&self, src_index: usize, src_connection_id: u8) -> Result<(usize, u8)> {
        let src_slot = self
            .slots
            .get(src_index)
            .and_then(Option::as_ref)
            .ok_or_else(|| RelayError::NotFound(format!("slot {src_index}")))?;
        let target_pk = src_slot.registrations[src_connection_id as usize]
            .ok_or_else(|| RelayError::NotFound(format!("connection_id {src_connection_id} unregistered")))?;

        let dst_index = *self
            .pk_to_slot
            .get(&target_pk)
            .ok_or_else(|| RelayError::NotFound("target peer not connected".into()))?;
        let dst_slot = self.slots[dst_index].as_ref().expect("pk_to_slot is consistent");
        let dst_connection_id = dst_slot
            .registrations
            .iter()
            .position(|slot| slot == &Some(src_slot.peer_pk))
            .ok_or_else(|| RelayError::NotFound("clients are not mutually registered".into()))?;

        Ok((dst_index, dst_connection_id as u8))
    }

    pub fn connected_count(&self) -> usize {
        self.pk_to_slot.len()
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutual_registration_enables_routing() {
        let mut server = RelayServer::new();
        let a = server.accept_client([1u8; 32]).expect("accept a");
        let b = server.accept_client([2u8; 32]).expect("accept b");

        server.register(a, 0, [2u8; 32]).expect("a registers b");
        assert!(!server.is_mutually_registered(a, &[2u8; 32]));

        server.register(b, 0, [1u8; 32]).expect("b registers a");
        assert!(server.is_mutually_registered(a, &[2u8; 32]));

        let (dst_index, dst_conn_id) = server.route_data(a, 0).expect("route");
        assert_eq!(dst_index, b);
        assert_eq!(dst_conn_id, 0);
    }

    #[test]
    fn one_sided_registration_does_not_route() {
        let mut server = RelayServer::new();
        let a = server.accept_client([1u8; 32]).expect("accept a");
        server.accept_client([2u8; 32]).expect("accept b");
        server.register(a, 0, [2u8; 32]).expect("a registers b");
        assert!(server.route_data(a, 0).is_err());
    }

    #[test]
    fn disconnect_frees_slot_and_pk() {
        let mut server = RelayServer::new();
        let a = server.accept_client([1u8; 32]).expect("accept");
        server.disconnect_client(a).expect("disconnect");
        assert_eq!(server.connected_count(), 0);
        // Slot is reusable after disconnect.
        server.accept_client([9u8; 32]).expect("accept again");
    }

    #[test]
    fn duplicate_peer_key_rejected() {
        let mut server = RelayServer::new();
        server.accept_client([1u8; 32]).expect("accept");
        assert!(server.accept_client([1u8; 32]).is_err());
    }
}
