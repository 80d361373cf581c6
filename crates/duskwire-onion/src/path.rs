//! 3-hop onion path construction (§4.3 "An onion path is three nodes…").
//!
//! Each hop gets a fresh ephemeral keypair so a compromised relay, the
//! destination, or an observer correlating traffic can never tie two paths
//! to the same sender. The client keeps the ephemeral secrets (to decrypt
//! responses); [`duskwire_types::onion::OnionPath`] only carries what's
//! shared on the wire (the public halves).

use tracing::debug;

use duskwire_crypto::secretbox::SecretKey;
use duskwire_types::dht::DhtNodeEntry;
use duskwire_types::onion::{OnionHop, OnionPath, ONION_PATH_LENGTH};

use crate::{OnionError, Result};

/// A freshly built path plus the ephemeral secrets needed to unwrap replies.
/// Never serialized; lives only for the path's lifetime in the client.
pub struct ClientPath {
    pub path: OnionPath,
    hop_secrets: [SecretKey; ONION_PATH_LENGTH],
}

impl ClientPath {
    /// Build a path over `hops` (entry, middle, exit), generating a fresh
    /// ephemeral keypair per hop.
    pub fn build(hops: &[DhtNodeEntry], now_ms: u64) -> Result<Self> {
        if hops.len() != ONION_PATH_LENGTH {
            return Err(OnionError::InsufficientRelays {
                need: ONION_PATH_LENGTH,
                have: hops.len(),
            });
        }

        let mut onion_hops = Vec::with_capacity(ONION_PATH_LENGTH);
        let mut secrets = Vec::with_capacity(ONION_PATH_LENGTH);

        for hop in hops {
            let ip_port = hop
                .ip_port_v4
                .or(hop.ip_port_v6)
                .ok_or_else(|| OnionError::PathConstruction("hop has no known address".into()))?;
            let secret = SecretKey::generate();
            onion_hops.push(OnionHop {
                node_public_key: hop.public_key,
                node_ip_port: ip_port,
                hop_ephemeral_public: secret.public_key().to_bytes(),
            });
            secrets.push(secret);
        }

        let hop_secrets: [SecretKey; ONION_PATH_LENGTH] = secrets
            .try_into()
            .unwrap_or_else(|_| unreachable!("checked length above"));

        debug!(now_ms, "built onion path");

        Ok(Self {
            path: OnionPath {
                hops: onion_hops
                    .try_into()
                    .unwrap_or_else(|_| unreachable!("checked length above")),
                created_at_ms: now_ms,
            },
            hop_secrets,
        })
    }

    pub fn hop_secret(&self, hop_index: usize) -> &SecretKey {
        &self.hop_secrets[hop_index]
    }
}

/// Pick `ONION_PATH_LENGTH` distinct, address-bearing nodes from `candidates`
/// for a path, preferring the closest entries the caller already ranked.
/// Unlike a Kademlia lookup, onion hop selection doesn't target a specific
/// key — any known-good node works — so the caller supplies whatever
/// ordering (e.g. freshest-seen) it wants respected.
pub fn select_hops(candidates: &[DhtNodeEntry]) -> Result<Vec<DhtNodeEntry>> {
    let mut selected = Vec::with_capacity(ONION_PATH_LENGTH);
    let mut used_keys = std::collections::HashSet::new();

    for node in candidates {
        if selected.len() == ONION_PATH_LENGTH {
            break;
        }
        if (node.ip_port_v4.is_some() || node.ip_port_v6.is_some())
            && used_keys.insert(node.public_key)
        {
            selected.push(node.clone());
        }
    }

    if selected.len() < ONION_PATH_LENGTH {
        return Err(OnionError::InsufficientRelays {
            need: ONION_PATH_LENGTH,
            have: selected.len(),
        });
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duskwire_types::addr::IpPort;
    use std::net::Ipv4Addr;

    fn node(byte: u8) -> DhtNodeEntry {
        let mut n = DhtNodeEntry::new([byte; 32]);
        n.ip_port_v4 = Some(IpPort::from_v4(Ipv4Addr::LOCALHOST, 33445 + byte as u16));
        n
    }

    #[test]
    fn select_hops_picks_distinct_addressed_nodes() {
        let candidates = vec![node(1), node(2), node(3), node(4)];
        let hops = select_hops(&candidates).expect("select");
        assert_eq!(hops.len(), ONION_PATH_LENGTH);
    }

    #[test]
    fn select_hops_fails_when_too_few_candidates() {
        let candidates = vec![node(1)];
        assert!(select_hops(&candidates).is_err());
    }

    #[test]
    fn select_hops_skips_addressless_nodes() {
        let addressless = DhtNodeEntry::new([9u8; 32]);
        let candidates = vec![node(1), addressless, node(2), node(3)];
        let hops = select_hops(&candidates).expect("select");
        assert!(hops.iter().all(|h| h.ip_port_v4.is_some()));
    }

    #[test]
    fn build_path_generates_distinct_ephemeral_keys() {
        let hops = vec![node(1), node(2), node(3)];
        let client_path = ClientPath::build(&hops, 1_000).expect("build");
        let a = client_path.path.hops[0].hop_ephemeral_public;
        let b = client_path.path.hops[1].hop_ephemeral_public;
        assert_ne!(a, b);
        assert_eq!(client_path.path.created_at_ms, 1_000);
    }

    #[test]
    fn build_path_rejects_wrong_hop_count() {
        let hops = vec![node(1), node(2)];
        assert!(ClientPath::build(&hops, 0).is_err());
    }
}
