//! Network bootstrap logic for joining the DHT (§4.2 "joining the network").
//!
//! When a new node starts, it contacts seed nodes to populate its routing
//! table. The bootstrap process:
//!
//! 1. Ping each seed node (with retries).
//! 2. Add responsive seeds as verified nodes.
//! 3. Send a nodes-request for the local node's own key to discover nearby
//!    peers, so the self close-list fills in beyond the seeds themselves.
//!
//! ## Configuration
//!
//! [`BootstrapConfig`] specifies the seed nodes and retry parameters.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use duskwire_types::addr::IpPort;
use duskwire_types::dht::DhtNodeEntry;

use crate::routing::{RoutingTable, NODES_RESPONSE_COUNT};
use crate::{DhtError, Result};

/// Configuration for the DHT bootstrap process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// List of seed node addresses to contact initially.
    pub seed_nodes: Vec<SeedNode>,
    /// Maximum number of retry attempts per seed node.
    pub max_retries: u32,
    /// Timeout for each connection attempt in seconds.
    pub timeout_secs: u64,
    /// Minimum number of seed nodes that must respond for bootstrap to succeed.
    pub min_responsive_seeds: usize,
}

/// A seed node endpoint for bootstrapping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedNode {
    /// The seed node's network address.
    #[serde(with = "socket_addr_serde")]
    pub addr: SocketAddr,
    /// The seed node's expected DHT public key (for authentication).
    pub dht_public_key: [u8; 32],
}

/// The result of a bootstrap attempt.
#[derive(Clone, Debug)]
pub struct BootstrapResult {
    /// Number of seed nodes that responded.
    pub responsive_seeds: usize,
    /// Total number of peers discovered and added to the routing table.
    pub peers_discovered: usize,
    /// Whether the bootstrap was successful (enough seeds responded).
    pub success: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            seed_nodes: Vec::new(),
            max_retries: 3,
            timeout_secs: 10,
            min_responsive_seeds: 1,
        }
    }
}

impl BootstrapConfig {
    /// Create a new bootstrap configuration with the given seed nodes.
    pub fn new(seed_nodes: Vec<SeedNode>) -> Self {
        Self {
            seed_nodes,
            ..Default::default()
        }
    }

    /// Validate the bootstrap configuration.
    pub fn validate(&self) -> Result<()> {
        if self.seed_nodes.is_empty() {
            return Err(DhtError::BootstrapFailed(
                "no seed nodes configured".to_string(),
            ));
        }

        if self.min_responsive_seeds > self.seed_nodes.len() {
            return Err(DhtError::BootstrapFailed(format!(
                "min_responsive_seeds ({}) exceeds total seed nodes ({})",
                self.min_responsive_seeds,
                self.seed_nodes.len(),
            )));
        }

        Ok(())
    }
}

/// Bootstrap the DHT by contacting seed nodes and requesting nodes close to self.
///
/// The actual network I/O is performed by the caller through the
/// [`BootstrapTransport`] trait; this function only orchestrates the protocol.
pub async fn bootstrap<T: BootstrapTransport>(
    config: &BootstrapConfig,
    routing_table: &mut RoutingTable,
    transport: &T,
) -> Result<BootstrapResult> {
    config.validate()?;

    info!(
        seed_count = config.seed_nodes.len(),
        "Starting DHT bootstrap"
    );

    let mut responsive_seeds = 0usize;
    let timeout = Duration::from_secs(config.timeout_secs);

    // Phase 1: contact seed nodes, admitting responsive ones as verified.
    for seed in &config.seed_nodes {
        let mut connected = false;
        for attempt in 0..config.max_retries {
            debug!(
                addr = %seed.addr,
                attempt = attempt + 1,
                "Pinging seed node"
            );

            match transport.ping(seed.addr, timeout).await {
                Ok(ip_port) => {
                    let mut entry = DhtNodeEntry::new(seed.dht_public_key);
                    if matches!(ip_port.family, duskwire_types::addr::Family::Ipv6) {
                        entry.ip_port_v6 = Some(ip_port);
                        entry.last_seen_v6_ms = Some(0);
                    } else {
                        entry.ip_port_v4 = Some(ip_port);
                        entry.last_seen_v4_ms = Some(0);
                    }
                    routing_table.add_verified_node(entry, 0);
                    responsive_seeds += 1;
                    connected = true;
                    info!(addr = %seed.addr, "Seed node responded");
                    break;
                }
                Err(e) => {
                    warn!(
                        addr = %seed.addr,
                        attempt = attempt + 1,
                        error = %e,
                        "Seed node ping failed"
                    );
                }
            }
        }

        if !connected {
            warn!(
                addr = %seed.addr,
                pk = hex::encode(seed.dht_public_key),
                "Failed to reach seed node after all retries"
            );
        }
    }

    if responsive_seeds < config.min_responsive_seeds {
        return Err(DhtError::BootstrapFailed(format!(
            "only {} of {} required seed nodes responded",
            responsive_seeds, config.min_responsive_seeds,
        )));
    }

    // Phase 2: ask a seed for nodes close to our own key.
    let self_key = *routing_table.self_key();
    let peers_discovered = match transport.find_nodes(self_key, timeout).await {
        Ok(discovered) => {
            let count = discovered.len();
            for node in discovered {
                routing_table.add_verified_node(node, 0);
            }
            count
        }
        Err(e) => {
            warn!(error = %e, "Self-lookup during bootstrap failed");
            0
        }
    };

    let result = BootstrapResult {
        responsive_seeds,
        peers_discovered,
        success: true,
    };

    info!(
        responsive_seeds = result.responsive_seeds,
        peers_discovered = result.peers_discovered,
        "Bootstrap complete"
    );

    Ok(result)
}

/// Transport trait for bootstrap network operations.
///
/// Implementors provide the actual network I/O. This abstraction allows
/// the bootstrap logic to be tested without real networking.
pub trait BootstrapTransport {
    /// Ping a seed node and return its address as seen in the pong, if it responds.
    fn ping(
        &self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> impl std::future::Future<Output = std::result::Result<IpPort, Box<dyn std::error::Error + Send + Sync>>>
           + Send;

    /// Send a nodes-request for `target` and return up to
    /// [`NODES_RESPONSE_COUNT`] entries from the response.
    fn find_nodes(
        &self,
        target: [u8; 32],
        timeout: Duration,
    ) -> impl std::future::Future<Output = std::result::Result<Vec<DhtNodeEntry>, Box<dyn std::error::Error + Send + Sync>>>
           + Send;
}

/// Serde support for SocketAddr as a string.
mod socket_addr_serde {
    use std::net::SocketAddr;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
