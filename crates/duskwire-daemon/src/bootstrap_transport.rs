//! A [`BootstrapTransport`] over the daemon's real UDP socket (§4.2).
//!
//! Runs once at startup, before the main receive loop begins reading from
//! the socket, so it can own `recv_from` exclusively for the duration of the
//! attempt rather than racing the dispatcher over incoming datagrams.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::trace;

use duskwire_dht::bootstrap::BootstrapTransport;
use duskwire_dht::packets::{decode_nodes_response, decode_ping_id, encode_nodes_request, encode_ping_id};
use duskwire_dht::routing::NODES_RESPONSE_COUNT;
use duskwire_transport::socket::{socket_addr_to_ip_port, UdpTransport, MAX_UDP_PACKET_SIZE};
use duskwire_types::addr::{Family, IpPort, PackedNode};
use duskwire_types::dht::DhtNodeEntry;
use duskwire_types::packet::{NODES_REQUEST, NODES_RESPONSE, PING_REQUEST, PING_RESPONSE};

/// Sends real ping/nodes-request packets over `transport` and waits for a
/// matching reply. Remembers the last seed that answered so `find_nodes`
/// knows where to ask, per the [`BootstrapTransport`] contract (it carries
/// no address of its own).
pub struct UdpBootstrapTransport<'a> {
    transport: &'a UdpTransport,
    last_responsive_seed: Mutex<Option<SocketAddr>>,
    next_id: AtomicU64,
}

impl<'a> UdpBootstrapTransport<'a> {
    pub fn new(transport: &'a UdpTransport) -> Self {
        Self {
            transport,
            last_responsive_seed: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    fn fresh_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn recv_matching(
        &self,
        timeout: Duration,
        matches: impl Fn(u8, &[u8], SocketAddr) -> bool,
    ) -> Option<(Vec<u8>, SocketAddr)> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = vec![0u8; MAX_UDP_PACKET_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let Ok(Ok((len, from))) = tokio::time::timeout(remaining, self.transport.recv_from(&mut buf)).await
            else {
                return None;
            };
            let Some((&tag, body)) = buf[..len].split_first() else {
                continue;
            };
            if matches(tag, body, from) {
                return Some((body.to_vec(), from));
            }
        }
    }
}

impl BootstrapTransport for UdpBootstrapTransport<'_> {
    async fn ping(
        &self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Result<IpPort, Box<dyn std::error::Error + Send + Sync>> {
        let ping_id = self.fresh_id();
        let mut packet = vec![PING_REQUEST];
        packet.extend_from_slice(&encode_ping_id(ping_id));
        self.transport.send_to(&packet, addr).await;

        let reply = self
            .recv_matching(timeout, |tag, body, from| {
                from == addr && tag == PING_RESPONSE && decode_ping_id(body).map(|id| id == ping_id).unwrap_or(false)
            })
            .await;

        match reply {
            Some((_, from)) => {
                *self.last_responsive_seed.lock().expect("bootstrap transport lock poisoned") = Some(from);
                Ok(socket_addr_to_ip_port(from))
            }
            None => Err("seed did not answer the ping in time".into()),
        }
    }

    async fn find_nodes(
        &self,
        target: [u8; 32],
        timeout: Duration,
    ) -> Result<Vec<DhtNodeEntry>, Box<dyn std::error::Error + Send + Sync>> {
        let addr = self
            .last_responsive_seed
            .lock()
            .expect("bootstrap transport lock poisoned")
            .ok_or("no seed has responded yet")?;

        let ping_id = self.fresh_id();
        let mut packet = vec![NODES_REQUEST];
        packet.extend_from_slice(&encode_nodes_request(&target, ping_id));
        self.transport.send_to(&packet, addr).await;

        let reply = self
            .recv_matching(timeout, |tag, _body, from| from == addr && tag == NODES_RESPONSE)
            .await;
        let Some((body, _)) = reply else {
            return Ok(Vec::new());
        };
        let (nodes, _echoed_ping_id) = decode_nodes_response(&body)?;
        trace!(count = nodes.len(), "bootstrap nodes-response");
        Ok(nodes.into_iter().take(NODES_RESPONSE_COUNT).map(packed_node_to_entry).collect())
    }
}

fn packed_node_to_entry(node: PackedNode) -> DhtNodeEntry {
    let mut entry = DhtNodeEntry::new(node.public_key);
    match node.ip_port.family {
        Family::Ipv6 => entry.ip_port_v6 = Some(node.ip_port),
        _ => entry.ip_port_v4 = Some(node.ip_port),
    }
    entry
}
