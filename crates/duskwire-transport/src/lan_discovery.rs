//! Periodic LAN broadcast of our own DHT key (§6 "LAN discovery").

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use duskwire_types::addr::Family;
use duskwire_types::config::{DEFAULT_END_PORT, DEFAULT_START_PORT};
use duskwire_types::packet::LAN_DISCOVERY;

use crate::socket::UdpTransport;

/// Broadcast cadence (§6).
pub const LAN_DISCOVERY_INTERVAL: Duration = Duration::from_secs(10);

/// Build the `[0x21][dht_pk:32]` broadcast payload (§6).
pub fn build_announce(dht_public_key: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 32);
    out.push(LAN_DISCOVERY);
    out.extend_from_slice(dht_public_key);
    out
}

/// Parse a received LAN discovery packet body (post first-byte strip).
pub fn parse_announce(body: &[u8]) -> Option<[u8; 32]> {
    let key: [u8; 32] = body.get(..32)?.try_into().ok()?;
    Some(key)
}

/// Every configured broadcast address on the bind port range (§6: "port
/// range 33445–33545"). Each family's limited broadcast address is used for
/// simplicity; a full implementation would also enumerate interface subnet
/// broadcast addresses.
pub fn broadcast_targets() -> Vec<SocketAddr> {
    (DEFAULT_START_PORT..=DEFAULT_END_PORT)
        .map(|port| SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port)))
        .collect()
}

/// Send one LAN discovery announce round to every broadcast target.
pub async fn broadcast_once(transport: &UdpTransport, dht_public_key: &[u8; 32]) {
    let packet = build_announce(dht_public_key);
    for target in broadcast_targets() {
        transport.send_to(&packet, target).await;
    }
}

/// Classify an incoming address family as IPv4 vs. IPv6, for deciding
/// whether a LAN-discovered peer can be reached directly (§4.2 insertion on
/// being heard).
pub fn family_of(addr: SocketAddr) -> Family {
    match addr {
        SocketAddr::V4(_) => Family::Ipv4,
        SocketAddr::V6(_) => Family::Ipv6,
    }
}
