//! Endpoint addressing (§3 "Endpoints").
//!
//! An [`IpPort`] is a (family, address, port) tuple. The TCP synthetic
//! families encode a relay-connection index in the address bytes so a
//! TCP-multiplexed peer can be addressed through the same dispatch path as a
//! UDP one — see `tcp_connections_number_to_ip_port` in `duskwire-relay`.

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

/// Address family, including the two synthetic TCP families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    Ipv4,
    Ipv6,
    TcpIpv4,
    TcpIpv6,
    /// Synthetic family addressing a peer reached through our own TCP relay mux.
    TcpClient,
    /// Synthetic family addressing a peer reached through a relay we host.
    TcpServer,
}

impl Family {
    pub fn is_tcp(self) -> bool {
        matches!(
            self,
            Family::TcpIpv4 | Family::TcpIpv6 | Family::TcpClient | Family::TcpServer
        )
    }
}

/// An address plus port, carrying whichever family it was heard on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpPort {
    pub family: Family,
    /// Raw address bytes: 4 for an IPv4-shaped family, 16 for IPv6-shaped.
    /// For `TcpClient`/`TcpServer` this instead holds a little-endian u32
    /// mux index left-padded with zero bytes to 16 — see
    /// `tcp_connections_number_to_ip_port`.
    pub addr: [u8; 16],
    pub port: u16,
}

impl IpPort {
    pub fn from_v4(addr: Ipv4Addr, port: u16) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..4].copy_from_slice(&addr.octets());
        Self {
            family: Family::Ipv4,
            addr: bytes,
            port,
        }
    }

    pub fn from_v6(addr: Ipv6Addr, port: u16) -> Self {
        Self {
            family: Family::Ipv6,
            addr: addr.octets(),
            port,
        }
    }

    pub fn as_v4(&self) -> Option<Ipv4Addr> {
        if self.family == Family::Ipv4 {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&self.addr[..4]);
            Some(Ipv4Addr::from(octets))
        } else {
            None
        }
    }

    pub fn as_v6(&self) -> Option<Ipv6Addr> {
        if self.family == Family::Ipv6 {
            Some(Ipv6Addr::from(self.addr))
        } else {
            None
        }
    }

    /// Number of address bytes this family's wire encoding occupies (§6).
    pub fn wire_addr_len(&self) -> usize {
        match self.family {
            Family::Ipv4 | Family::TcpIpv4 => 4,
            Family::Ipv6 | Family::TcpIpv6 => 16,
            Family::TcpClient | Family::TcpServer => 16,
        }
    }
}

/// A DHT node as carried in a nodes-response: `[family:1][ip:4 or 16][port:2][pk:32]` (§6).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedNode {
    pub ip_port: IpPort,
    pub public_key: [u8; 32],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_roundtrip() {
        let ip = IpPort::from_v4(Ipv4Addr::new(127, 0, 0, 1), 33445);
        assert_eq!(ip.as_v4(), Some(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(ip.wire_addr_len(), 4);
    }

    #[test]
    fn v6_roundtrip() {
        let addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let ip = IpPort::from_v6(addr, 33445);
        assert_eq!(ip.as_v6(), Some(addr));
        assert_eq!(ip.wire_addr_len(), 16);
    }

    #[test]
    fn tcp_family_is_tcp() {
        assert!(Family::TcpClient.is_tcp());
        assert!(Family::TcpServer.is_tcp());
        assert!(Family::TcpIpv4.is_tcp());
        assert!(!Family::Ipv4.is_tcp());
    }
}
