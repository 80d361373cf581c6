//! UDP socket and first-byte packet dispatch (§2 "Networking (UDP)", §6).
//!
//! Bind scans the configured port range until one succeeds (§6 "Port
//! ranges"). Sends are best-effort: `EAGAIN`/`WouldBlock` is swallowed
//! rather than propagated, per §5's backpressure rule that UDP sends are
//! dropped rather than retried by the transport itself.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use duskwire_types::addr::IpPort;

use crate::{Result, TransportError};

/// Largest UDP datagram this layer will attempt to receive. Generously above
/// the largest legitimate packet (an onion-wrapped nodes response); anything
/// larger is a malformed or hostile packet and is truncated/dropped by the
/// kernel before we see it.
pub const MAX_UDP_PACKET_SIZE: usize = 2048;

/// An owned, bound UDP socket plus the port it landed on.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    bound_port: u16,
}

impl UdpTransport {
    /// Bind to the first available port in `[start_port, end_port]`.
    pub async fn bind_in_range(start_port: u16, end_port: u16, ipv6: bool) -> Result<Self> {
        let host = if ipv6 { "[::]" } else { "0.0.0.0" };
        let mut last_err = None;
        for port in start_port..=end_port {
            let addr = format!("{host}:{port}");
            match UdpSocket::bind(&addr).await {
                Ok(socket) => {
                    return Ok(Self {
                        socket: Arc::new(socket),
                        bound_port: port,
                    })
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(TransportError::Io(format!(
            "no free port in [{start_port}, {end_port}]: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    pub fn bound_port(&self) -> u16 {
        self.bound_port
    }

    pub fn handle(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    /// Send a raw packet. Best-effort: a `WouldBlock`/`EAGAIN` is logged and
    /// dropped rather than surfaced, per §5.
    pub async fn send_to(&self, packet: &[u8], dest: SocketAddr) {
        match self.socket.send_to(packet, dest).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tracing::trace!(%dest, "udp send would block, dropping");
            }
            Err(e) => {
                tracing::debug!(%dest, error = %e, "udp send failed");
            }
        }
    }

    /// Receive one datagram into `buf`, returning the number of bytes and sender.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket
            .recv_from(buf)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

/// Convert a [`SocketAddr`] to the [`IpPort`] shape used by the DHT/onion layers.
pub fn socket_addr_to_ip_port(addr: SocketAddr) -> IpPort {
    match addr {
        SocketAddr::V4(v4) => IpPort::from_v4(*v4.ip(), v4.port()),
        SocketAddr::V6(v6) => IpPort::from_v6(*v6.ip(), v6.port()),
    }
}

/// Inverse of [`socket_addr_to_ip_port`]. `None` for a synthetic TCP family,
/// which isn't a real socket address.
pub fn ip_port_to_socket_addr(ip_port: &IpPort) -> Option<SocketAddr> {
    use duskwire_types::addr::Family;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    match ip_port.family {
        Family::Ipv4 | Family::TcpIpv4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&ip_port.addr[..4]);
            Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), ip_port.port))
        }
        Family::Ipv6 | Family::TcpIpv6 => {
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(ip_port.addr)), ip_port.port))
        }
        Family::TcpClient | Family::TcpServer => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_in_range_succeeds_within_range() {
        let transport = UdpTransport::bind_in_range(40000, 40100, false)
            .await
            .expect("bind");
        assert!(transport.bound_port() >= 40000 && transport.bound_port() <= 40100);
    }

    #[tokio::test]
    async fn send_and_receive_roundtrip() {
        let a = UdpTransport::bind_in_range(41000, 41100, false)
            .await
            .expect("bind a");
        let b = UdpTransport::bind_in_range(41101, 41200, false)
            .await
            .expect("bind b");

        let dest: SocketAddr = format!("127.0.0.1:{}", b.bound_port()).parse().unwrap();
        a.send_to(b"hello", dest).await;

        let mut buf = [0u8; MAX_UDP_PACKET_SIZE];
        let (n, _from) = b.recv_from(&mut buf).await.expect("recv");
        assert_eq!(&buf[..n], b"hello");
    }
}
