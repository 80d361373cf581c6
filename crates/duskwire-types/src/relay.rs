//! TCP relay connection data model (§3 "TCP relay connection", §4.4).

use serde::{Deserialize, Serialize};

/// Proxy handshake flavor attempted before the TCP relay handshake itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyHandshake {
    Direct,
    Http,
    Socks5,
}

/// Lifecycle of one client-side TCP relay connection (§3, §4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TcpConnectionStatus {
    None,
    Connecting(ProxyHandshake),
    Unconfirmed,
    Confirmed,
    Disconnected,
    Sleeping,
}

/// Timeout for reaching `Confirmed` after socket-open (§4.4).
pub const TCP_CONNECTION_TIMEOUT_SECS: u64 = 10;

/// Maximum relay connections held per friend (§4.4, §2).
pub const MAX_FRIEND_TCP_CONNECTIONS: usize = 6;
/// Target steady-state number of *active* (non-sleeping) relays per friend (§4.4).
pub const RECOMMENDED_FRIEND_TCP_CONNECTIONS: usize = 3;
/// Relays reserved for onion hop-0 proxying, independent of friend relays (§2).
pub const NUM_ONION_TCP_CONNECTIONS: usize = 3;

/// Maximum simultaneous peer registrations one relay connection can route (§4.4).
pub const MAX_TCP_MUX_CONNECTIONS: usize = 240;
/// Maximum inbound connections a relay server accepts (§4.4).
pub const TCP_SERVER_MAX_CONNECTIONS: usize = 256;
