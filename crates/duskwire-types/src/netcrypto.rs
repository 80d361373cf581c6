//! Net-crypto session data model (§3 "Net-crypto session", §4.5).

use serde::{Deserialize, Serialize};

/// Handshake/session lifecycle (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetCryptoStatus {
    None,
    CookieRequesting,
    HandshakeSent,
    NotConfirmed,
    Confirmed,
}

/// Freshness window for an issued cookie (§8, "Cookie freshness").
pub const COOKIE_TIMEOUT_SECS: u64 = 15;

/// No-traffic timeout after which a confirmed session is considered dead (§4.7).
pub const FRIEND_CONNECTION_TIMEOUT_SECS: u64 = 32;

/// Packet-sequence window sizes (toxcore convention: 1 << 16 generation
/// counters, but the outstanding-unacked window is much smaller in practice).
pub const CRYPTO_SEND_WINDOW: usize = 256;
pub const CRYPTO_RECV_WINDOW: usize = 256;
