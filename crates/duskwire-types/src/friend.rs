//! Friend-connection data model (§3 "Friend connection", §4.6).

use serde::{Deserialize, Serialize};

/// Connection lifecycle as observed by upper layers (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FriendConnectionStatus {
    None,
    Connecting,
    Connected,
}

/// Index into a friend connection's callback slot array (§4.6: "up to 2
/// callback slots").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FriendCallbackSlot {
    Messenger = 0,
    GroupChat = 1,
}

pub const MAX_FRIEND_CONNECTION_CALLBACKS: usize = 2;

/// Relays remembered per friend for reconnection (§3: `tcp_relays[FRIEND_MAX_STORED_TCP_RELAYS]`).
pub const FRIEND_MAX_STORED_TCP_RELAYS: usize = 24;

/// Relays shared with a friend on each share round (§4.6).
pub const MAX_SHARED_RELAYS: usize = 3;
/// Cadence at which a friend's own relays are shared (§4.6).
pub const SHARE_RELAYS_INTERVAL_SECS: u64 = 120;

/// Cadence of keepalive pings between connected friends (§9/toxcore convention).
pub const FRIEND_PING_INTERVAL_SECS: u64 = 8;

/// Packet tags exchanged directly between friend connections, beneath the
/// messenger/group-chat layers (friend_connection.h).
pub const PACKET_ID_ALIVE: u8 = 16;
pub const PACKET_ID_SHARE_RELAYS: u8 = 17;
pub const PACKET_ID_FRIEND_REQUESTS: u8 = 18;
