//! # duskwire-friend
//!
//! Binds onion discovery, the DHT, TCP relays and net-crypto into one
//! per-friend connection lifecycle (§3 "Friend connection", §4.6), plus the
//! nospam-filtered friend-request exchange and a boundary-only hand-off
//! point for group-chat sessions.
//!
//! This crate owns none of those lower layers directly — it tracks opaque
//! session/connection ids and public keys, and a driving loop feeds it
//! discovery results and confirmed-session notifications from the side.
//!
//! - [`connection`] — one friend's connection state and timers
//! - [`manager`] — the arena of friend connections, keyed by public key
//! - [`packet`] — payload codecs for packets carried over a confirmed session
//! - [`request`] — nospam-filtered friend-request codec and dedup
//! - [`events`] — outward notifications and the group-chat boundary trait

pub mod connection;
pub mod events;
pub mod manager;
pub mod packet;
pub mod request;

pub use connection::FriendConnection;
pub use events::{FriendEvent, GroupChannel};
pub use manager::FriendConnections;

/// Error types for friend-layer operations (§7).
#[derive(Debug, thiserror::Error)]
pub enum FriendError {
    #[error("no friend connection for that public key")]
    UnknownFriend,

    #[error("malformed friend-layer packet: {0}")]
    Packet(#[from] packet::PacketError),

    #[error("malformed friend request: {0}")]
    Request(#[from] request::FriendRequestError),
}

/// Convenience result type for friend-layer operations.
pub type Result<T> = std::result::Result<T, FriendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FriendError::UnknownFriend;
        assert_eq!(err.to_string(), "no friend connection for that public key");
    }
}
