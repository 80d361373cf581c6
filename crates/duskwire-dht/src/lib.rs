//! # duskwire-dht
//!
//! DHT node lookup and peer discovery (§2 "DHT node lookup", §3, §4.2).
//!
//! Each node keeps one [`close_list::CloseList`] toward its own key (so
//! others can find it) and one per friend (so it can find them). Lists are
//! fixed-capacity-8, sorted by XOR distance, with badness-first eviction —
//! this is deliberately not classic Kademlia's 256 prefix buckets. Nodes
//! heard about second-hand go through [`ping_queue::PingQueue`] before they
//! are trusted enough to enter a close list, to avoid amplifying spoofed
//! addresses. [`bootstrap`] drives joining the network via seed nodes, and
//! [`packets`] encodes/decodes the ping and nodes-request/response bodies
//! that keep a [`routing::RoutingTable`] populated.

pub mod bootstrap;
pub mod close_list;
pub mod packets;
pub mod ping_queue;
pub mod routing;

/// Error types for DHT operations.
#[derive(Debug, thiserror::Error)]
pub enum DhtError {
    /// Supplied argument (config, address, key) is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A wire packet was too short or otherwise structurally invalid.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Bootstrap failed to reach enough seed nodes.
    #[error("bootstrap failed: {0}")]
    BootstrapFailed(String),

    /// A requested key has no matching entry in any close list.
    #[error("not found")]
    NotFound,

    /// Cryptographic error from the shared crypto layer.
    #[error("crypto error: {0}")]
    Crypto(#[from] duskwire_crypto::CryptoError),
}

/// Convenience result type for DHT operations.
pub type Result<T> = std::result::Result<T, DhtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DhtError::MalformedPacket("short ping body".to_string());
        assert!(err.to_string().contains("short ping body"));
    }
}
