//! # duskwire-transport
//!
//! UDP socket ownership and first-byte packet dispatch (§2 "Networking
//! (UDP)"). This crate owns the one outbound/inbound UDP socket and the
//! dispatch table that demultiplexes inbound datagrams to whichever
//! component's tag range they fall in (§3's tag partition table); it does
//! not itself understand DHT, onion, or net-crypto packet bodies.
//!
//! - [`socket`] — bind-scanning UDP socket wrapper
//! - [`dispatch`] — first-byte dispatch table
//! - [`lan_discovery`] — periodic broadcast of our DHT key

pub mod dispatch;
pub mod lan_discovery;
pub mod socket;

/// Error types for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Malformed address or out-of-range parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Packet too short or otherwise structurally invalid.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// Socket bind/send/receive failure.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
