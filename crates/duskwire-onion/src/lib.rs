//! # duskwire-onion
//!
//! Onion-routed relaying for announce and data-search traffic.
//!
//! A client never talks to another node directly for discovery — it builds a
//! 3-hop path from nodes it already knows in the DHT ([`path`]) and wraps its
//! request in nested layers ([`packets`]) so no single relay on the path sees
//! both the client's address and its destination. The per-hop crypto reuses
//! `duskwire-crypto`'s NaCl box primitives with a fresh ephemeral keypair per
//! hop, rather than a dedicated key-derivation scheme, since a hop only ever
//! needs to open one layer addressed to one ephemeral key.
//!
//! [`announce`] implements the node side: the bucketed
//! `{data_public_key → return path}` table a client's announcement lands in,
//! the `ping_id` challenge that guards the first announce from a given IP
//! against blind amplification, and the glue that turns a decoded request
//! into a response. [`client`] is the other end of that exchange: building
//! announce/lookup requests, decoding their responses, and rotating the send
//! path they ride on before it goes stale or a hop on it stops answering.
//!
//! ## Key Parameters
//!
//! | Parameter | Value |
//! |---|---|
//! | Onion path length | 3 hops |
//! | Return stub size | 59 bytes |
//! | Send-path lifetime | 30 s |
//! | Announcement timeout bounds | 10 s – 900 s, capped at uptime / 4 |

pub mod announce;
pub mod client;
pub mod packets;
pub mod path;

/// Error types for onion routing operations.
#[derive(Debug, thiserror::Error)]
pub enum OnionError {
    /// Not enough known nodes to build a full path.
    #[error("insufficient relays: need {need}, have {have}")]
    InsufficientRelays { need: usize, have: usize },

    /// An announce-store invariant (bucket capacity, key uniqueness) was violated.
    #[error("announce store constraint violation: {0}")]
    ConstraintViolation(String),

    /// Path construction failed (e.g. a chosen hop has no known address).
    #[error("path construction failed: {0}")]
    PathConstruction(String),

    /// A wire packet was truncated, malformed, or failed to decrypt.
    #[error("malformed onion packet: {0}")]
    MalformedPacket(String),

    /// Cryptographic error from duskwire-crypto.
    #[error("crypto error: {0}")]
    Crypto(#[from] duskwire_crypto::CryptoError),
}

/// Convenience result type for onion routing operations.
pub type Result<T> = std::result::Result<T, OnionError>;
