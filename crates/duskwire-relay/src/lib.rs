//! # duskwire-relay
//!
//! TCP relay client, server, and multi-relay mux (§2 "TCP relay", §4.4).
//!
//! A TCP relay is a fallback transport for peers UDP can't reach directly: a
//! client opens a long-lived TCP connection to a relay, registers peer
//! public keys it wants routed, and the relay forwards payloads between
//! mutually-registered clients. It also proxies onion traffic as a hop-0
//! stand-in when a client's own UDP path into the onion network is blocked.
//!
//! - [`frame`] — length-prefixed TCP frame codec
//! - [`mux`] — synthetic TCP address encoding and the per-friend relay mux
//! - [`client`] — client-side connection state machine
//! - [`server`] — server-side routing table and connection registry

pub mod client;
pub mod frame;
pub mod mux;
pub mod server;

/// Error types for TCP relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("connection limit reached: {0}")]
    ResourceExhausted(String),

    #[error("no such connection or registration: {0}")]
    NotFound(String),

    #[error("proxy handshake failed: {0}")]
    ProxyHandshake(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] duskwire_crypto::CryptoError),
}

/// Convenience result type for TCP relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::ResourceExhausted("256 connections".into());
        assert!(err.to_string().contains("256 connections"));
    }
}
