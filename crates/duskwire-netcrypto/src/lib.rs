//! # duskwire-netcrypto
//!
//! The reliable, congestion-controlled encrypted transport layered on
//! unreliable datagrams (§3 "Net-crypto session", §4.5).
//!
//! A session goes through a stateless cookie exchange (so the responder
//! allocates nothing until the initiator proves liveness), a handshake that
//! derives a shared session key from fresh ephemeral X25519 keys, and then
//! carries both a reliable in-order channel and an unreliable side channel
//! multiplexed over one stream of [`duskwire_types::packet::CRYPTO_DATA`]
//! packets.
//!
//! - [`cookie`] — cookie minting/verification
//! - [`wire`] — cookie-request/response and handshake packet codecs
//! - [`session_nonce`] — per-direction nonce counters and replay tracking
//! - [`reliable`] — send/receive windows for the lossless channel
//! - [`congestion`] — rate-based send-rate control
//! - [`session`] — the session state machine tying the above together

pub mod congestion;
pub mod cookie;
pub mod reliable;
pub mod session;
pub mod session_nonce;
pub mod wire;

pub use session::{Delivered, NetCryptoSession};

/// Error types for net-crypto operations (§7).
#[derive(Debug, thiserror::Error)]
pub enum NetCryptoError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("send buffer or congestion window full")]
    Busy,

    #[error("crypto error: {0}")]
    Crypto(#[from] duskwire_crypto::CryptoError),
}

/// Convenience result type for net-crypto operations.
pub type Result<T> = std::result::Result<T, NetCryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetCryptoError::Busy;
        assert_eq!(err.to_string(), "send buffer or congestion window full");
    }
}
